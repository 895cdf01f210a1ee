//! Deadline scheduling worker.
//!
//! One [`TimerHub`] thread per realm sleeps until the earliest scheduled
//! deadline and runs the attached job when it comes due. Jobs are plain
//! closures; the timer subsystem uses them to hop back onto the execution
//! lane, so the hub thread itself never touches script state.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type DeadlineJob = Box<dyn FnOnce() + Send>;

struct DeadlineEntry {
    due: Instant,
    seq: u64,
    job: Option<DeadlineJob>,
}

impl PartialEq for DeadlineEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DeadlineEntry {}

impl PartialOrd for DeadlineEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeadlineEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // equal deadlines fire in scheduling order
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

struct HubState {
    queue: BinaryHeap<Reverse<DeadlineEntry>>,
    next_seq: u64,
    shutdown: bool,
}

struct HubInner {
    state: Mutex<HubState>,
    wakeup: Condvar,
}

/// Handle to a realm's deadline worker thread.
#[derive(Clone)]
pub struct TimerHub {
    inner: Arc<HubInner>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TimerHub {
    /// Starts the deadline worker.
    pub fn spawn() -> std::io::Result<TimerHub> {
        let inner = Arc::new(HubInner {
            state: Mutex::new(HubState {
                queue: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });
        let worker = inner.clone();
        let join = std::thread::Builder::new()
            .name("timer-hub".to_string())
            .spawn(move || run_hub(&worker))?;
        Ok(TimerHub {
            inner,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    /// Schedules `job` to run `delay` from now on the hub thread.
    ///
    /// Scheduling after shutdown drops the job.
    pub fn schedule(&self, delay: Duration, job: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            log::debug!("deadline scheduled after hub shutdown; dropped");
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Reverse(DeadlineEntry {
            due: Instant::now() + delay,
            seq,
            job: Some(Box::new(job)),
        }));
        self.inner.wakeup.notify_one();
    }

    /// Stops the worker, dropping every not-yet-due deadline unfired.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.queue.clear();
        }
        self.inner.wakeup.notify_one();
        let join = self.join.lock().take();
        if let Some(join) = join {
            if join.thread().id() != std::thread::current().id() {
                let _ = join.join();
            }
        }
    }
}

fn run_hub(inner: &HubInner) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let now = Instant::now();
        let next_due = state.queue.peek().map(|Reverse(entry)| entry.due);
        match next_due {
            Some(due) if due <= now => {
                if let Some(Reverse(mut entry)) = state.queue.pop() {
                    let job = entry.job.take();
                    MutexGuard::unlocked(&mut state, || {
                        if let Some(job) = job {
                            job();
                        }
                    });
                }
            }
            Some(due) => {
                inner.wakeup.wait_until(&mut state, due);
            }
            None => {
                inner.wakeup.wait(&mut state);
            }
        }
    }
}
