//! The serialized execution lane.
//!
//! All script evaluation and callback delivery for one realm runs on a
//! single dedicated thread, one item at a time, in submission order —
//! regardless of which native thread submitted the work. The engine is
//! constructed on the lane thread and never leaves it.
//!
//! After every submitted item completes, the lane drains the engine's
//! microtask queue, so an "evaluate, then call" sequence observes fully
//! settled promise state from the earlier step.

use engine_api::ScriptEngine;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

/// Lane identifier counter. Identifies lanes for the re-entrancy check
/// only; realm-scoped counters (timers, requests) live with their realm.
static NEXT_LANE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Rc<LaneContext>>> = const { RefCell::new(None) };
}

/// Errors from lane submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaneError {
    /// The lane thread has shut down; no further work is accepted.
    #[error("the execution lane has shut down")]
    Closed,
    /// The lane thread could not be started.
    #[error("failed to spawn the execution lane: {0}")]
    SpawnFailed(String),
}

/// A unit of work accepted into the lane.
pub type PendingCall = Box<dyn FnOnce(&LaneContext) + Send>;

enum LaneMessage {
    Run(PendingCall),
    Shutdown,
}

/// Execution context handed to every lane item.
///
/// Only lane items ever see a `LaneContext`; holding one is proof of being
/// on the lane thread, which is why it grants engine access.
pub struct LaneContext {
    engine: Box<dyn ScriptEngine>,
    lane_id: u64,
}

impl LaneContext {
    /// The realm's engine. Safe to use for the duration of the lane item.
    pub fn engine(&self) -> &dyn ScriptEngine {
        self.engine.as_ref()
    }

    /// Identifier of the lane this context belongs to.
    pub fn lane_id(&self) -> u64 {
        self.lane_id
    }
}

/// Handle to a realm's serialized execution lane.
///
/// Cloning the handle is cheap; all clones feed the same FIFO queue.
///
/// # Caller contract
///
/// [`ExecutionLane::submit_sync`] from a thread other than the lane blocks
/// until the lane runs the item. Submitting synchronously from inside a
/// lane item runs the work inline (re-entrant, no deadlock). What is *not*
/// supported is a synchronous submission that is itself the inner call of
/// another thread's synchronous submission chain crossing lanes — that
/// cycle deadlocks and is not detected.
#[derive(Clone)]
pub struct ExecutionLane {
    shared: Arc<LaneShared>,
}

struct LaneShared {
    sender: crossbeam::channel::Sender<LaneMessage>,
    lane_id: u64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionLane {
    /// Starts a lane, constructing the engine on the lane thread.
    pub fn spawn<F>(engine_factory: F) -> Result<ExecutionLane, LaneError>
    where
        F: FnOnce() -> Box<dyn ScriptEngine> + Send + 'static,
    {
        let (sender, receiver) = crossbeam::channel::unbounded();
        let lane_id = NEXT_LANE_ID.fetch_add(1, Ordering::SeqCst);
        let join = std::thread::Builder::new()
            .name("script-lane".to_string())
            .spawn(move || run_lane(lane_id, engine_factory(), receiver))
            .map_err(|e| LaneError::SpawnFailed(e.to_string()))?;
        Ok(ExecutionLane {
            shared: Arc::new(LaneShared {
                sender,
                lane_id,
                join: Mutex::new(Some(join)),
            }),
        })
    }

    /// Submits work asynchronously. FIFO relative to every other
    /// asynchronous submission, from any thread.
    pub fn submit(
        &self,
        work: impl FnOnce(&LaneContext) + Send + 'static,
    ) -> Result<(), LaneError> {
        self.shared
            .sender
            .send(LaneMessage::Run(Box::new(work)))
            .map_err(|_| LaneError::Closed)
    }

    /// Submits work and blocks until the lane has executed it, returning
    /// the work's result.
    ///
    /// When the calling context is already inside this lane, the work runs
    /// immediately instead of being re-queued.
    pub fn submit_sync<R, F>(&self, work: F) -> Result<R, LaneError>
    where
        R: Send + 'static,
        F: FnOnce(&LaneContext) -> R + Send + 'static,
    {
        if let Some(context) = self.current_context() {
            log::trace!("lane {}: re-entrant sync submission", context.lane_id);
            return Ok(work(&context));
        }
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.submit(move |context| {
            let _ = tx.send(work(context));
        })?;
        rx.recv().map_err(|_| LaneError::Closed)
    }

    /// Whether the calling thread is currently inside this lane.
    pub fn is_on_lane(&self) -> bool {
        self.current_context().is_some()
    }

    /// Stops the lane after the already-queued items, dropping the engine
    /// on the lane thread, and joins it.
    pub fn shutdown(&self) {
        let _ = self.shared.sender.send(LaneMessage::Shutdown);
        let join = self.shared.join.lock().take();
        if let Some(join) = join {
            if join.thread().id() != std::thread::current().id() {
                let _ = join.join();
            }
        }
    }

    fn current_context(&self) -> Option<Rc<LaneContext>> {
        CURRENT
            .with(|current| current.borrow().clone())
            .filter(|context| context.lane_id == self.shared.lane_id)
    }
}

fn run_lane(
    lane_id: u64,
    engine: Box<dyn ScriptEngine>,
    receiver: crossbeam::channel::Receiver<LaneMessage>,
) {
    let context = Rc::new(LaneContext { engine, lane_id });
    CURRENT.with(|current| *current.borrow_mut() = Some(context.clone()));
    log::debug!("lane {}: started", lane_id);

    while let Ok(message) = receiver.recv() {
        match message {
            LaneMessage::Run(call) => {
                call(&context);
                context.engine().drain_microtasks();
            }
            LaneMessage::Shutdown => break,
        }
    }

    CURRENT.with(|current| *current.borrow_mut() = None);
    log::debug!("lane {}: stopped", lane_id);
    // `context` drops here: the engine is torn down on its own thread.
}
