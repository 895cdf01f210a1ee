//! Native-side settlement cells.
//!
//! A [`PendingPromise`] is the native mirror of a script promise: a
//! one-shot terminal cell that any number of observers can attach to,
//! before or after settlement, each receiving the final result exactly
//! once.

use core_types::BridgeError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Observer<T> = Box<dyn FnOnce(Result<T, BridgeError>) + Send>;

enum State<T> {
    Pending(Vec<Observer<T>>),
    Fulfilled(T),
    Rejected(BridgeError),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// A thread-safe result cell with exactly-once observer delivery.
///
/// At most one of fulfilled/rejected is ever set; once set the state is
/// immutable and later settlement attempts are ignored. Observers attached
/// after settlement synchronously receive the stored terminal value.
///
/// # Examples
///
/// ```
/// use dispatch_queue::PendingPromise;
///
/// let cell: PendingPromise<u32> = PendingPromise::new();
/// cell.resolve(7);
/// assert_eq!(cell.try_result(), Some(Ok(7)));
/// ```
pub struct PendingPromise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PendingPromise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for PendingPromise<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingPromise<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an unsettled cell.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                settled: Condvar::new(),
            }),
        }
    }

    /// Attaches an observer. Runs it immediately (on the calling thread)
    /// if the cell has already settled; otherwise it runs on the settling
    /// thread. Each observer is invoked exactly once.
    pub fn observe(&self, observer: impl FnOnce(Result<T, BridgeError>) + Send + 'static) {
        let mut observer = Some(Box::new(observer) as Observer<T>);
        let ready = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending(observers) => {
                    if let Some(observer) = observer.take() {
                        observers.push(observer);
                    }
                    None
                }
                State::Fulfilled(value) => Some(Ok(value.clone())),
                State::Rejected(error) => Some(Err(error.clone())),
            }
        };
        if let (Some(result), Some(observer)) = (ready, observer.take()) {
            observer(result);
        }
    }

    /// Fulfills the cell. A no-op if it already settled.
    pub fn resolve(&self, value: T) {
        self.settle(State::Fulfilled(value));
    }

    /// Rejects the cell. A no-op if it already settled.
    pub fn reject(&self, error: BridgeError) {
        self.settle(State::Rejected(error));
    }

    /// The settled result, if any.
    pub fn try_result(&self) -> Option<Result<T, BridgeError>> {
        match &*self.inner.state.lock() {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Whether the cell has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        !matches!(&*self.inner.state.lock(), State::Pending(_))
    }

    /// Blocks the calling thread until settlement or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, BridgeError>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Fulfilled(value) => return Some(Ok(value.clone())),
                State::Rejected(error) => return Some(Err(error.clone())),
                State::Pending(_) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    self.inner.settled.wait_until(&mut state, deadline);
                }
            }
        }
    }

    fn settle(&self, terminal: State<T>) {
        let result = match &terminal {
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(error) => Err(error.clone()),
            State::Pending(_) => return,
        };
        let observers = {
            let mut state = self.inner.state.lock();
            let State::Pending(observers) = &mut *state else {
                return;
            };
            let observers = std::mem::take(observers);
            *state = terminal;
            self.inner.settled.notify_all();
            observers
        };
        for observer in observers {
            observer(result.clone());
        }
    }
}
