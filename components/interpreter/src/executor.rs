//! Completion delivery.
//!
//! Async facade calls complete on the lane but deliver on the native
//! caller's preferred thread. The library does not know the host's
//! threading model, so delivery goes through a [`CompletionExecutor`];
//! the default runs completions inline on the delivering thread, and
//! hosts with a real main-thread queue plug theirs in.

/// Executes queued completion callbacks on a host-chosen thread.
pub trait CompletionExecutor: Send + Sync {
    /// Runs (or schedules) one completion.
    fn execute(&self, completion: Box<dyn FnOnce() + Send>);
}

/// Default executor: runs the completion inline on the delivering thread.
pub struct InlineExecutor;

impl CompletionExecutor for InlineExecutor {
    fn execute(&self, completion: Box<dyn FnOnce() + Send>) {
        completion();
    }
}
