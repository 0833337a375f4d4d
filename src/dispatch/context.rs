//! The host-provided main execution context, expressed as a trait.

use crate::error::Result;
use futures::future::LocalBoxFuture;

/// A unit of synchronous work queued onto the main context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Builds a future on the main context; the future itself never leaves it
pub type LocalTaskFactory = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()> + Send + 'static>;

/// Single-threaded execution context that engine-facing work must run on
///
/// Implementations execute everything handed to them on one thread, in
/// submission order for [`post`](Self::post). Both submission methods fail with
/// [`BridgeError::ContextClosed`](crate::error::BridgeError::ContextClosed)
/// once the context can no longer run work; the rejected job is dropped.
pub trait ExecutionContext: Send + Sync {
    /// Label used in log fields
    fn name(&self) -> &str;

    /// Whether the calling thread is the main context's thread
    fn is_current(&self) -> bool;

    fn post(&self, job: Job) -> Result<()>;

    /// Drive the future produced by `task` to completion on the main context
    fn spawn_local(&self, task: LocalTaskFactory) -> Result<()>;
}

/// Messages understood by the bundled context implementations
pub(crate) enum MainCommand {
    Run(Job),
    Spawn(LocalTaskFactory),
    Shutdown,
}

/// Run a queued job, keeping the main loop alive if it panics
pub(crate) fn run_job(context_name: &str, job: Job) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        let error = crate::error::DispatchError::from_panic(payload);
        tracing::error!(
            context = %context_name,
            error = %error,
            "Job panicked on main context"
        );
    }
}
