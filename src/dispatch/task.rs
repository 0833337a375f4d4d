//! Handles for work scheduled onto the main context.

use crate::error::{DispatchError, DispatchResult};
use crate::logging::LogSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Lifecycle of one unit of dispatched work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Scheduled,
            1 => TaskState::Running,
            2 => TaskState::Completed,
            _ => TaskState::Failed,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Scheduled => "scheduled",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Awaitable outcome of work scheduled on the main context
#[must_use = "dropping a MainTask does not cancel it, but its outcome is lost"]
pub struct MainTask<R> {
    receiver: oneshot::Receiver<DispatchResult<R>>,
    state: Arc<StateCell>,
}

impl<R> MainTask<R> {
    /// Create a task handle and the completion that settles it
    pub(crate) fn pending(
        sink: Arc<dyn LogSink>,
        operation: &'static str,
    ) -> (Self, TaskCompletion<R>) {
        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(StateCell::default());
        let completion = TaskCompletion {
            sender: Some(sender),
            state: state.clone(),
            sink,
            operation,
        };
        (Self { receiver, state }, completion)
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Block the current thread until the task settles
    ///
    /// Must not be called from the main context or from inside an async runtime.
    pub fn wait(self) -> DispatchResult<R> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(DispatchError::ContextClosed))
    }
}

impl<R> Future for MainTask<R> {
    type Output = DispatchResult<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::ContextClosed)))
    }
}

impl<R> fmt::Debug for MainTask<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainTask")
            .field("state", &self.state())
            .finish()
    }
}

/// Settles a [`MainTask`]
///
/// Failures are logged before the task's future becomes ready. Dropping an
/// unsettled completion (the context discarded the work) settles the task as
/// [`DispatchError::ContextClosed`].
pub(crate) struct TaskCompletion<R> {
    sender: Option<oneshot::Sender<DispatchResult<R>>>,
    state: Arc<StateCell>,
    sink: Arc<dyn LogSink>,
    operation: &'static str,
}

impl<R> TaskCompletion<R> {
    pub(crate) fn running(&self) {
        self.state.set(TaskState::Running);
    }

    pub(crate) fn settle(mut self, outcome: DispatchResult<R>) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: DispatchResult<R>) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        match &outcome {
            Ok(_) => self.state.set(TaskState::Completed),
            Err(error) => {
                self.sink.log_failure(self.operation, error);
                self.state.set(TaskState::Failed);
            }
        }

        // The caller may have dropped the task; the outcome is already logged.
        let _ = sender.send(outcome);
    }
}

impl<R> Drop for TaskCompletion<R> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.finish(Err(DispatchError::ContextClosed));
        }
    }
}
