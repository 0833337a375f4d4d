//! # Main Context Dispatcher
//!
//! Routes work onto the captured main execution context from any thread.
//!
//! ## Error Handling
//!
//! Every unit of work is wrapped so that:
//! - Errors returned by the work become [`DispatchError::Failed`]
//! - Panics become [`DispatchError::Panicked`]
//! - Work the context discards unrun becomes [`DispatchError::ContextClosed`]
//!
//! Each failure is reported to the log sink exactly once and also surfaces
//! through the value handed back to the caller, so nothing is lost when the
//! caller never inspects the outcome.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_bridge::dispatch::{DedicatedThreadContext, MainContextDispatcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = DedicatedThreadContext::start("engine-main")?;
//! let dispatcher = MainContextDispatcher::new(context);
//!
//! dispatcher.post(|| println!("on the main thread"));
//!
//! let frame = dispatcher
//!     .schedule(|| Ok::<_, anyhow::Error>(60_u32))
//!     .await?;
//! assert_eq!(frame, 60);
//! # Ok(())
//! # }
//! ```

use super::context::ExecutionContext;
use super::task::MainTask;
use crate::error::{DispatchError, DispatchResult};
use crate::logging::{LogLevel, LogSink, TracingSink};
use futures::FutureExt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Clone)]
pub struct MainContextDispatcher {
    context: Arc<dyn ExecutionContext>,
    sink: Arc<dyn LogSink>,
}

impl MainContextDispatcher {
    /// Dispatcher reporting failures through `tracing`
    pub fn new(context: Arc<dyn ExecutionContext>) -> Self {
        Self::with_sink(context, Arc::new(TracingSink))
    }

    pub fn with_sink(context: Arc<dyn ExecutionContext>, sink: Arc<dyn LogSink>) -> Self {
        Self { context, sink }
    }

    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        &self.context
    }

    pub fn is_main_context(&self) -> bool {
        self.context.is_current()
    }

    /// Run `work` on the main context and block until it has finished
    ///
    /// Runs inline when already on the main context. Blocks indefinitely if
    /// the context is alive but never drains its queue.
    pub fn send<F, R>(&self, work: F) -> DispatchResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.context.is_current() {
            let outcome = catch_unwind(AssertUnwindSafe(work)).map_err(DispatchError::from_panic);
            if let Err(error) = &outcome {
                self.sink.log_failure("send", error);
            }
            return outcome;
        }

        let (reply_tx, reply_rx) = crossbeam::channel::bounded::<DispatchResult<R>>(1);
        let sink = self.sink.clone();
        let job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(work)).map_err(DispatchError::from_panic);
            if let Err(error) = &outcome {
                sink.log_failure("send", error);
            }
            let _ = reply_tx.send(outcome);
        });

        if let Err(error) = self.context.post(job) {
            let error = DispatchError::from(error);
            self.sink.log_failure("send", &error);
            return Err(error);
        }

        // A closed reply channel means the context dropped the job unrun.
        reply_rx.recv().unwrap_or_else(|_| {
            let error = DispatchError::ContextClosed;
            self.sink.log_failure("send", &error);
            Err(error)
        })
    }

    /// Queue `work` on the main context and return immediately
    pub fn post<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sink = self.sink.clone();
        let job = Box::new(move || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(work)) {
                sink.log_failure("post", &DispatchError::from_panic(payload));
            }
        });

        if self.context.post(job).is_err() {
            self.sink.log(
                LogLevel::Warn,
                &format!(
                    "Dropped posted work: main context '{}' is closed",
                    self.context.name()
                ),
            );
        }
    }

    /// Run an action on the main context
    pub fn schedule_action<F>(&self, action: F) -> MainTask<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_on_main("schedule_action", move || async move {
            action();
            Ok(())
        })
    }

    /// Run a function producing a value on the main context
    pub fn schedule<F, R, E>(&self, work: F) -> MainTask<R>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.spawn_on_main("schedule", move || async move {
            work().map_err(|e| DispatchError::Failed(e.into()))
        })
    }

    /// Run a function with one argument on the main context
    pub fn schedule_with<P, F, R, E>(&self, parameter: P, work: F) -> MainTask<R>
    where
        P: Send + 'static,
        F: FnOnce(P) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.spawn_on_main("schedule_with", move || async move {
            work(parameter).map_err(|e| DispatchError::Failed(e.into()))
        })
    }

    /// Build and drive a future on the main context
    ///
    /// The future need not be `Send`: it is created and polled on the main
    /// context only.
    pub fn schedule_async<F, Fut, R, E>(&self, work: F) -> MainTask<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        R: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.spawn_on_main("schedule_async", move || async move {
            work().await.map_err(|e| DispatchError::Failed(e.into()))
        })
    }

    /// [`schedule_async`](Self::schedule_async) with one argument
    pub fn schedule_async_with<P, F, Fut, R, E>(&self, parameter: P, work: F) -> MainTask<R>
    where
        P: Send + 'static,
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        R: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.spawn_on_main("schedule_async_with", move || async move {
            work(parameter).await.map_err(|e| DispatchError::Failed(e.into()))
        })
    }

    /// Run `continuation` on the main context once `antecedent` has settled
    ///
    /// The continuation receives the antecedent's output whatever it is, so a
    /// failed [`MainTask`] arrives as its `Err` value.
    pub fn continue_on_main<A, T, F, R, E>(&self, antecedent: A, continuation: F) -> MainTask<R>
    where
        A: Future<Output = T> + Send + 'static,
        T: 'static,
        F: FnOnce(T) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.spawn_on_main("continue_on_main", move || async move {
            let settled = antecedent.await;
            continuation(settled).map_err(|e| DispatchError::Failed(e.into()))
        })
    }

    fn spawn_on_main<F, Fut, R>(&self, operation: &'static str, make: F) -> MainTask<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = DispatchResult<R>> + 'static,
        R: Send + 'static,
    {
        let (task, completion) = MainTask::pending(self.sink.clone(), operation);

        let submitted = self.context.spawn_local(Box::new(move || {
            async move {
                completion.running();
                let outcome = AssertUnwindSafe(async move { make().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(DispatchError::from_panic(payload)));
                completion.settle(outcome);
            }
            .boxed_local()
        }));

        // On rejection the completion was dropped with the job and has
        // already settled the task as ContextClosed.
        if submitted.is_err() {
            tracing::debug!(
                context = %self.context.name(),
                operation = operation,
                "Main context rejected scheduled work"
            );
        }

        task
    }
}

impl std::fmt::Debug for MainContextDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContextDispatcher")
            .field("context", &self.context.name())
            .finish()
    }
}
