//! # Dedicated Thread Context
//!
//! A main context owned by the bridge: one named OS thread running a tokio
//! current-thread runtime inside a [`LocalSet`], so both plain jobs and
//! non-`Send` futures execute on that single thread.

use super::context::{run_job, ExecutionContext, Job, LocalTaskFactory, MainCommand};
use crate::error::{BridgeError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error, info};

pub struct DedicatedThreadContext {
    name: String,
    sender: mpsc::UnboundedSender<MainCommand>,
    thread_id: ThreadId,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DedicatedThreadContext {
    /// Spawn the main thread and start its command loop
    pub fn start(name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<MainCommand>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                error!("Failed to create main context runtime: {}", e);
                BridgeError::Initialization(format!("Runtime creation failed: {e}"))
            })?;

        let loop_name = name.clone();
        let join_handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let local = LocalSet::new();
                local.block_on(&runtime, async {
                    info!(context = %loop_name, "Main context loop started");
                    while let Some(command) = receiver.recv().await {
                        match command {
                            MainCommand::Run(job) => run_job(&loop_name, job),
                            MainCommand::Spawn(factory) => {
                                tokio::task::spawn_local(factory());
                            }
                            MainCommand::Shutdown => break,
                        }
                    }
                    // Later submissions fail; anything queued behind Shutdown is dropped.
                    receiver.close();
                    while receiver.try_recv().is_ok() {}
                });
                drop(receiver);

                // Futures spawned before Shutdown still run to completion.
                runtime.block_on(local);
                info!(context = %loop_name, "Main context loop stopped");
            })
            .map_err(|e| {
                error!("Failed to spawn main context thread: {}", e);
                BridgeError::Initialization(format!("Thread spawn failed: {e}"))
            })?;

        let thread_id = join_handle.thread().id();
        debug!(context = %name, ?thread_id, "Main context thread spawned");

        Ok(Arc::new(Self {
            name,
            sender,
            thread_id,
            join_handle: Mutex::new(Some(join_handle)),
        }))
    }

    /// Stop accepting work once everything already queued has run
    ///
    /// Jobs and futures submitted before this call finish first, including
    /// async work still awaiting something. Waits for the thread to exit
    /// unless called from the main context itself.
    pub fn shutdown(&self) {
        if self.sender.send(MainCommand::Shutdown).is_err() {
            debug!(context = %self.name, "Main context already stopped");
        }

        if self.is_current() {
            return;
        }

        if let Some(handle) = self.join_handle.lock().take() {
            if handle.join().is_err() {
                error!(context = %self.name, "Main context thread panicked during shutdown");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    fn submit(&self, command: MainCommand) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| BridgeError::ContextClosed)
    }
}

impl ExecutionContext for DedicatedThreadContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    fn post(&self, job: Job) -> Result<()> {
        self.submit(MainCommand::Run(job))
    }

    fn spawn_local(&self, task: LocalTaskFactory) -> Result<()> {
        self.submit(MainCommand::Spawn(task))
    }
}

impl Drop for DedicatedThreadContext {
    fn drop(&mut self) {
        let _ = self.sender.send(MainCommand::Shutdown);
    }
}

impl std::fmt::Debug for DedicatedThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedicatedThreadContext")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("running", &self.is_running())
            .finish()
    }
}
