//! # Frame Pump Context
//!
//! For hosts that own their main loop. Work is queued from any thread and
//! executed when the engine calls [`FramePump::pump`] from its update tick.
//! The thread that creates the pair is captured as the main thread.

use super::context::{run_job, ExecutionContext, Job, LocalTaskFactory, MainCommand};
use crate::error::{BridgeError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sending half, shareable across threads
pub struct FramePumpContext {
    name: String,
    sender: Sender<MainCommand>,
    thread_id: ThreadId,
    closed: Arc<AtomicBool>,
}

/// Receiving half; lives on the main thread and is driven by the host
///
/// Once closed the receiver is dropped, so later submissions fail at once
/// instead of waiting for a frame that may never come.
pub struct FramePump {
    name: String,
    receiver: Option<Receiver<MainCommand>>,
    pool: LocalPool,
    spawner: LocalSpawner,
    closed: Arc<AtomicBool>,
}

impl FramePumpContext {
    /// Create the context and its pump, capturing the calling thread as main
    pub fn new(name: impl Into<String>) -> (Arc<Self>, FramePump) {
        let name = name.into();
        let (sender, receiver) = channel::unbounded();
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let closed = Arc::new(AtomicBool::new(false));

        let context = Arc::new(Self {
            name: name.clone(),
            sender,
            thread_id: std::thread::current().id(),
            closed: closed.clone(),
        });
        debug!(context = %name, "Frame pump context created");

        let pump = FramePump {
            name,
            receiver: Some(receiver),
            pool,
            spawner,
            closed,
        };
        (context, pump)
    }

    /// Work waiting for the next pump
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    /// Ask the pump to stop; work queued behind this request is dropped unrun
    pub fn request_shutdown(&self) {
        if self.sender.send(MainCommand::Shutdown).is_err() {
            debug!(context = %self.name, "Frame pump already closed");
        }
    }

    /// Whether the pump has processed a shutdown request
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn submit(&self, command: MainCommand) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::ContextClosed);
        }
        self.sender
            .send(command)
            .map_err(|_| BridgeError::ContextClosed)
    }
}

impl ExecutionContext for FramePumpContext {
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

impl FramePump {
    /// Run all queued jobs and advance spawned futures until nothing can progress
    ///
    /// Returns the number of commands taken off the queue.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(receiver) = self.receiver.as_ref() {
            let Ok(command) = receiver.try_recv() else {
                self.pool.run_until_stalled();
                if receiver.is_empty() {
                    break;
                }
                continue;
            };

            processed += 1;
            match command {
                MainCommand::Run(job) => run_job(&self.name, job),
                MainCommand::Spawn(factory) => {
                    if self.spawner.spawn_local(factory()).is_err() {
                        warn!(context = %self.name, "Local pool rejected spawned future");
                    }
                }
                MainCommand::Shutdown => processed += self.close(),
            }
        }
        processed
    }

    /// Pump repeatedly, as a frame loop would, until `done` holds or `timeout` passes
    pub fn pump_until(&mut self, mut done: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Whether a shutdown request has been pumped
    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }

    /// Stop for good, returning how many queued commands were discarded
    ///
    /// Discarded work and futures still in flight are dropped unrun, which
    /// settles their tasks as ContextClosed.
    fn close(&mut self) -> usize {
        self.closed.store(true, Ordering::Release);
        let discarded = self
            .receiver
            .take()
            .map(|receiver| receiver.try_iter().count())
            .unwrap_or(0);
        // Replacing the pool drops every future still in flight.
        self.pool = LocalPool::new();
        self.spawner = self.pool.spawner();
        debug!(context = %self.name, discarded, "Frame pump closed");
        discarded
    }
}

impl std::fmt::Debug for FramePumpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePumpContext")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("queued", &self.sender.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl std::fmt::Debug for FramePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePump")
            .field("name", &self.name)
            .field("queued", &self.receiver.as_ref().map_or(0, Receiver::len))
            .field("closed", &self.is_closed())
            .finish()
    }
}
