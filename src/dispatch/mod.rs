//! # Main Context Dispatch
//!
//! Host engine APIs may only be called from one thread. This module captures
//! that thread as an [`ExecutionContext`] and lets any other thread hand it
//! work, synchronously or as awaitable [`MainTask`]s.
//!
//! ## Architecture
//!
//! ```text
//! Dispatch
//! ├── ExecutionContext        (trait: the host's single-threaded scheduler)
//! │   ├── DedicatedThreadContext  (bridge-owned thread + LocalSet)
//! │   └── FramePumpContext        (host loop drains a queue each frame)
//! ├── MainContextDispatcher   (send / post / schedule_* / continue_on_main)
//! └── MainTask                (awaitable outcome + lifecycle state)
//! ```

pub mod context;
pub mod dedicated_thread;
pub mod dispatcher;
pub mod frame_pump;
pub mod task;

pub use context::{ExecutionContext, Job, LocalTaskFactory};
pub use dedicated_thread::DedicatedThreadContext;
pub use dispatcher::MainContextDispatcher;
pub use frame_pump::{FramePump, FramePumpContext};
pub use task::{MainTask, TaskState};
