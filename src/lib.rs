#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Engine Bridge Core
//!
//! Plumbing for game-engine plugins whose host only tolerates engine calls
//! from one thread and whose native side can only report back with an
//! integer.
//!
//! ## Overview
//!
//! - **Callback registry**: hands out a [`PendingResult`] plus a 32-bit
//!   [`CallbackHandle`]; native code later resolves the handle with a value.
//!   Unknown handles and type mismatches are absorbed, never thrown back
//!   across the boundary.
//! - **Main context dispatcher**: marshals work onto the captured main
//!   execution context, blocking ([`MainContextDispatcher::send`]),
//!   fire-and-forget ([`MainContextDispatcher::post`]) or as awaitable
//!   [`MainTask`]s. Every failure is logged once and returned to the caller.
//!
//! ## Module Organization
//!
//! - [`registry`] - Callback handles and pending results
//! - [`dispatch`] - Execution contexts, dispatcher and tasks
//! - [`ffi`] - C functions native plugins call to resolve handles
//! - [`bootstrap`] - One-call setup at plugin load
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and the host log sink
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use engine_bridge::{BridgeConfig, EngineBridge};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut bridge = EngineBridge::bootstrap(BridgeConfig::from_env()?)?;
//!
//! // Hand `handle` to native code; it later calls engine_bridge_resolve_i32.
//! let (pending, handle) = bridge.registry().register::<i32>();
//! bridge.registry().resolve(handle, 42_i32);
//! let value = pending.await?;
//!
//! // Touch engine state from the main context and await the outcome.
//! let doubled = bridge
//!     .dispatcher()
//!     .schedule_with(value, |v| Ok::<_, anyhow::Error>(v * 2))
//!     .await?;
//! assert_eq!(doubled, 84);
//!
//! bridge.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod registry;

pub use bootstrap::{EngineBridge, MainContextHandle};
pub use config::{BridgeConfig, ContextMode, LogFormat};
pub use dispatch::{
    DedicatedThreadContext, ExecutionContext, FramePump, FramePumpContext, MainContextDispatcher,
    MainTask, TaskState,
};
pub use error::{BridgeError, DispatchError, DispatchResult, Result};
pub use logging::{LogLevel, LogSink, MemorySink, TracingSink};
pub use registry::{CallbackHandle, CallbackRegistry, MismatchPolicy, PendingResult, ResolveOutcome};
