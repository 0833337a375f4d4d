//! # Callback Registry Infrastructure
//!
//! Bridges completions arriving from native code back to awaitable results,
//! when the only thing the native side can carry is a 32-bit handle.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── CallbackRegistry   (handle allocation, tagged slots, resolution)
//! └── PendingResult      (single-assignment awaitable per handle)
//! ```

pub mod callback_registry;
pub mod pending;

// Re-export main types for easy access
pub use callback_registry::{CallbackRegistry, MismatchPolicy, RegistryStats, ResolveOutcome};
pub use pending::{CallbackHandle, PendingResult};
