//! # Callback Registry
//!
//! Correlates pending results with the integer handles native callbacks use
//! to complete them.
//!
//! ## Overview
//!
//! A producer calls [`CallbackRegistry::register`] to obtain a
//! [`PendingResult`] and a [`CallbackHandle`]. The handle travels to native
//! code; when the native side finishes it calls
//! [`CallbackRegistry::resolve`] with the handle and a value, which completes
//! the pending result and removes the entry.
//!
//! Resolution never fails loudly: the native caller cannot observe delivery
//! problems, so unknown handles and type mismatches are reported only through
//! the returned [`ResolveOutcome`] and the log sink.
//!
//! ## Usage
//!
//! ```rust
//! use engine_bridge::registry::CallbackRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CallbackRegistry::new();
//! let (pending, handle) = registry.register::<i32>();
//!
//! // ...handle is passed to native code, which later reports back...
//! registry.resolve(handle, 42_i32);
//!
//! assert_eq!(pending.await?, 42);
//! # Ok(())
//! # }
//! ```

use super::pending::{CallbackHandle, PendingResult};
use crate::error::BridgeError;
use crate::logging::{LogLevel, LogSink, TracingSink};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// What to do with an entry whose resolution arrived with the wrong payload type
///
/// Parsed the same way from TOML, environment variables and `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MismatchPolicy {
    /// Drop the entry; its consumer observes an abandoned result
    #[default]
    Evict,
    /// Keep the entry so a correctly typed resolution can still complete it
    Retain,
}

impl std::str::FromStr for MismatchPolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evict" => Ok(MismatchPolicy::Evict),
            "retain" => Ok(MismatchPolicy::Retain),
            other => Err(BridgeError::Configuration(format!(
                "Invalid mismatch_policy: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for MismatchPolicy {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Result of a resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    UnknownHandle,
    TypeMismatch {
        expected: &'static str,
        received: &'static str,
    },
    /// The handle was live but nobody is waiting on the result any more
    ConsumerDropped,
}

impl ResolveOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolveOutcome::Resolved)
    }

    /// Integer form reported across the native boundary
    pub fn status_code(&self) -> i32 {
        match self {
            ResolveOutcome::Resolved => 1,
            ResolveOutcome::UnknownHandle => 0,
            ResolveOutcome::TypeMismatch { .. } => -1,
            ResolveOutcome::ConsumerDropped => -2,
        }
    }
}

/// Registry counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub pending: usize,
    pub registered_total: u64,
    pub resolved_total: u64,
    pub unknown_total: u64,
    pub mismatched_total: u64,
    pub abandoned_total: u64,
}

/// Tagged entry: the expected payload type plus its type-erased sender
struct PendingSlot {
    payload_type: TypeId,
    type_name: &'static str,
    sender: Box<dyn Any + Send + Sync>,
}

impl PendingSlot {
    fn new<T: Send + 'static>(sender: oneshot::Sender<T>) -> Self {
        Self {
            payload_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            sender: Box::new(sender),
        }
    }

    fn accepts<T: 'static>(&self) -> bool {
        self.payload_type == TypeId::of::<T>()
    }
}

/// Registry of pending results keyed by native callback handle
pub struct CallbackRegistry {
    pending: DashMap<CallbackHandle, PendingSlot>,
    next_id: AtomicI32,
    mismatch_policy: MismatchPolicy,
    sink: Arc<dyn LogSink>,
    registered_total: AtomicU64,
    resolved_total: AtomicU64,
    unknown_total: AtomicU64,
    mismatched_total: AtomicU64,
    abandoned_total: AtomicU64,
}

impl CallbackRegistry {
    /// Registry with the default mismatch policy, logging through `tracing`
    pub fn new() -> Self {
        Self::with_sink(MismatchPolicy::default(), Arc::new(TracingSink))
    }

    pub fn with_sink(mismatch_policy: MismatchPolicy, sink: Arc<dyn LogSink>) -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicI32::new(1),
            mismatch_policy,
            sink,
            registered_total: AtomicU64::new(0),
            resolved_total: AtomicU64::new(0),
            unknown_total: AtomicU64::new(0),
            mismatched_total: AtomicU64::new(0),
            abandoned_total: AtomicU64::new(0),
        }
    }

    pub fn mismatch_policy(&self) -> MismatchPolicy {
        self.mismatch_policy
    }

    /// Create a pending result of type `T` and the handle that resolves it
    pub fn register<T: Send + 'static>(&self) -> (PendingResult<T>, CallbackHandle) {
        let (sender, receiver) = oneshot::channel::<T>();
        let mut slot = Some(PendingSlot::new(sender));

        // The counter wraps; zero and handles still in use are skipped.
        let handle = loop {
            let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
            if raw == 0 {
                continue;
            }
            let candidate = CallbackHandle::from_raw(raw);
            if let Entry::Vacant(entry) = self.pending.entry(candidate) {
                if let Some(slot) = slot.take() {
                    entry.insert(slot);
                }
                break candidate;
            }
        };

        self.registered_total.fetch_add(1, Ordering::Relaxed);
        self.sink.log(
            LogLevel::Debug,
            &format!(
                "Registered callback {handle} for {}",
                std::any::type_name::<T>()
            ),
        );

        (PendingResult::new(handle, receiver), handle)
    }

    /// Complete the pending result behind `handle` with `value`
    ///
    /// Never panics; unknown handles and mismatched payload types are absorbed.
    pub fn resolve<T: Send + 'static>(&self, handle: CallbackHandle, value: T) -> ResolveOutcome {
        let received = std::any::type_name::<T>();

        if let Some((_, slot)) = self.pending.remove_if(&handle, |_, slot| slot.accepts::<T>()) {
            return self.complete(handle, slot, value);
        }

        // Copy the tag out so the shard lock is released before any removal.
        let expected = self.pending.get(&handle).map(|slot| slot.type_name);
        match expected {
            None => {
                self.unknown_total.fetch_add(1, Ordering::Relaxed);
                self.sink.log(
                    LogLevel::Debug,
                    &format!("Ignoring resolution for unknown callback {handle}"),
                );
                ResolveOutcome::UnknownHandle
            }
            Some(expected) => {
                self.mismatched_total.fetch_add(1, Ordering::Relaxed);
                let evicted = self.mismatch_policy == MismatchPolicy::Evict
                    && self
                        .pending
                        .remove_if(&handle, |_, slot| !slot.accepts::<T>())
                        .is_some();
                self.sink.log(
                    LogLevel::Warn,
                    &format!(
                        "Callback {handle} expects {expected} but was resolved with {received} ({})",
                        if evicted { "evicted" } else { "retained" }
                    ),
                );
                ResolveOutcome::TypeMismatch { expected, received }
            }
        }
    }

    fn complete<T: Send + 'static>(
        &self,
        handle: CallbackHandle,
        slot: PendingSlot,
        value: T,
    ) -> ResolveOutcome {
        let sender = match slot.sender.downcast::<oneshot::Sender<T>>() {
            Ok(sender) => sender,
            Err(_) => {
                // Unreachable while the TypeId tag and the boxed sender agree.
                self.mismatched_total.fetch_add(1, Ordering::Relaxed);
                return ResolveOutcome::TypeMismatch {
                    expected: slot.type_name,
                    received: std::any::type_name::<T>(),
                };
            }
        };

        match sender.send(value) {
            Ok(()) => {
                self.resolved_total.fetch_add(1, Ordering::Relaxed);
                self.sink
                    .log(LogLevel::Debug, &format!("Resolved callback {handle}"));
                ResolveOutcome::Resolved
            }
            Err(_) => {
                self.sink.log(
                    LogLevel::Debug,
                    &format!("Callback {handle} resolved after its consumer was dropped"),
                );
                ResolveOutcome::ConsumerDropped
            }
        }
    }

    /// Drop a pending entry without completing it
    pub fn abandon(&self, handle: CallbackHandle) -> bool {
        let removed = self.pending.remove(&handle).is_some();
        if removed {
            self.abandoned_total.fetch_add(1, Ordering::Relaxed);
            self.sink
                .log(LogLevel::Debug, &format!("Abandoned callback {handle}"));
        }
        removed
    }

    pub fn contains(&self, handle: CallbackHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            pending: self.pending.len(),
            registered_total: self.registered_total.load(Ordering::Relaxed),
            resolved_total: self.resolved_total.load(Ordering::Relaxed),
            unknown_total: self.unknown_total.load(Ordering::Relaxed),
            mismatched_total: self.mismatched_total.load(Ordering::Relaxed),
            abandoned_total: self.abandoned_total.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn set_next_id(&self, raw: i32) {
        self.next_id.store(raw, Ordering::Relaxed);
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pending", &self.pending.len())
            .field("mismatch_policy", &self.mismatch_policy)
            .finish()
    }
}
