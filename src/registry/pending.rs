//! Single-assignment result holders handed out by the callback registry.

use crate::error::{BridgeError, Result};
use futures::future::{FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Integer identifier passed across the native boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CallbackHandle(i32);

impl CallbackHandle {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i32> for CallbackHandle {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Awaitable side of a registered callback
///
/// Completes with the value passed to
/// [`CallbackRegistry::resolve`](super::CallbackRegistry::resolve), or with
/// [`BridgeError::Abandoned`] if the entry is dropped without being resolved.
#[must_use = "a pending result does nothing unless awaited or waited on"]
pub struct PendingResult<T> {
    handle: CallbackHandle,
    receiver: oneshot::Receiver<T>,
}

impl<T> PendingResult<T> {
    pub(crate) fn new(handle: CallbackHandle, receiver: oneshot::Receiver<T>) -> Self {
        Self { handle, receiver }
    }

    pub fn handle(&self) -> CallbackHandle {
        self.handle
    }

    /// Non-blocking check; `None` while the result is still outstanding
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BridgeError::Abandoned)),
        }
    }

    /// Block the current thread until the result arrives
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .blocking_recv()
            .map_err(|_| BridgeError::Abandoned)
    }
}

impl<T: Clone> PendingResult<T> {
    /// Cloneable view so several consumers observe the same value
    pub fn shared(self) -> Shared<Self> {
        FutureExt::shared(self)
    }
}

impl<T> Future for PendingResult<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| BridgeError::Abandoned))
    }
}

impl<T> fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResult")
            .field("handle", &self.handle)
            .field("payload_type", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abandoned_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<u32>();
        let pending = PendingResult::new(CallbackHandle::from_raw(5), rx);
        drop(tx);
        assert_eq!(pending.await, Err(BridgeError::Abandoned));
    }

    #[test]
    fn test_try_take_progression() {
        let (tx, rx) = oneshot::channel::<&'static str>();
        let mut pending = PendingResult::new(CallbackHandle::from_raw(9), rx);
        assert!(pending.try_take().is_none());
        tx.send("ready").unwrap();
        assert_eq!(pending.try_take(), Some(Ok("ready")));
    }

    #[tokio::test]
    async fn test_shared_consumers_see_same_value() {
        let (tx, rx) = oneshot::channel::<String>();
        let shared = PendingResult::new(CallbackHandle::from_raw(1), rx).shared();
        let other = shared.clone();
        tx.send("hello".to_string()).unwrap();
        assert_eq!(shared.await, Ok("hello".to_string()));
        assert_eq!(other.await, Ok("hello".to_string()));
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(CallbackHandle::from_raw(42).to_string(), "#42");
        assert_eq!(CallbackHandle::from(7).as_raw(), 7);
    }
}
