//! Error types for the engine bridge.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Main execution context is closed")]
    ContextClosed,
    #[error("Pending result was abandoned before completion")]
    Abandoned,
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Initialization error: {0}")]
    Initialization(String),
    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<::config::ConfigError> for BridgeError {
    fn from(error: ::config::ConfigError) -> Self {
        BridgeError::Configuration(error.to_string())
    }
}

/// Failure of a unit of work dispatched to the main context.
///
/// Every variant reaches the caller through the returned task and is also
/// reported to the dispatcher's log sink.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatched work failed: {0:#}")]
    Failed(#[source] anyhow::Error),
    #[error("Dispatched work panicked: {0}")]
    Panicked(String),
    #[error("Main execution context is closed")]
    ContextClosed,
}

impl DispatchError {
    /// Builds a [`DispatchError::Panicked`] from a caught unwind payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let panic_msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        DispatchError::Panicked(panic_msg)
    }

    /// Short machine-readable category for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Failed(_) => "work_failed",
            DispatchError::Panicked(_) => "work_panicked",
            DispatchError::ContextClosed => "context_closed",
        }
    }
}

impl From<BridgeError> for DispatchError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::ContextClosed => DispatchError::ContextClosed,
            other => DispatchError::Failed(anyhow::Error::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
