//! # Structured Logging Module
//!
//! Process-wide `tracing` setup plus the [`LogSink`] seam through which the
//! registry and dispatcher report registration events and uncaught failures.
//! Hosts that surface logs in their own console can plug in a custom sink;
//! the default forwards everything to `tracing`.

use crate::config::{BridgeConfig, LogFormat};
use crate::error::DispatchError;
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Severity understood by every sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    /// An uncaught failure inside dispatched work
    Exception,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Exception => "exception",
        };
        f.write_str(label)
    }
}

/// Host logging capability shared by the registry and the dispatcher
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    /// Report a failure that escaped a unit of dispatched work
    fn log_failure(&self, context: &str, error: &DispatchError) {
        self.log(LogLevel::Exception, &format!("{context}: {error}"));
    }
}

/// Default sink forwarding to the global `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Exception => tracing::error!(exception = true, "{}", message),
        }
    }

    fn log_failure(&self, context: &str, error: &DispatchError) {
        log_dispatch_failure(context, error);
    }
}

/// A single captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Sink that keeps records in memory, for in-engine consoles and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn records_at(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    /// Number of uncaught failures reported so far
    pub fn failure_count(&self) -> usize {
        self.records_at(LogLevel::Exception).len()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.records.lock().push(LogRecord {
            level,
            message: message.to_string(),
        });
    }
}

/// Initialize structured logging once per process
///
/// An already installed global subscriber (e.g. from the host) is left in place.
pub fn init_structured_logging(config: &BridgeConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let log_level = config.effective_log_level();
        let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

        let json = config.log_format == LogFormat::Json;
        let pretty_layer = (!json).then(|| {
            tracing_fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_level(true)
                .with_ansi(true)
        });
        let json_layer = json.then(|| {
            tracing_fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_level(true)
                .with_ansi(false)
                .json()
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(pretty_layer)
            .with(json_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %config.environment,
            log_level = %log_level,
            log_format = ?config.log_format,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Log a failure that escaped dispatched work
pub fn log_dispatch_failure(context: &str, error: &DispatchError) {
    tracing::error!(
        component = "main_context_dispatcher",
        operation = %context,
        error_kind = error.kind(),
        error = %error,
        timestamp = %Utc::now().to_rfc3339(),
        "DISPATCH_FAILURE"
    );
}
