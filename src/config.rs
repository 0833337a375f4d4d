//! # Bridge Configuration
//!
//! Settings for bootstrapping the bridge. Values come from built-in defaults,
//! an optional TOML file, and `ENGINE_BRIDGE_*` environment variables, in
//! increasing order of precedence.

use crate::error::{BridgeError, Result};
use crate::registry::MismatchPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ENGINE_BRIDGE";

/// How the main execution context is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ContextMode {
    /// The bridge owns a named thread that acts as the main context
    #[default]
    DedicatedThread,
    /// The host engine drains queued work from its own loop every frame
    FramePump,
}

impl std::str::FromStr for ContextMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dedicated_thread" | "dedicated-thread" | "thread" => Ok(ContextMode::DedicatedThread),
            "frame_pump" | "frame-pump" | "pump" => Ok(ContextMode::FramePump),
            other => Err(BridgeError::Configuration(format!(
                "Invalid context_mode: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for ContextMode {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Output format of the console log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum LogFormat {
    /// Human-readable lines with ANSI colors
    #[default]
    Pretty,
    /// One JSON object per event, for hosts that ship logs elsewhere
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(BridgeError::Configuration(format!(
                "Invalid log_format: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for LogFormat {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub environment: String,
    /// Explicit filter directive; derived from `environment` when unset
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    pub context_mode: ContextMode,
    pub main_thread_name: String,
    pub mismatch_policy: MismatchPolicy,
    pub install_native_registry: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            environment: detect_environment(),
            log_level: None,
            log_format: LogFormat::default(),
            context_mode: ContextMode::default(),
            main_thread_name: "engine-main".to_string(),
            mismatch_policy: MismatchPolicy::default(),
            install_native_registry: true,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var(format!("{ENV_PREFIX}_LOG_LEVEL")) {
            config.log_level = Some(level);
        }

        if let Ok(format) = std::env::var(format!("{ENV_PREFIX}_LOG_FORMAT")) {
            config.log_format = format.parse()?;
        }

        if let Ok(mode) = std::env::var(format!("{ENV_PREFIX}_CONTEXT_MODE")) {
            config.context_mode = mode.parse()?;
        }

        if let Ok(name) = std::env::var(format!("{ENV_PREFIX}_MAIN_THREAD_NAME")) {
            config.main_thread_name = name;
        }

        if let Ok(policy) = std::env::var(format!("{ENV_PREFIX}_MISMATCH_POLICY")) {
            config.mismatch_policy = policy.parse()?;
        }

        if let Ok(install) = std::env::var(format!("{ENV_PREFIX}_INSTALL_NATIVE_REGISTRY")) {
            config.install_native_registry = install.parse().map_err(|e| {
                BridgeError::Configuration(format!("Invalid install_native_registry: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file (which may be absent) layered under environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading bridge configuration");

        let config: BridgeConfig = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.main_thread_name.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "main_thread_name must not be empty".to_string(),
            ));
        }

        EnvFilter::try_new(self.effective_log_level()).map_err(|e| {
            BridgeError::Configuration(format!("Invalid log_level directive: {e}"))
        })?;

        Ok(())
    }

    /// Filter directive actually used by the subscriber
    pub fn effective_log_level(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| log_level_for_environment(&self.environment).to_string())
    }

    /// Configuration snapshot for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Get current environment from environment variables
pub fn detect_environment() -> String {
    std::env::var(format!("{ENV_PREFIX}_ENV"))
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
pub fn log_level_for_environment(environment: &str) -> &'static str {
    match environment {
        "test" => "debug",
        "development" => "debug",
        "production" => "info",
        _ => "debug",
    }
}
