//! # Bridge Bootstrap
//!
//! Single entry point the plugin calls when the host loads it: configuration
//! is validated, logging is initialized, the main context is captured, and
//! the registry and dispatcher are handed back as explicit handles.
//!
//! In [`ContextMode::FramePump`] mode, call [`EngineBridge::bootstrap`] from
//! the host's main thread, since that thread is captured as the main context.

use crate::config::{BridgeConfig, ContextMode};
use crate::dispatch::{
    DedicatedThreadContext, ExecutionContext, FramePump, FramePumpContext, MainContextDispatcher,
};
use crate::error::Result;
use crate::ffi::install_native_registry;
use crate::logging::{init_structured_logging, LogSink, TracingSink};
use crate::registry::CallbackRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// The captured main context, by concrete kind
#[derive(Debug, Clone)]
pub enum MainContextHandle {
    Dedicated(Arc<DedicatedThreadContext>),
    FramePump(Arc<FramePumpContext>),
}

impl MainContextHandle {
    pub fn as_execution_context(&self) -> Arc<dyn ExecutionContext> {
        match self {
            MainContextHandle::Dedicated(context) => context.clone(),
            MainContextHandle::FramePump(context) => context.clone(),
        }
    }
}

/// Everything a plugin needs after load
pub struct EngineBridge {
    config: BridgeConfig,
    registry: Arc<CallbackRegistry>,
    dispatcher: MainContextDispatcher,
    context: MainContextHandle,
    pump: Option<FramePump>,
    native_registry_installed: bool,
}

impl EngineBridge {
    pub fn bootstrap(config: BridgeConfig) -> Result<Self> {
        Self::bootstrap_with_sink(config, Arc::new(TracingSink))
    }

    /// Bootstrap with a host-provided log sink for registry and dispatch events
    pub fn bootstrap_with_sink(config: BridgeConfig, sink: Arc<dyn LogSink>) -> Result<Self> {
        config.validate()?;
        init_structured_logging(&config);

        let registry = Arc::new(CallbackRegistry::with_sink(
            config.mismatch_policy,
            sink.clone(),
        ));

        let (context, pump) = match config.context_mode {
            ContextMode::DedicatedThread => {
                let context = DedicatedThreadContext::start(config.main_thread_name.clone())?;
                (MainContextHandle::Dedicated(context), None)
            }
            ContextMode::FramePump => {
                let (context, pump) = FramePumpContext::new(config.main_thread_name.clone());
                (MainContextHandle::FramePump(context), Some(pump))
            }
        };

        let dispatcher = MainContextDispatcher::with_sink(context.as_execution_context(), sink);

        let native_registry_installed =
            config.install_native_registry && install_native_registry(registry.clone());

        info!(
            environment = %config.environment,
            context_mode = ?config.context_mode,
            main_context = %config.main_thread_name,
            mismatch_policy = ?config.mismatch_policy,
            native_registry_installed = native_registry_installed,
            "Engine bridge bootstrapped"
        );

        Ok(Self {
            config,
            registry,
            dispatcher,
            context,
            pump,
            native_registry_installed,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &MainContextDispatcher {
        &self.dispatcher
    }

    pub fn context(&self) -> &MainContextHandle {
        &self.context
    }

    /// The frame pump, when running in frame-pump mode and not yet taken
    pub fn pump(&mut self) -> Option<&mut FramePump> {
        self.pump.as_mut()
    }

    /// Hand the frame pump to the host's main loop
    pub fn take_pump(&mut self) -> Option<FramePump> {
        self.pump.take()
    }

    /// Whether this bridge's registry is the one native callbacks reach
    pub fn native_registry_installed(&self) -> bool {
        self.native_registry_installed
    }

    /// Stop the main context; queued work either runs or settles as closed
    pub fn shutdown(&mut self) {
        match &self.context {
            MainContextHandle::Dedicated(context) => context.shutdown(),
            MainContextHandle::FramePump(context) => {
                context.request_shutdown();
                match self.pump.as_mut() {
                    Some(pump) => {
                        pump.pump();
                    }
                    None => warn!(
                        "Frame pump was handed to the host; shutdown completes on its next pump"
                    ),
                }
            }
        }
        info!(main_context = %self.config.main_thread_name, "Engine bridge shut down");
    }
}

impl std::fmt::Debug for EngineBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBridge")
            .field("context_mode", &self.config.context_mode)
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .field("native_registry_installed", &self.native_registry_installed)
            .finish()
    }
}
