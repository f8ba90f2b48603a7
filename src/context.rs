//! Host context shared by engines, commands and shutdown hooks

use crate::command::CommandRegistry;
use crate::config::HostConfig;
use crate::engine::ScriptingEngine;
use crate::flow::FlowRegistry;
use rcmd_shared::Processor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Owned state of one command host
#[derive(Debug)]
pub struct AppContext {
    config: HostConfig,
    registry: Arc<CommandRegistry>,
    processor: Arc<dyn Processor>,
    flows: Arc<FlowRegistry>,
    engine: Mutex<Option<Arc<dyn ScriptingEngine>>>,
    exit_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl AppContext {
    pub fn new(config: HostConfig, registry: Arc<CommandRegistry>) -> Self {
        let processor = config.processor();
        let (exit_tx, _) = watch::channel(false);
        Self {
            config,
            registry,
            processor,
            flows: Arc::new(FlowRegistry::new()),
            engine: Mutex::new(None),
            exit_tx,
            started_at: Instant::now(),
        }
    }

    /// Context with the built-in command set
    pub fn standard(config: HostConfig) -> Self {
        Self::new(config, Arc::new(CommandRegistry::standard()))
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn processor(&self) -> &Arc<dyn Processor> {
        &self.processor
    }

    pub fn flows(&self) -> &Arc<FlowRegistry> {
        &self.flows
    }

    fn engine_slot(&self) -> MutexGuard<'_, Option<Arc<dyn ScriptingEngine>>> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `engine` the current engine, stopping the one it replaces
    pub fn set_engine(&self, engine: Arc<dyn ScriptingEngine>) {
        let previous = self.engine_slot().replace(engine.clone());
        if let Some(previous) = previous {
            if !same_engine(&previous, &engine) {
                info!("Replacing {} engine with {}", previous.name(), engine.name());
                previous.stop_execution();
            }
        }
    }

    pub fn engine(&self) -> Option<Arc<dyn ScriptingEngine>> {
        self.engine_slot().clone()
    }

    /// Signal the current engine to stop; false if there is none
    pub fn stop_engine(&self) -> bool {
        match self.engine() {
            Some(engine) => {
                engine.stop_execution();
                true
            }
            None => false,
        }
    }

    /// Ask the host process to shut down
    pub fn request_exit(&self) {
        self.exit_tx.send_replace(true);
    }

    /// Receiver flipping to `true` once exit was requested
    pub fn exit_requested(&self) -> watch::Receiver<bool> {
        self.exit_tx.subscribe()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn same_engine(a: &Arc<dyn ScriptingEngine>, b: &Arc<dyn ScriptingEngine>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
