//! Dispatch engines
//!
//! An engine is a background loop receiving serialized commands, executing
//! them and answering response-capable requests over the channel they
//! arrived on. Two engines are provided:
//! - [`TcpEngine`]: one message per TCP connection
//! - [`DirectoryEngine`]: one message per file in a watched directory

mod directory;
mod dispatcher;
mod tcp;

pub use directory::DirectoryEngine;
pub use tcp::TcpEngine;
pub(crate) use tcp::read_with_timeout;

use crate::context::AppContext;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, info_span, Instrument};

/// Lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Created,
            1 => EngineState::Running,
            2 => EngineState::Stopping,
            _ => EngineState::Stopped,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Created => write!(f, "created"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// State flag and stop signal shared by every engine implementation
#[derive(Debug)]
pub struct EngineControl {
    state: AtomicU8,
    stop_tx: watch::Sender<bool>,
    owner: Mutex<Option<String>>,
}

impl Default for EngineControl {
    fn default() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(EngineState::Created as u8),
            stop_tx,
            owner: Mutex::new(None),
        }
    }
}

impl EngineControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move from `Created` to `Running`, handing out the stop signal
    pub fn begin(&self) -> Result<watch::Receiver<bool>> {
        let stop_rx = self.stop_tx.subscribe();
        if self
            .state
            .compare_exchange(
                EngineState::Created as u8,
                EngineState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            bail!("engine already started ({})", self.state());
        }
        Ok(stop_rx)
    }

    /// Signal the loop to exit at its next safe point.
    /// An engine that never ran goes straight to `Stopped`.
    pub fn request_stop(&self) {
        let _ = self.state.compare_exchange(
            EngineState::Created as u8,
            EngineState::Stopped as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            EngineState::Running as u8,
            EngineState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.stop_tx.send_replace(true);
    }

    /// Mark the loop as exited
    pub fn finish(&self) {
        self.state.store(EngineState::Stopped as u8, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == EngineState::Stopped
    }

    /// Label naming what started the engine, shown in its log span
    pub fn set_owner(&self, owner: impl Into<String>) {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner()) = Some(owner.into());
    }

    pub fn owner(&self) -> Option<String> {
        self.owner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
pub trait ScriptingEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn control(&self) -> &EngineControl;

    /// The receive loop; return once `stop` turns `true`
    async fn run_loop(&self, ctx: Arc<AppContext>, stop: watch::Receiver<bool>) -> Result<()>;

    /// Run the loop until stopped. Intended to be spawned on its own task.
    async fn execute(&self, ctx: Arc<AppContext>) -> Result<()> {
        let stop = self.control().begin()?;
        let owner = self.control().owner().unwrap_or_else(|| "-".into());
        let span = info_span!("engine", name = %self.name(), owner = %owner);

        let result = async {
            info!("Engine started");
            let result = self.run_loop(ctx, stop).await;
            info!("Engine stopped");
            result
        }
        .instrument(span)
        .await;
        self.control().finish();
        result
    }

    fn stop_execution(&self) {
        self.control().request_stop();
    }

    /// True once the loop has actually exited
    fn is_stopped(&self) -> bool {
        self.control().is_stopped()
    }

    fn state(&self) -> EngineState {
        self.control().state()
    }
}
