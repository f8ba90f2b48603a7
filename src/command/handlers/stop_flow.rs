//! Flow stop command handler

use crate::command::registry::{allow_options, parse_option, require_option, RegistryError};
use crate::command::{CommandSpec, ResponseAction};
use crate::context::AppContext;
use crate::shutdown::wait_until;
use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rcmd_shared::Descriptor;
use std::time::Duration;
use tracing::{info, warn};

pub(super) const KIND: &str = "flow.StopFlow";

const DEFAULT_TIMEOUT_MS: u64 = 5000;

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn ResponseAction>, RegistryError> {
    allow_options(descriptor, &["id", "timeout"])?;
    let timeout_ms = parse_option(descriptor, "timeout")?.unwrap_or(DEFAULT_TIMEOUT_MS);
    Ok(Box::new(
        StopFlow::new(require_option(descriptor, "id")?).with_timeout(Duration::from_millis(timeout_ms)),
    ))
}

/// Stops one flow and reports whether it stopped in time
#[derive(Debug)]
pub struct StopFlow {
    id: u64,
    timeout_ms: u64,
}

impl StopFlow {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

impl CommandSpec for StopFlow {
    fn descriptor(&self) -> Descriptor {
        let descriptor = Descriptor::new(KIND).with("id", self.id);
        if self.timeout_ms == DEFAULT_TIMEOUT_MS {
            descriptor
        } else {
            descriptor.with("timeout", self.timeout_ms)
        }
    }
}

#[async_trait]
impl ResponseAction for StopFlow {
    async fn execute(&self, ctx: &AppContext, _payload: &[u8]) -> Result<Bytes> {
        let Some(flow) = ctx.flows().get(self.id).await else {
            bail!("No flow with id {}", self.id);
        };

        let stopping = flow.clone();
        tokio::spawn(async move { stopping.stop_execution().await });

        let timeout = Duration::from_millis(self.timeout_ms);
        let stopped = wait_until(|| flow.is_stopped(), timeout, ctx.config().poll_interval).await;
        let report = if stopped {
            info!("  [STOP_FLOW] flow #{} stopped", self.id);
            format!("Flow #{} stopped", self.id)
        } else {
            warn!("  [STOP_FLOW] flow #{} still running after {}ms", self.id, self.timeout_ms);
            format!("Flow #{} did not stop within {}ms", self.id, self.timeout_ms)
        };
        Ok(Bytes::from(report))
    }

    async fn handle_response(&self, payload: &[u8]) -> Result<()> {
        info!("  [STOP_FLOW] {}", String::from_utf8_lossy(payload));
        Ok(())
    }
}
