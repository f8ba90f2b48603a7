//! Shell script flow

use super::{Flow, FlowRegistry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

/// A script run as `sh -c <script>` in a child process
#[derive(Debug)]
pub struct ScriptFlow {
    source: String,
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl ScriptFlow {
    /// Spawn the script and register it; the flow removes itself when it ends
    pub async fn start(registry: Arc<FlowRegistry>, script: &str) -> Result<u64> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn script")?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let flow = Arc::new(Self {
            source: describe(script),
            stop_tx,
            stopped: AtomicBool::new(false),
        });
        let id = registry.add(flow.clone()).await;
        info!("Flow #{} started: {}", id, flow.source);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = stop_rx.changed() => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill flow #{}: {}", id, e);
                    }
                    child.wait().await
                }
            };

            match status {
                Ok(status) => info!("Flow #{} finished: {}", id, status),
                Err(e) => warn!("Flow #{} failed: {}", id, e),
            }
            flow.stopped.store(true, Ordering::SeqCst);
            registry.remove(id).await;
        });

        Ok(id)
    }
}

#[async_trait]
impl Flow for ScriptFlow {
    fn source(&self) -> String {
        self.source.clone()
    }

    async fn stop_execution(&self) {
        self.stop_tx.send_replace(true);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// First script line, shortened for listings
fn describe(script: &str) -> String {
    let first = script.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let mut source: String = first.chars().take(60).collect();
    if source.len() < first.len() || script.trim().lines().count() > 1 {
        source.push_str(" ...");
    }
    format!("sh: {}", source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::wait_until;
    use std::time::Duration;

    #[test]
    fn test_describe() {
        assert_eq!(describe("sleep 1"), "sh: sleep 1");
        assert_eq!(describe("\n  echo a\necho b\n"), "sh: echo a ...");
    }

    #[tokio::test]
    async fn test_finished_script_leaves_registry() {
        let registry = Arc::new(FlowRegistry::new());
        let id = ScriptFlow::start(registry.clone(), "exit 0").await.unwrap();
        assert_eq!(id, 1);

        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while registry.get(id).await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(gone.is_ok());
    }

    #[tokio::test]
    async fn test_stop_kills_script() {
        let registry = Arc::new(FlowRegistry::new());
        let id = ScriptFlow::start(registry.clone(), "sleep 30").await.unwrap();
        let flow = registry.get(id).await.unwrap();
        assert!(!flow.is_stopped());

        flow.stop_execution().await;
        let stopped = wait_until(
            || flow.is_stopped(),
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await;
        assert!(stopped);
    }
}
