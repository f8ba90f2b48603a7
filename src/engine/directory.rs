//! Directory engine - one message per file

use super::dispatcher::{dispatch, Outcome};
use super::{EngineControl, ScriptingEngine};
use crate::command::{self, Command};
use crate::context::AppContext;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rcmd_shared::ErrorCollection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Polls a directory for message files.
///
/// Files with the processor's extension are processed in filename order
/// and deleted once read. Names starting with `.` are ignored, so writers
/// can stage a file under a hidden name and rename it when complete.
#[derive(Debug)]
pub struct DirectoryEngine {
    control: EngineControl,
    watch_dir: PathBuf,
    response_dir: Option<PathBuf>,
}

impl DirectoryEngine {
    pub fn new(watch_dir: impl Into<PathBuf>, response_dir: Option<PathBuf>) -> Self {
        Self {
            control: EngineControl::new(),
            watch_dir: watch_dir.into(),
            response_dir,
        }
    }

    /// Message files currently waiting, sorted by name
    async fn pending(&self, extension: &str) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.watch_dir)
            .await
            .with_context(|| format!("Failed to list {}", self.watch_dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let visible = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.'));
            let matches = path.extension().and_then(|e| e.to_str()) == Some(extension);
            if visible && matches && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn process(&self, ctx: &AppContext, path: &Path) {
        let processor = ctx.processor().as_ref();
        let mut errors = ErrorCollection::new();
        let command = command::read(processor, ctx.registry(), path, &mut errors);

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to delete {}: {}", path.display(), e);
        }

        let Some(command) = command else {
            warn!("Failed to read {}: {}", path.display(), errors);
            return;
        };

        if let Outcome::Responded(response) = dispatch(ctx, command).await {
            self.respond(ctx, path, &response);
        }
    }

    fn respond(&self, ctx: &AppContext, request: &Path, response: &Command) {
        let Some(dir) = &self.response_dir else {
            debug!("No response directory, discarding response to {}", request.display());
            return;
        };

        let processor = ctx.processor().as_ref();
        let stem = request
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("message");
        let target = dir.join(format!("{}.response.{}", stem, processor.extension()));

        let mut errors = ErrorCollection::new();
        if command::write(processor, response, &target, &mut errors) {
            debug!("Response written to {}", target.display());
        } else {
            warn!("Failed to write response {}: {}", target.display(), errors);
        }
    }
}

#[async_trait]
impl ScriptingEngine for DirectoryEngine {
    fn name(&self) -> &str {
        "directory"
    }

    fn control(&self) -> &EngineControl {
        &self.control
    }

    async fn run_loop(&self, ctx: Arc<AppContext>, mut stop: watch::Receiver<bool>) -> Result<()> {
        let extension = ctx.processor().extension();
        let interval = ctx.config().poll_interval;
        info!("Directory engine watching {}", self.watch_dir.display());

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            match self.pending(extension).await {
                Ok(files) => {
                    for path in files {
                        if *stop.borrow() {
                            break;
                        }
                        self.process(&ctx, &path).await;
                    }
                }
                Err(e) => warn!("{:#}", e),
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Directory engine on {} stopped", self.watch_dir.display());
        Ok(())
    }
}
