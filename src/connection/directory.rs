//! Directory connection

use super::Connection;
use crate::command::{self, Command};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rcmd_shared::{now_ms, ErrorCollection, Processor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes each request as a file into a directory watched by a
/// [`DirectoryEngine`](crate::engine::DirectoryEngine).
///
/// Files are named `<timestamp>-<seq>.<ext>` and staged under a hidden
/// name first, so the engine never picks up a partial file. Replies of
/// response-capable commands are not collected.
#[derive(Debug)]
pub struct DirectoryConnection {
    dir: PathBuf,
    processor: Arc<dyn Processor>,
    sequence: AtomicU64,
}

impl DirectoryConnection {
    pub fn new(dir: impl Into<PathBuf>, processor: Arc<dyn Processor>) -> Self {
        Self {
            dir: dir.into(),
            processor,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_name(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{}-{:06}.{}", now_ms(), seq, self.processor.extension())
    }
}

#[async_trait]
impl Connection for DirectoryConnection {
    fn name(&self) -> String {
        format!("dir://{}", self.dir.display())
    }

    async fn send_request(&self, command: &Command) -> Result<()> {
        if !command.is_request() {
            bail!("{} is not a request", command.kind());
        }

        let name = self.next_name();
        let staged = self.dir.join(format!(".{}.tmp", name));
        let target = self.dir.join(&name);

        let mut errors = ErrorCollection::new();
        if !command::write(self.processor.as_ref(), command, &staged, &mut errors) {
            bail!("{}", errors);
        }
        publish(&staged, &target).await?;

        debug!("Request {} written to {}", command.descriptor(), target.display());
        Ok(())
    }
}

/// Move a staged file to its final name, removing it if the move fails
async fn publish(staged: &Path, target: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::rename(staged, target).await {
        if let Err(cleanup) = tokio::fs::remove_file(staged).await {
            warn!("Could not remove {}: {}", staged.display(), cleanup);
        }
        return Err(e).with_context(|| format!("Failed to move request into {}", target.display()));
    }
    Ok(())
}
