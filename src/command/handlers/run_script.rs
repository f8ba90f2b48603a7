//! Script command handler

use crate::command::registry::{allow_options, RegistryError};
use crate::command::{CommandSpec, RequestAction};
use crate::context::AppContext;
use crate::flow::ScriptFlow;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rcmd_shared::Descriptor;
use tracing::info;

pub(super) const KIND: &str = "flow.RunScript";

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn RequestAction>, RegistryError> {
    allow_options(descriptor, &[])?;
    Ok(Box::new(RunScript))
}

/// Starts the payload as a shell script flow
#[derive(Debug, Default)]
pub struct RunScript;

impl CommandSpec for RunScript {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(KIND)
    }
}

#[async_trait]
impl RequestAction for RunScript {
    async fn execute(&self, ctx: &AppContext, payload: &[u8]) -> Result<()> {
        let script = std::str::from_utf8(payload).context("Script is not valid UTF-8")?;
        if script.trim().is_empty() {
            bail!("Empty script");
        }

        let id = ScriptFlow::start(ctx.flows().clone(), script).await?;
        info!("  [RUN_SCRIPT] started flow #{}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Flow;

    #[tokio::test]
    async fn test_starts_flow() {
        let ctx = AppContext::standard(Default::default());
        RunScript.execute(&ctx, b"sleep 5").await.unwrap();

        let ids = ctx.flows().ids().await;
        assert_eq!(ids.len(), 1);
        let flow = ctx.flows().get(ids[0]).await.unwrap();
        assert_eq!(flow.source(), "sh: sleep 5");
        flow.stop_execution().await;
    }

    #[tokio::test]
    async fn test_rejects_empty_script() {
        let ctx = AppContext::standard(Default::default());
        assert!(RunScript.execute(&ctx, b"  \n").await.is_err());
        assert!(RunScript.execute(&ctx, b"\xff\xfe").await.is_err());
        assert_eq!(ctx.flows().len().await, 0);
    }
}
