//! Flow listing command handler

use crate::command::registry::{allow_options, RegistryError};
use crate::command::{CommandSpec, ResponseAction};
use crate::context::AppContext;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use rcmd_shared::Descriptor;
use tracing::info;

pub(super) const KIND: &str = "flow.ListFlows";

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn ResponseAction>, RegistryError> {
    allow_options(descriptor, &[])?;
    Ok(Box::new(ListFlows))
}

/// Lists running flows, one `<id>\t<source>` line each
#[derive(Debug, Default)]
pub struct ListFlows;

impl CommandSpec for ListFlows {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(KIND)
    }
}

#[async_trait]
impl ResponseAction for ListFlows {
    async fn execute(&self, ctx: &AppContext, _payload: &[u8]) -> Result<Bytes> {
        let flows = ctx.flows();
        let mut text = String::new();
        for id in flows.ids().await {
            if let Some(flow) = flows.get(id).await {
                text.push_str(&format!("{}\t{}\n", id, flow.source()));
            }
        }
        Ok(Bytes::from(text))
    }

    async fn handle_response(&self, payload: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(payload);
        if text.trim().is_empty() {
            info!("  [LIST_FLOWS] no flows running");
        }
        for line in text.lines() {
            info!("  [LIST_FLOWS] {}", line);
        }
        Ok(())
    }
}
