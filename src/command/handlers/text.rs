//! Text command handler

use crate::command::registry::{allow_options, RegistryError};
use crate::command::{CommandSpec, RequestAction};
use crate::context::AppContext;
use anyhow::Result;
use async_trait::async_trait;
use rcmd_shared::Descriptor;
use tracing::info;

pub(super) const KIND: &str = "basic.Text";

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn RequestAction>, RegistryError> {
    allow_options(descriptor, &[])?;
    Ok(Box::new(Text))
}

/// Logs its payload as text
#[derive(Debug, Default)]
pub struct Text;

impl CommandSpec for Text {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(KIND)
    }
}

#[async_trait]
impl RequestAction for Text {
    async fn execute(&self, _ctx: &AppContext, payload: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(payload);
        info!("  [TEXT] {} bytes", payload.len());
        for line in text.lines() {
            info!("    {}", line);
        }
        Ok(())
    }
}
