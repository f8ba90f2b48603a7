//! System info command handler

use crate::command::registry::{allow_options, RegistryError};
use crate::command::{CommandSpec, ResponseAction};
use crate::context::AppContext;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use rcmd_shared::properties::format_line;
use rcmd_shared::Descriptor;
use tracing::info;

pub(super) const KIND: &str = "basic.SystemInfo";

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn ResponseAction>, RegistryError> {
    allow_options(descriptor, &[])?;
    Ok(Box::new(SystemInfo))
}

/// Reports facts about the host process as properties text
#[derive(Debug, Default)]
pub struct SystemInfo;

impl CommandSpec for SystemInfo {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(KIND)
    }
}

#[async_trait]
impl ResponseAction for SystemInfo {
    async fn execute(&self, ctx: &AppContext, _payload: &[u8]) -> Result<Bytes> {
        let engine = ctx
            .engine()
            .map(|e| format!("{} ({})", e.name(), e.state()))
            .unwrap_or_else(|| "none".into());

        let entries = [
            ("os", std::env::consts::OS.to_string()),
            ("arch", std::env::consts::ARCH.to_string()),
            ("pid", std::process::id().to_string()),
            ("version", env!("CARGO_PKG_VERSION").to_string()),
            ("uptime.ms", ctx.uptime().as_millis().to_string()),
            ("flows", ctx.flows().len().await.to_string()),
            ("engine", engine),
            ("format", ctx.processor().name().to_string()),
        ];

        let mut text = String::new();
        for (key, value) in &entries {
            text.push_str(&format_line(key, value));
            text.push('\n');
        }
        Ok(Bytes::from(text))
    }

    async fn handle_response(&self, payload: &[u8]) -> Result<()> {
        info!("  [SYSTEM_INFO]");
        for line in String::from_utf8_lossy(payload).lines() {
            info!("    {}", line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcmd_shared::properties::parse_line;

    #[tokio::test]
    async fn test_reports_properties() {
        let ctx = AppContext::standard(Default::default());
        let payload = SystemInfo.execute(&ctx, &[]).await.unwrap();

        let text = String::from_utf8(payload.to_vec()).unwrap();
        let props: Vec<(String, String)> = text
            .lines()
            .filter_map(|l| parse_line(l).unwrap())
            .collect();

        let get = |key: &str| props.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("os"), Some(std::env::consts::OS));
        assert_eq!(get("flows"), Some("0"));
        assert_eq!(get("engine"), Some("none"));
        assert_eq!(get("format"), Some("plain"));
    }
}
