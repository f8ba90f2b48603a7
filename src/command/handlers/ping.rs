//! Ping command handler

use crate::command::registry::{allow_options, RegistryError};
use crate::command::{CommandSpec, ResponseAction};
use crate::context::AppContext;
use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rcmd_shared::protocol::KEY_TIMESTAMP;
use rcmd_shared::{now_ms, Descriptor, Header};
use tracing::info;

pub(super) const KIND: &str = "basic.Ping";

const PONG: &[u8] = b"pong";

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn ResponseAction>, RegistryError> {
    allow_options(descriptor, &[])?;
    Ok(Box::new(Ping::default()))
}

/// Liveness check answered with `pong`
#[derive(Debug, Default)]
pub struct Ping {
    /// Assembly time of the received message
    sent_at: Option<u64>,
}

impl CommandSpec for Ping {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(KIND)
    }

    fn configure(&mut self, header: &Header) -> Result<(), String> {
        self.sent_at = header.get(KEY_TIMESTAMP).and_then(|t| t.parse().ok());
        Ok(())
    }
}

#[async_trait]
impl ResponseAction for Ping {
    async fn execute(&self, _ctx: &AppContext, _payload: &[u8]) -> Result<Bytes> {
        match self.sent_at {
            Some(sent_at) => info!("  [PING] in transit for {}ms", now_ms().saturating_sub(sent_at)),
            None => info!("  [PING] received"),
        }
        Ok(Bytes::from_static(PONG))
    }

    async fn handle_response(&self, payload: &[u8]) -> Result<()> {
        if payload != PONG {
            bail!("Unexpected ping reply: {}", String::from_utf8_lossy(payload));
        }
        info!("  [PING] pong");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pong() {
        let ctx = AppContext::standard(Default::default());
        let mut ping = Ping::default();
        ping.configure(&Header::from_iter([(KEY_TIMESTAMP, "1700000000000")]))
            .unwrap();
        assert_eq!(ping.sent_at, Some(1_700_000_000_000));

        assert_eq!(&ping.execute(&ctx, &[]).await.unwrap()[..], PONG);
        assert!(ping.handle_response(PONG).await.is_ok());
        assert!(ping.handle_response(b"pang").await.is_err());
    }

    #[test]
    fn test_rejects_options() {
        let descriptor = Descriptor::parse("basic.Ping -loud yes").unwrap();
        assert!(factory(&descriptor).is_err());
    }
}
