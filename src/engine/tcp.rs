//! TCP engine - one message per connection

use super::dispatcher::{dispatch_text, Outcome};
use super::{EngineControl, ScriptingEngine};
use crate::context::AppContext;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct TcpEngine {
    control: EngineControl,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
}

impl TcpEngine {
    /// Bind the listening socket; accepting starts with `execute`
    pub async fn bind(bind: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((bind, port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", bind, port))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            control: EngineControl::new(),
            listener: Mutex::new(Some(listener)),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl ScriptingEngine for TcpEngine {
    fn name(&self) -> &str {
        "tcp"
    }

    fn control(&self) -> &EngineControl {
        &self.control
    }

    async fn run_loop(&self, ctx: Arc<AppContext>, mut stop: watch::Receiver<bool>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| anyhow!("listener already consumed"))?;
        info!("TCP engine listening on {}", self.local_addr);

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle(&ctx, stream, peer).await {
                                warn!("Message from {} failed: {:#}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ctx.config().poll_interval).await;
                    }
                }
            }
        }

        info!("TCP engine on {} stopped", self.local_addr);
        Ok(())
    }
}

/// Read one message, dispatch it and answer on the same socket
async fn handle(ctx: &AppContext, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let config = ctx.config();
    let bytes = read_with_timeout(&mut stream, config.max_message_size, config.read_timeout).await?;
    let text = String::from_utf8(bytes).context("Message is not valid UTF-8")?;
    debug!("Received {} bytes from {}", text.len(), peer);

    match dispatch_text(ctx, &text).await {
        Outcome::Responded(response) => {
            let reply = response
                .assemble(ctx.processor().as_ref())
                .map_err(anyhow::Error::msg)?;
            stream.write_all(reply.as_bytes()).await?;
            stream.shutdown().await?;
        }
        Outcome::Executed => {}
        Outcome::Failed(message) => bail!(message),
    }
    Ok(())
}

/// Read until EOF, failing once more than `limit` bytes arrive
pub(crate) async fn read_limited<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut buffer).await?;
    if buffer.len() > limit {
        bail!("Message too large: more than {} bytes", limit);
    }
    Ok(buffer)
}

/// Read with a deadline
pub(crate) async fn read_with_timeout<R>(reader: &mut R, limit: usize, deadline: Duration) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    timeout(deadline, read_limited(reader, limit))
        .await
        .map_err(|_| anyhow!("Timed out after {}ms reading message", deadline.as_millis()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command;
    use crate::config::HostConfig;
    use crate::engine::EngineState;
    use rcmd_shared::protocol::KEY_COMMAND;
    use rcmd_shared::{ErrorCollection, Header};

    async fn start() -> (Arc<AppContext>, Arc<TcpEngine>, tokio::task::JoinHandle<Result<()>>) {
        let ctx = Arc::new(AppContext::standard(HostConfig::default()));
        let engine = Arc::new(TcpEngine::bind("127.0.0.1", 0).await.unwrap());
        ctx.set_engine(engine.clone());

        let task = tokio::spawn({
            let (ctx, engine) = (ctx.clone(), engine.clone());
            async move { engine.execute(ctx).await }
        });
        (ctx, engine, task)
    }

    async fn send(engine: &TcpEngine, text: &str) -> String {
        let mut stream = TcpStream::connect(engine.local_addr()).await.unwrap();
        stream.write_all(text.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        let reply = read_limited(&mut stream, 1 << 20).await.unwrap();
        String::from_utf8(reply).unwrap()
    }

    #[tokio::test]
    async fn test_ping_is_answered_on_same_socket() {
        let (ctx, engine, task) = start().await;

        let text = ctx
            .processor()
            .format(&Header::from_iter([(KEY_COMMAND, "basic.Ping")]), &[]);
        let reply = send(&engine, &text).await;

        let mut errors = ErrorCollection::new();
        let response = command::parse(ctx.processor().as_ref(), ctx.registry(), &reply, &mut errors)
            .unwrap_or_else(|| panic!("{}", errors));
        assert!(!response.is_request());
        assert_eq!(&response.payload()[..], b"pong");

        engine.stop_execution();
        task.await.unwrap().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_bad_message_does_not_end_loop() {
        let (ctx, engine, task) = start().await;

        assert_eq!(send(&engine, "garbage").await, "");

        let text = ctx
            .processor()
            .format(&Header::from_iter([(KEY_COMMAND, "basic.Ping")]), &[]);
        assert!(!send(&engine, &text).await.is_empty());

        engine.stop_execution();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_command_ends_loop() {
        let (ctx, engine, task) = start().await;

        let text = ctx.processor().format(
            &Header::from_iter([(KEY_COMMAND, "basic.Stop -type engine")]),
            &[],
        );
        send(&engine, &text).await;

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(engine.is_stopped());
    }

    #[tokio::test]
    async fn test_silent_client_does_not_block_others() {
        let (ctx, engine, task) = start().await;

        // Connected but never sends, so its handler waits out read_timeout
        let _silent = TcpStream::connect(engine.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let text = ctx
            .processor()
            .format(&Header::from_iter([(KEY_COMMAND, "basic.Ping")]), &[]);
        assert!(ctx.config().read_timeout > Duration::from_secs(2));
        let reply = tokio::time::timeout(Duration::from_secs(2), send(&engine, &text))
            .await
            .expect("ping blocked behind silent client");
        assert!(!reply.is_empty());

        engine.stop_execution();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_read_limited_rejects_oversized() {
        let mut data: &[u8] = &[0u8; 32];
        assert!(read_limited(&mut data, 16).await.is_err());

        let mut data: &[u8] = &[0u8; 16];
        assert_eq!(read_limited(&mut data, 16).await.unwrap().len(), 16);
    }
}
