//! TCP connection

use super::Connection;
use crate::command::{self, Command, CommandRegistry};
use crate::config::HostConfig;
use crate::engine::read_with_timeout;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rcmd_shared::{ErrorCollection, Processor};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// Sends each request on a fresh TCP connection
#[derive(Debug, Clone)]
pub struct TcpConnection {
    host: String,
    port: u16,
    processor: Arc<dyn Processor>,
    registry: Arc<CommandRegistry>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_message_size: usize,
}

impl TcpConnection {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        processor: Arc<dyn Processor>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        let defaults = HostConfig::default();
        Self {
            host: host.into(),
            port,
            processor,
            registry,
            connect_timeout: defaults.connect_timeout,
            read_timeout: defaults.read_timeout,
            max_message_size: defaults.max_message_size,
        }
    }

    /// Connection to the engine described by `config`
    pub fn from_config(config: &HostConfig, registry: Arc<CommandRegistry>) -> Self {
        Self::new(config.connect_host(), config.port, config.processor(), registry)
            .with_timeouts(config.connect_timeout, config.read_timeout)
            .with_max_message_size(config.max_message_size)
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Send a request; returns the decoded reply for response-capable commands
    pub async fn exchange(&self, command: &Command) -> Result<Option<Command>> {
        if !command.is_request() {
            bail!("{} is not a request", command.kind());
        }
        let text = command
            .assemble(self.processor.as_ref())
            .map_err(anyhow::Error::msg)?;

        let address = format!("{}:{}", self.host, self.port);
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| anyhow!("Connecting to {} timed out", address))?
            .with_context(|| format!("Failed to connect to {}", address))?;

        stream.write_all(text.as_bytes()).await?;
        stream.shutdown().await?;
        debug!("Sent {} ({} bytes) to {}", command.descriptor(), text.len(), address);

        if !command.has_response() {
            return Ok(None);
        }

        let bytes = read_with_timeout(&mut stream, self.max_message_size, self.read_timeout).await?;
        if bytes.is_empty() {
            bail!("{} closed the connection without responding", address);
        }
        let reply = String::from_utf8(bytes).context("Reply is not valid UTF-8")?;

        let mut errors = ErrorCollection::new();
        let response = command::parse(self.processor.as_ref(), &self.registry, &reply, &mut errors)
            .ok_or_else(|| anyhow!("Failed to decode reply: {}", errors))?;
        if response.is_request() || response.kind() != command.kind() {
            bail!("Expected a response to {}, got {} {}", command.kind(), response.kind(), response.role());
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn name(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    async fn send_request(&self, command: &Command) -> Result<()> {
        let started = Instant::now();
        let response = self.exchange(command).await?;

        if let (Command::WithResponse(request), Some(response)) = (command, response) {
            info!(
                "Response to {} received in {}ms",
                command.kind(),
                started.elapsed().as_millis()
            );
            request.action().handle_response(response.payload()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use crate::engine::{ScriptingEngine, TcpEngine};

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

    fn connection(ctx: &AppContext, engine: &TcpEngine) -> TcpConnection {
        TcpConnection::new(
            "127.0.0.1",
            engine.local_addr().port(),
            ctx.processor().clone(),
            ctx.registry().clone(),
        )
    }

    #[tokio::test]
    async fn test_ping_roundtrip() {
        let (ctx, engine, task) = start().await;
        let connection = connection(&ctx, &engine);

        let ping = ctx.registry().instantiate("basic.Ping").unwrap();
        let response = connection.exchange(&ping).await.unwrap().unwrap();
        assert_eq!(&response.payload()[..], b"pong");
        connection.send_request(&ping).await.unwrap();

        engine.stop_execution();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_request_only_command_has_no_reply() {
        let (ctx, engine, task) = start().await;
        let connection = connection(&ctx, &engine);

        let mut text = ctx.registry().instantiate("basic.Text").unwrap();
        text.set_payload("hello engine");
        assert!(connection.exchange(&text).await.unwrap().is_none());

        engine.stop_execution();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let ctx = AppContext::standard(HostConfig::default());
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connection = TcpConnection::new("127.0.0.1", port, ctx.processor().clone(), ctx.registry().clone());
        let ping = ctx.registry().instantiate("basic.Ping").unwrap();
        let err = connection.send_request(&ping).await.unwrap_err();
        assert!(err.to_string().contains("Failed to connect"));
    }

    #[tokio::test]
    async fn test_response_role_cannot_be_sent() {
        let ctx = AppContext::standard(HostConfig::default());
        let connection = TcpConnection::from_config(ctx.config(), ctx.registry().clone());

        let Command::WithResponse(ping) = ctx.registry().instantiate("basic.Ping").unwrap() else {
            panic!("basic.Ping carries a response");
        };
        let err = connection.exchange(&ping.into_response("pong")).await.unwrap_err();
        assert!(err.to_string().contains("is not a request"));
    }
}
