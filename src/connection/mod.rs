//! Connections delivering requests to a remote engine
//!
//! This module handles:
//! - Sending one assembled request per TCP connection, reading the reply
//!   of response-capable commands from the same socket
//! - Dropping requests into a directory watched by a directory engine

mod directory;
mod tcp;

pub use directory::DirectoryConnection;
pub use tcp::TcpConnection;

use crate::command::Command;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Connection: Send + Sync {
    /// Target description for logging
    fn name(&self) -> String;

    /// Deliver one request
    async fn send_request(&self, command: &Command) -> Result<()>;
}
