//! Remote command model
//!
//! This module handles:
//! - The request / request-with-response command variants
//! - Instantiating commands from descriptors via an explicit registry
//! - Converting commands to and from wire text through a processor
//! - The built-in command handlers

mod codec;
pub mod handlers;
mod registry;

pub use codec::{from_message, parse, read, write};
pub use registry::{CommandRegistry, Factory, RegistryError};

use crate::context::AppContext;
use async_trait::async_trait;
use bytes::Bytes;
use rcmd_shared::protocol::{
    KEY_COMMAND, KEY_TIMESTAMP, KEY_TYPE, TYPE_REQUEST, TYPE_RESPONSE,
};
use rcmd_shared::{now_ms, Descriptor, Header, Processor};
use std::fmt;

/// Role a message plays on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Request,
    Response,
}

impl MessageRole {
    /// Value stored under the `Type` header key
    pub fn header_value(self) -> &'static str {
        match self {
            MessageRole::Request => TYPE_REQUEST,
            MessageRole::Response => TYPE_RESPONSE,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::Request => write!(f, "request"),
            MessageRole::Response => write!(f, "response"),
        }
    }
}

/// Identity and configuration common to every command kind
pub trait CommandSpec: Send + Sync + fmt::Debug {
    /// Kind plus options, rendered under the `Command` header key
    fn descriptor(&self) -> Descriptor;

    /// Pick up extra configuration from a decoded header
    fn configure(&mut self, _header: &Header) -> Result<(), String> {
        Ok(())
    }
}

/// A command that is only ever sent as a request
#[async_trait]
pub trait RequestAction: CommandSpec {
    async fn execute(&self, ctx: &AppContext, payload: &[u8]) -> anyhow::Result<()>;
}

/// A command whose execution produces a response for the sender
#[async_trait]
pub trait ResponseAction: CommandSpec {
    /// Run on the receiving side, returning the response payload
    async fn execute(&self, ctx: &AppContext, payload: &[u8]) -> anyhow::Result<Bytes>;

    /// Run on the sending side once the response arrives
    async fn handle_response(&self, payload: &[u8]) -> anyhow::Result<()>;
}

/// Request-only command and its payload
#[derive(Debug)]
pub struct RequestCommand {
    action: Box<dyn RequestAction>,
    payload: Bytes,
}

impl RequestCommand {
    pub fn action(&self) -> &dyn RequestAction {
        self.action.as_ref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Payload of a response-capable command, tied to the role it plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Request(Bytes),
    Response(Bytes),
}

/// Response-capable command, acting either as request or as carried response
#[derive(Debug)]
pub struct ResponseCommand {
    action: Box<dyn ResponseAction>,
    exchange: Exchange,
}

impl ResponseCommand {
    pub fn action(&self) -> &dyn ResponseAction {
        self.action.as_ref()
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Turn this command into the response carrying `payload`
    pub fn into_response(self, payload: impl Into<Bytes>) -> Command {
        Command::WithResponse(ResponseCommand {
            action: self.action,
            exchange: Exchange::Response(payload.into()),
        })
    }
}

/// The unit of remote control
#[derive(Debug)]
pub enum Command {
    Request(RequestCommand),
    WithResponse(ResponseCommand),
}

impl Command {
    /// Build a request-only command
    pub fn request(action: Box<dyn RequestAction>, payload: impl Into<Bytes>) -> Self {
        Command::Request(RequestCommand {
            action,
            payload: payload.into(),
        })
    }

    /// Build a response-capable command in its request role
    pub fn with_response(action: Box<dyn ResponseAction>, payload: impl Into<Bytes>) -> Self {
        Command::WithResponse(ResponseCommand {
            action,
            exchange: Exchange::Request(payload.into()),
        })
    }

    pub fn descriptor(&self) -> Descriptor {
        match self {
            Command::Request(cmd) => cmd.action.descriptor(),
            Command::WithResponse(cmd) => cmd.action.descriptor(),
        }
    }

    /// Registry key of this command
    pub fn kind(&self) -> String {
        self.descriptor().kind().to_string()
    }

    /// Whether this command can carry a response
    pub fn has_response(&self) -> bool {
        matches!(self, Command::WithResponse(_))
    }

    pub fn role(&self) -> MessageRole {
        match self {
            Command::Request(_) => MessageRole::Request,
            Command::WithResponse(cmd) => match cmd.exchange {
                Exchange::Request(_) => MessageRole::Request,
                Exchange::Response(_) => MessageRole::Response,
            },
        }
    }

    pub fn is_request(&self) -> bool {
        self.role() == MessageRole::Request
    }

    /// Payload of the current role
    pub fn payload(&self) -> &Bytes {
        match self {
            Command::Request(cmd) => &cmd.payload,
            Command::WithResponse(cmd) => match &cmd.exchange {
                Exchange::Request(payload) | Exchange::Response(payload) => payload,
            },
        }
    }

    /// Replace the payload of the current role
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        match self {
            Command::Request(cmd) => cmd.payload = payload,
            Command::WithResponse(cmd) => match &mut cmd.exchange {
                Exchange::Request(p) | Exchange::Response(p) => *p = payload,
            },
        }
    }

    pub(crate) fn configure(&mut self, header: &Header) -> Result<(), String> {
        match self {
            Command::Request(cmd) => cmd.action.configure(header),
            Command::WithResponse(cmd) => cmd.action.configure(header),
        }
    }

    /// Header describing this command in the given role
    pub fn header(&self, role: MessageRole) -> Header {
        let mut header = Header::new();
        header.insert(KEY_COMMAND, self.descriptor().to_string());
        header.insert(KEY_TYPE, role.header_value());
        header.insert(KEY_TIMESTAMP, now_ms().to_string());
        header
    }

    /// Render the command in its current role
    pub fn assemble(&self, processor: &dyn Processor) -> Result<String, String> {
        self.assemble_as(processor, self.role())
    }

    /// Render the command in a specific role, rejecting mismatches
    pub fn assemble_as(&self, processor: &dyn Processor, role: MessageRole) -> Result<String, String> {
        if role == MessageRole::Response && !self.has_response() {
            return Err(format!("{} does not carry a response", self.kind()));
        }
        if role != self.role() {
            return Err(format!("{} is not a {}", self.kind(), role));
        }
        Ok(processor.format(&self.header(role), self.payload()))
    }
}
