//! Stop command handler

use crate::command::registry::{allow_options, parse_option, RegistryError};
use crate::command::{CommandSpec, RequestAction};
use crate::context::AppContext;
use anyhow::{bail, Result};
use async_trait::async_trait;
use rcmd_shared::Descriptor;
use std::fmt;
use std::str::FromStr;
use tracing::info;

pub(super) const KIND: &str = "basic.Stop";

pub(super) fn factory(descriptor: &Descriptor) -> Result<Box<dyn RequestAction>, RegistryError> {
    allow_options(descriptor, &["type"])?;
    let stop_type = parse_option(descriptor, "type")?.unwrap_or_default();
    Ok(Box::new(Stop::new(stop_type)))
}

/// What a stop request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopType {
    /// The dispatch engine that received the command
    #[default]
    Engine,
    /// The whole host process, running its shutdown hooks
    Exit,
}

impl fmt::Display for StopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopType::Engine => write!(f, "engine"),
            StopType::Exit => write!(f, "exit"),
        }
    }
}

impl FromStr for StopType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "engine" => Ok(StopType::Engine),
            "exit" => Ok(StopType::Exit),
            other => Err(format!("expected engine or exit, got {}", other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct Stop {
    stop_type: StopType,
}

impl Stop {
    pub fn new(stop_type: StopType) -> Self {
        Self { stop_type }
    }
}

impl CommandSpec for Stop {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(KIND).with("type", self.stop_type)
    }
}

#[async_trait]
impl RequestAction for Stop {
    async fn execute(&self, ctx: &AppContext, _payload: &[u8]) -> Result<()> {
        match self.stop_type {
            StopType::Engine => {
                if !ctx.stop_engine() {
                    bail!("No engine running");
                }
                info!("  [STOP] engine stop requested");
            }
            StopType::Exit => {
                info!("  [STOP] exit requested");
                ctx.request_exit();
            }
        }
        Ok(())
    }
}
