//! Background workflows
//!
//! A flow is any long-running unit of work started by a command. Running
//! flows are tracked in the [`FlowRegistry`] so they can be listed,
//! stopped individually, or stopped together at shutdown.

mod registry;
mod script;

pub use registry::FlowRegistry;
pub use script::ScriptFlow;

#[cfg(test)]
pub(crate) use registry::tests::SlowFlow;

use async_trait::async_trait;
use std::fmt;

#[async_trait]
pub trait Flow: Send + Sync + fmt::Debug {
    /// Human readable description of what is running
    fn source(&self) -> String;

    /// Ask the flow to stop; may return before it actually has
    async fn stop_execution(&self);

    /// Whether the flow has finished
    fn is_stopped(&self) -> bool;
}
