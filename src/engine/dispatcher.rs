//! Dispatcher - decodes and executes incoming commands

use crate::command::{self, Command, Exchange};
use crate::context::AppContext;
use futures::FutureExt;
use rcmd_shared::ErrorCollection;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of dispatching one message
#[derive(Debug)]
pub enum Outcome {
    /// Request executed, nothing to send back
    Executed,
    /// Response to deliver to the sender
    Responded(Command),
    /// Decode or execution failure
    Failed(String),
}

/// Decode wire text with the context's processor and execute it
pub async fn dispatch_text(ctx: &AppContext, text: &str) -> Outcome {
    let mut errors = ErrorCollection::new();
    match command::parse(ctx.processor().as_ref(), ctx.registry(), text, &mut errors) {
        Some(command) => dispatch(ctx, command).await,
        None => Outcome::Failed(errors.to_string()),
    }
}

/// Execute a decoded command; panics are contained
pub async fn dispatch(ctx: &AppContext, command: Command) -> Outcome {
    let started = Instant::now();
    let descriptor = command.descriptor();
    info!("Executing command: {}", descriptor);

    let outcome = AssertUnwindSafe(run(ctx, command)).catch_unwind().await;
    let outcome = outcome.unwrap_or_else(|_| Outcome::Failed(format!("{} panicked", descriptor)));

    let elapsed = started.elapsed().as_millis();
    match &outcome {
        Outcome::Executed => info!("  Command completed in {}ms", elapsed),
        Outcome::Responded(response) => {
            info!("  Command completed in {}ms, responding", elapsed);
            debug!("  Response payload: {} bytes", response.payload().len());
        }
        Outcome::Failed(message) => warn!("  Command failed: {}", message),
    }
    outcome
}

async fn run(ctx: &AppContext, command: Command) -> Outcome {
    match command {
        Command::Request(cmd) => match cmd.action().execute(ctx, cmd.payload()).await {
            Ok(()) => Outcome::Executed,
            Err(e) => Outcome::Failed(format!("{:#}", e)),
        },
        Command::WithResponse(cmd) => {
            let payload = match cmd.exchange() {
                Exchange::Request(payload) => payload.clone(),
                Exchange::Response(_) => {
                    return Outcome::Failed(format!(
                        "Received a response for {}, expected a request",
                        cmd.action().descriptor().kind()
                    ));
                }
            };
            let result = cmd.action().execute(ctx, &payload).await;
            match result {
                Ok(response) => Outcome::Responded(cmd.into_response(response)),
                Err(e) => Outcome::Failed(format!("{:#}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use rcmd_shared::protocol::{KEY_COMMAND, KEY_TYPE};
    use rcmd_shared::Header;

    fn ctx() -> AppContext {
        AppContext::standard(HostConfig::default())
    }

    fn request(ctx: &AppContext, descriptor: &str, payload: &[u8]) -> String {
        let header = Header::from_iter([(KEY_COMMAND, descriptor)]);
        ctx.processor().format(&header, payload)
    }

    #[tokio::test]
    async fn test_request_is_executed() {
        let ctx = ctx();
        let text = request(&ctx, "basic.Text", b"hello");
        assert!(matches!(dispatch_text(&ctx, &text).await, Outcome::Executed));
    }

    #[tokio::test]
    async fn test_response_capable_request_responds() {
        let ctx = ctx();
        let text = request(&ctx, "basic.Ping", b"");
        match dispatch_text(&ctx, &text).await {
            Outcome::Responded(response) => {
                assert!(!response.is_request());
                assert_eq!(&response.payload()[..], b"pong");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let ctx = ctx();
        match dispatch_text(&ctx, "no header at all").await {
            Outcome::Failed(message) => assert!(message.contains("No command present")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incoming_response_is_rejected() {
        let ctx = ctx();
        let header = Header::from_iter([(KEY_COMMAND, "basic.Ping"), (KEY_TYPE, "Response")]);
        let text = ctx.processor().format(&header, b"pong");
        assert!(matches!(dispatch_text(&ctx, &text).await, Outcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_execution_error_is_failure() {
        // No engine is registered, so stopping it fails
        let ctx = ctx();
        let text = request(&ctx, "basic.Stop -type engine", b"");
        assert!(matches!(dispatch_text(&ctx, &text).await, Outcome::Failed(_)));
    }
}
