//! Hook driving a remote shutdown through a connection

use super::{panic_message, wait_until, ShutdownAction, ShutdownHook};
use crate::command::Command;
use crate::connection::Connection;
use crate::context::AppContext;
use crate::engine::ScriptingEngine;
use anyhow::anyhow;
use rcmd_shared::protocol::DEFAULT_POLL_INTERVAL_MS;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Sends a list of commands at shutdown, optionally with a local engine
/// running to receive them.
///
/// Commands are sent in order and sending stops at the first failure.
/// A started engine gets `wait_time` to report stopped before it is
/// forced to stop.
pub struct RemoteCommandExecution {
    ctx: Arc<AppContext>,
    connection: Arc<dyn Connection>,
    commands: Vec<Arc<Command>>,
    engine: Option<Arc<dyn ScriptingEngine>>,
    wait_time: Duration,
    poll_interval: Duration,
}

impl RemoteCommandExecution {
    pub fn new(ctx: Arc<AppContext>, connection: Arc<dyn Connection>) -> Self {
        let wait_time = ctx.config().grace_period;
        Self {
            ctx,
            connection,
            commands: Vec::new(),
            engine: None,
            wait_time,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(Arc::new(command));
        self
    }

    /// Engine to start before any command is sent
    pub fn engine(mut self, engine: Arc<dyn ScriptingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl ShutdownHook for RemoteCommandExecution {
    fn check(&self) -> Option<String> {
        if self.commands.is_empty() {
            return Some("No commands to send".into());
        }
        if let Some(index) = self.commands.iter().position(|c| !c.is_request()) {
            return Some(format!("Command #{} is not a request", index + 1));
        }
        if self.poll_interval.is_zero() {
            return Some("Poll interval must be positive".into());
        }
        if self.engine.is_some() && self.wait_time.is_zero() {
            return Some("Wait time must be positive when starting an engine".into());
        }
        None
    }

    fn configure(&self) -> ShutdownAction {
        Box::pin(run(
            self.ctx.clone(),
            self.connection.clone(),
            self.commands.clone(),
            self.engine.clone(),
            self.wait_time,
            self.poll_interval,
        ))
    }
}

async fn run(
    ctx: Arc<AppContext>,
    connection: Arc<dyn Connection>,
    commands: Vec<Arc<Command>>,
    engine: Option<Arc<dyn ScriptingEngine>>,
    wait_time: Duration,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    let started = engine.map(|engine| {
        if engine.control().owner().is_none() {
            engine.control().set_owner("shutdown hook");
        }
        ctx.set_engine(engine.clone());
        let task = tokio::spawn({
            let (ctx, engine) = (ctx.clone(), engine.clone());
            async move { engine.execute(ctx).await }
        });
        info!("Started {} engine", engine.name());
        (engine, task)
    });

    let mut failures = Vec::new();
    for (index, command) in commands.iter().enumerate() {
        info!("Sending {} to {}", command.descriptor(), connection.name());
        if let Err(e) = connection.send_request(command).await {
            let message = format!("Command #{}: {:#}", index + 1, e);
            error!("{}", message);
            failures.push(message);
            break;
        }
    }

    if let Some((engine, task)) = started {
        if failures.is_empty() {
            let finished = wait_until(
                || engine.is_stopped() || task.is_finished(),
                wait_time,
                poll_interval,
            )
            .await;
            if !finished {
                let message = format!(
                    "Engine {} did not stop within {}ms",
                    engine.name(),
                    wait_time.as_millis()
                );
                warn!("{}, forcing stop", message);
                failures.push(message);
            }
        }
        if let Some(message) = finish_engine(engine.as_ref(), task, poll_interval).await {
            failures.push(message);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(failures.join("; ")))
    }
}

/// Stop the engine and collect how its task ended
async fn finish_engine(
    engine: &dyn ScriptingEngine,
    mut task: JoinHandle<anyhow::Result<()>>,
    grace: Duration,
) -> Option<String> {
    let result = if task.is_finished() {
        task.await
    } else {
        engine.stop_execution();
        match timeout(grace, &mut task).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Engine {} ignored stop request, aborting", engine.name());
                task.abort();
                return None;
            }
        }
    };

    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("Engine {} failed: {:#}", engine.name(), e)),
        Err(e) if e.is_panic() => Some(format!(
            "Engine {} panicked: {}",
            engine.name(),
            panic_message(e.into_panic().as_ref())
        )),
        Err(e) => Some(format!("Engine {} was cancelled: {}", engine.name(), e)),
    }
}
