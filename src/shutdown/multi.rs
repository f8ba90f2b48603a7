//! Composite hook

use super::{run_isolated, ShutdownAction, ShutdownHook};
use tracing::error;

/// Ordered list of hooks run as one.
///
/// Every child must pass `check` before anything runs. At shutdown each
/// child's action runs in order; a failing child is logged and the
/// remaining children still run.
#[derive(Default)]
pub struct MultiHook {
    hooks: Vec<Box<dyn ShutdownHook>>,
}

impl MultiHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: impl ShutdownHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }
}

impl ShutdownHook for MultiHook {
    fn check(&self) -> Option<String> {
        self.hooks.iter().enumerate().find_map(|(index, hook)| {
            hook.check()
                .map(|message| format!("Shutdown hook #{}: {}", index + 1, message))
        })
    }

    fn configure(&self) -> ShutdownAction {
        let actions: Vec<ShutdownAction> = self.hooks.iter().map(|hook| hook.configure()).collect();
        Box::pin(run_all(actions))
    }
}

async fn run_all(actions: Vec<ShutdownAction>) -> anyhow::Result<()> {
    for (index, action) in actions.into_iter().enumerate() {
        if let Err(message) = run_isolated(action).await {
            error!("Shutdown hook #{} failed: {}", index + 1, message);
        }
    }
    Ok(())
}
