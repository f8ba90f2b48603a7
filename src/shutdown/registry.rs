//! Process-wide registry of installed shutdown actions

use super::{run_isolated, ShutdownAction, ShutdownHook};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("{0}")]
    Check(String),

    #[error("shutdown hooks already ran")]
    AlreadyRan,
}

#[derive(Default)]
pub struct ShutdownRegistry {
    next_id: AtomicU64,
    actions: Mutex<Vec<(HookId, ShutdownAction)>>,
    ran: AtomicBool,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn actions(&self) -> MutexGuard<'_, Vec<(HookId, ShutdownAction)>> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate `hook` and register its action
    pub fn install(&self, hook: &dyn ShutdownHook) -> Result<HookId, HookError> {
        if self.ran.load(Ordering::SeqCst) {
            return Err(HookError::AlreadyRan);
        }
        if let Some(message) = hook.check() {
            return Err(HookError::Check(message));
        }

        let id = HookId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.actions().push((id, hook.configure()));
        Ok(id)
    }

    /// Unregister an action; unknown ids are ignored
    pub fn remove(&self, id: HookId) -> bool {
        self.actions().retain(|(hook, _)| *hook != id);
        true
    }

    pub fn len(&self) -> usize {
        self.actions().len()
    }

    /// Run every installed action once, in install order.
    /// Returns the failure messages.
    pub async fn run(&self) -> Vec<String> {
        if self.ran.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }

        let actions = std::mem::take(&mut *self.actions());
        info!("Running {} shutdown hook(s)", actions.len());

        let mut failures = Vec::new();
        for (index, (_, action)) in actions.into_iter().enumerate() {
            if let Err(message) = run_isolated(action).await {
                error!("Shutdown hook #{} failed: {}", index + 1, message);
                failures.push(message);
            }
        }
        failures
    }
}
