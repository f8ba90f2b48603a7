//! Shutdown hook chain
//!
//! This module handles:
//! - Validating hooks before anything runs (`check`)
//! - Registering their actions with a [`ShutdownRegistry`]
//! - Composing hooks ([`MultiHook`]) with best-effort execution
//! - Remote shutdown through a connection ([`RemoteCommandExecution`])
//! - Stopping running flows one at a time ([`StopFlows`])

mod multi;
mod registry;
mod remote;
mod stop_flows;
mod wait;

pub use multi::MultiHook;
pub use registry::ShutdownRegistry;
pub use remote::RemoteCommandExecution;
pub use stop_flows::StopFlows;
pub use wait::wait_until;

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Action run at shutdown
pub type ShutdownAction = BoxFuture<'static, anyhow::Result<()>>;

pub trait ShutdownHook: Send + Sync {
    /// Pre-flight validation; `Some(message)` prevents installation
    fn check(&self) -> Option<String>;

    /// Build the action to run at shutdown
    fn configure(&self) -> ShutdownAction;
}

/// Run an action, turning errors and panics into a message
pub(crate) async fn run_isolated(action: ShutdownAction) -> Result<(), String> {
    match AssertUnwindSafe(action).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Hook recording its invocation into a shared log
    pub(crate) struct Recorder {
        pub name: &'static str,
        pub log: Arc<Mutex<Vec<String>>>,
        pub check_error: Option<&'static str>,
        pub fail: bool,
        pub panic: bool,
    }

    impl Recorder {
        pub(crate) fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                check_error: None,
                fail: false,
                panic: false,
            }
        }
    }

    impl ShutdownHook for Recorder {
        fn check(&self) -> Option<String> {
            self.log.lock().unwrap().push(format!("check {}", self.name));
            self.check_error.map(String::from)
        }

        fn configure(&self) -> ShutdownAction {
            let (name, log, fail, panic) = (self.name, self.log.clone(), self.fail, self.panic);
            Box::pin(async move {
                log.lock().unwrap().push(format!("run {}", name));
                if panic {
                    panic!("{} exploded", name);
                }
                if fail {
                    anyhow::bail!("{} failed", name);
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_run_isolated() {
        let ok: ShutdownAction = Box::pin(async { Ok::<(), anyhow::Error>(()) });
        assert_eq!(run_isolated(ok).await, Ok(()));

        let broken: ShutdownAction = Box::pin(async { Err::<(), _>(anyhow::anyhow!("broken")) });
        let err = run_isolated(broken).await;
        assert_eq!(err, Err("broken".into()));

        let log = Arc::new(Mutex::new(Vec::new()));
        let hook = Recorder {
            panic: true,
            ..Recorder::new("p", &log)
        };
        let err = run_isolated(hook.configure()).await.unwrap_err();
        assert!(err.contains("p exploded"));
    }
}
