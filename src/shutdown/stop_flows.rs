//! Hook stopping running flows

use super::{wait_until, ShutdownAction, ShutdownHook};
use crate::flow::FlowRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Stops every registered flow, one at a time.
///
/// The stop of flow n+1 is only requested once flow n has stopped or its
/// timeout elapsed, so the worst case takes `timeout * flows`.
pub struct StopFlows {
    flows: Arc<FlowRegistry>,
    timeout: Duration,
    poll_interval: Duration,
}

impl StopFlows {
    pub fn new(flows: Arc<FlowRegistry>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            flows,
            timeout,
            poll_interval,
        }
    }
}

impl ShutdownHook for StopFlows {
    fn check(&self) -> Option<String> {
        if self.poll_interval.is_zero() {
            return Some("Poll interval must be positive".into());
        }
        None
    }

    fn configure(&self) -> ShutdownAction {
        Box::pin(stop_all(self.flows.clone(), self.timeout, self.poll_interval))
    }
}

async fn stop_all(flows: Arc<FlowRegistry>, timeout: Duration, interval: Duration) -> anyhow::Result<()> {
    for id in flows.ids().await {
        let Some(flow) = flows.get(id).await else {
            continue;
        };
        let label = format!("#{} ({})", id, flow.source());

        let stopping = flow.clone();
        tokio::spawn(async move { stopping.stop_execution().await });

        if wait_until(|| flow.is_stopped(), timeout, interval).await {
            info!("Flow {} stopped", label);
        } else {
            warn!("Flow {} did not stop within {}ms", label, timeout.as_millis());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Flow, SlowFlow};
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    #[tokio::test]
    async fn test_stubborn_flows_are_waited_for_sequentially() {
        let flows = Arc::new(FlowRegistry::new());
        let stubborn: Vec<Arc<SlowFlow>> = (0..3)
            .map(|i| Arc::new(SlowFlow::new(&format!("stubborn-{}", i), None)))
            .collect();
        for flow in &stubborn {
            flows.add(flow.clone()).await;
        }

        let timeout = Duration::from_millis(40);
        let hook = StopFlows::new(flows, timeout, Duration::from_millis(5));

        let started = Instant::now();
        hook.configure().await.unwrap();
        assert!(started.elapsed() >= timeout * 3);
        assert!(stubborn.iter().all(|f| f.stop_requests.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn test_next_stop_waits_for_previous_flow() {
        let flows = Arc::new(FlowRegistry::new());
        let first = Arc::new(SlowFlow::new("first", Some(Duration::from_millis(30))));
        let second = Arc::new(SlowFlow::new("second", Some(Duration::from_millis(0))));
        flows.add(first.clone()).await;
        flows.add(second.clone()).await;

        let hook = StopFlows::new(flows, Duration::from_secs(2), Duration::from_millis(5));
        let action = hook.configure();
        let task = tokio::spawn(action);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(first.stop_requests.load(Ordering::SeqCst), 1);
        assert_eq!(second.stop_requests.load(Ordering::SeqCst), 0);

        task.await.unwrap().unwrap();
        assert!(first.is_stopped());
        assert!(second.is_stopped());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let hook = StopFlows::new(Arc::new(FlowRegistry::new()), Duration::from_secs(1), Duration::ZERO);
        assert!(hook.check().is_some());
    }
}
