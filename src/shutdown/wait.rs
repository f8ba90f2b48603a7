use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `condition` every `interval` until it holds or `timeout` elapses.
/// Returns whether the condition became true.
pub async fn wait_until<F>(mut condition: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_condition_met() {
        let mut calls = 0;
        let met = wait_until(
            || {
                calls += 1;
                calls == 3
            },
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await;
        assert!(met);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_deadline_is_respected() {
        let started = std::time::Instant::now();
        let met = wait_until(|| false, Duration::from_millis(50), Duration::from_millis(20)).await;
        let elapsed = started.elapsed();

        assert!(!met);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_timeout_checks_once() {
        assert!(wait_until(|| true, Duration::ZERO, Duration::from_millis(10)).await);
        assert!(!wait_until(|| false, Duration::ZERO, Duration::from_millis(10)).await);
    }
}
