use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, StatusError};

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Bounded retries for transient failures. `retries == 0` means one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryConfig {
    pub fn new(retries: u32, backoff_base: Duration) -> Self {
        Self {
            retries,
            backoff_base,
            ..Self::default()
        }
    }
}

pub async fn retry<T, F, Fut>(cfg: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StatusError>>,
{
    let mut backoff = cfg.backoff_base;
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < cfg.retries => {
                attempt += 1;
                warn!(error = %e, attempt, max = cfg.retries, what, "retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(cfg.backoff_max);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn quick(retries: u32) -> RetryConfig {
        RetryConfig::new(retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out = retry(&quick(2), "fetch n1", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StatusError::node_status("n1", "timed out"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry(&quick(1), "fetch n1", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StatusError::node_status("n1", "exit status 1"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StatusError::NodeStatus { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_local_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _ = retry(&quick(5), "read", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StatusError::Parse {
                path: "used_mem_gi.total".into(),
                value: "x".into(),
            })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
