use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitQuota;
use crate::error::AppError;
use crate::services::shared_store::{SharedStore, with_store_timeout};

/// 呼び出し元ごとの固定ウィンドウ・レートリミッター
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    quota: RateLimitQuota,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, quota: RateLimitQuota, timeout: Duration) -> Self {
        Self {
            store,
            quota,
            timeout,
        }
    }

    /// リクエストを1件カウントし、割り当て超過なら `RateLimitExceeded` を返す
    pub async fn check(&self, client: &str) -> Result<(), AppError> {
        // IPv6 の角括弧を除去
        let client = client.trim_start_matches('[').trim_end_matches(']');
        let key = format!("rate:gateway:{client}");

        let counted = with_store_timeout(
            self.timeout,
            self.store.incr_window(&key, self.quota.window),
        )
        .await?;

        if counted.count > self.quota.limit {
            tracing::warn!(client = %client, count = counted.count, "レート制限超過");
            return Err(AppError::RateLimitExceeded {
                limit: self.quota.to_string(),
                retry_after_secs: counted.resets_in.as_secs_f64().ceil() as u64,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::shared_store::InMemoryStore;

    fn limiter(quota: &str) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            quota.parse().unwrap(),
            Duration::from_millis(500),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_is_rejected_until_next_window() {
        let limiter = limiter("10/minute");
        for _ in 0..10 {
            limiter.check("10.0.0.1").await.unwrap();
        }

        let result = limiter.check("10.0.0.1").await;
        match result {
            Err(AppError::RateLimitExceeded {
                limit,
                retry_after_secs,
            }) => {
                assert_eq!(limit, "10 per 1 minute");
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.check("10.0.0.1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_counted_separately() {
        let limiter = limiter("1/minute");
        limiter.check("10.0.0.1").await.unwrap();
        assert!(limiter.check("10.0.0.1").await.is_err());
        assert!(limiter.check("10.0.0.2").await.is_ok());
        assert!(limiter.check("[::1]").await.is_ok());
        assert!(limiter.check("::1").await.is_err());
    }
}
