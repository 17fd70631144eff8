use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;

use crate::error::AppError;
use crate::services::shared_store::{SharedStore, with_store_timeout};

/// レスポンスキャッシュ（短TTL、期限切れ以外の無効化なし）
///
/// TTL 経過まで上流の更新は反映されない。
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
    timeout: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
        }
    }

    /// パスとクエリからキャッシュキーを生成
    pub fn key(path: &str, query: Option<&str>) -> String {
        format!("cache:{}?{}", path, query.unwrap_or_default())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, AppError> {
        let cached = with_store_timeout(self.timeout, self.store.get(key)).await?;
        Ok(cached.map(Bytes::from))
    }

    /// 同一キーへの並行書き込みは後勝ち（TTLもリセット）
    pub async fn put(&self, key: &str, body: &[u8]) -> Result<(), AppError> {
        with_store_timeout(self.timeout, self.store.set_ex(key, body, self.ttl)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::shared_store::InMemoryStore;

    #[test]
    fn test_cache_key_includes_query() {
        assert_eq!(
            ResponseCache::key("/gateway/auth/me", Some("a=1")),
            "cache:/gateway/auth/me?a=1"
        );
        assert_eq!(
            ResponseCache::key("/gateway/auth/me", None),
            "cache:/gateway/auth/me?"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire_after_ttl() {
        let cache = ResponseCache::new(
            Arc::new(InMemoryStore::new()),
            Duration::from_secs(60),
            Duration::from_millis(500),
        );
        cache.put("cache:/x?", b"{\"a\":1}").await.unwrap();
        assert_eq!(
            cache.get("cache:/x?").await.unwrap().as_deref(),
            Some(&b"{\"a\":1}"[..])
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.get("cache:/x?").await.unwrap().is_none());
    }
}
