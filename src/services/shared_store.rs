use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AppError;

/// 固定ウィンドウ内のカウント結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// ウィンドウ内の累計回数（今回分を含む）
    pub count: u64,
    /// ウィンドウがリセットされるまでの残り時間
    pub resets_in: Duration,
}

/// ゲートウェイ間で共有するキー・バリューストア
///
/// 各操作は単一キーの粒度でアトミックであること。
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    /// TTL付きで保存（既存値は上書き、TTLもリセット）
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), AppError>;

    /// カウンタをインクリメントし、初回のみウィンドウ長の有効期限を設定
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, AppError>;
}

/// 共有ストア呼び出しにタイムアウトを適用
///
/// タイムアウトは上流障害として扱う。
pub async fn with_store_timeout<T, F>(timeout: Duration, operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "共有ストアタイムアウト");
            AppError::UpstreamTimeout
        })?
}

/// INCR と有効期限設定を1回の往復でアトミックに行う
const INCR_WINDOW_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Redis 実装（自動再接続）
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Redis に接続
    ///
    /// redis:// と rediss:// (TLS) の両方に対応
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, AppError> {
        let mut conn = self.conn.clone();
        let window_ms = window.as_millis().max(1) as u64;

        let (count, ttl_ms): (i64, i64) = redis::Script::new(INCR_WINDOW_SCRIPT)
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowCount {
            count: count.max(0) as u64,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}

/// インメモリ実装（テスト用）
///
/// 複数インスタンス間では共有されない。期限切れのエントリは書き込み時に掃除する。
#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保持中のキー数（値とカウンタの合計）
    pub async fn key_count(&self) -> usize {
        self.values.lock().await.len() + self.counters.lock().await.len()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut values = self.values.lock().await;
        match values.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), AppError> {
        let now = Instant::now();
        let mut values = self.values.lock().await;
        values.retain(|_, (_, expires_at)| *expires_at > now);
        values.insert(key.to_string(), (value.to_vec(), now + ttl));
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, AppError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        counters.retain(|_, (_, resets_at)| *resets_at > now);
        let entry = counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        entry.0 += 1;

        Ok(WindowCount {
            count: entry.0,
            resets_in: entry.1 - now,
        })
    }
}
