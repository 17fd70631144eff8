use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretBox;
use serde::Deserialize;

/// 動作モード
///
/// 開発モードのみパスワードリセットトークンをレスポンスに含める。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Development,
    Production,
}

impl OperatingMode {
    /// リセットトークンをレスポンスで返してよいか
    pub fn exposes_reset_tokens(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// 認証サービスの設定
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_auth_port")]
    pub port: u16,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    // JWT 設定
    pub secret_key: SecretBox<String>,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: i64,

    // パスワードリセット設定
    #[serde(default = "default_reset_token_expire_hours")]
    pub reset_token_expire_hours: i64,

    // パスワードポリシー
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    #[serde(default = "default_password_forbidden_chars")]
    pub password_forbidden_chars: String,

    #[serde(default)]
    pub env: OperatingMode,
}

/// ゲートウェイの設定
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// 転送先の認証サービス
    #[serde(default = "default_auth_service_url")]
    pub auth_service_url: String,

    // Redis 設定（キャッシュ・レート制限で共有）
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_db: u8,

    /// "N/period" 形式（例: "10/minute"）
    #[serde(default = "default_rate_limit")]
    pub rate_limit: RateLimitQuota,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    pub env: OperatingMode,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_AUTH_PORT: u16 = 5001;
const DEFAULT_GATEWAY_PORT: u16 = 8080;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ALGORITHM: &str = "HS256";
const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 60;
const DEFAULT_RESET_TOKEN_EXPIRE_HOURS: i64 = 1;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;
const DEFAULT_PASSWORD_FORBIDDEN_CHARS: &str = "!@#$\",.<>/?\\";
const DEFAULT_AUTH_SERVICE_URL: &str = "http://authservice:5001";
const DEFAULT_REDIS_HOST: &str = "redis";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_RATE_LIMIT: &str = "10/minute";
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_auth_port() -> u16 {
    DEFAULT_AUTH_PORT
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_database_max_connections() -> u32 {
    DEFAULT_DATABASE_MAX_CONNECTIONS
}

fn default_algorithm() -> String {
    DEFAULT_ALGORITHM.to_string()
}

fn default_access_token_expire_minutes() -> i64 {
    DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES
}

fn default_reset_token_expire_hours() -> i64 {
    DEFAULT_RESET_TOKEN_EXPIRE_HOURS
}

fn default_password_min_length() -> usize {
    DEFAULT_PASSWORD_MIN_LENGTH
}

fn default_password_forbidden_chars() -> String {
    DEFAULT_PASSWORD_FORBIDDEN_CHARS.to_string()
}

fn default_auth_service_url() -> String {
    DEFAULT_AUTH_SERVICE_URL.to_string()
}

fn default_redis_host() -> String {
    DEFAULT_REDIS_HOST.to_string()
}

fn default_redis_port() -> u16 {
    DEFAULT_REDIS_PORT
}

fn default_rate_limit() -> RateLimitQuota {
    RateLimitQuota {
        limit: 10,
        window: Duration::from_secs(60),
    }
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_upstream_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl AuthConfig {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

impl GatewayConfig {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.redis_host, self.redis_port, self.redis_db
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_gateway_port(),
            auth_service_url: default_auth_service_url(),
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            redis_db: 0,
            rate_limit: default_rate_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            store_timeout_ms: default_store_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            env: OperatingMode::default(),
        }
    }
}

/// レート制限の割り当て（固定ウィンドウ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct RateLimitQuota {
    /// ウィンドウ内で許可するリクエスト数
    pub limit: u64,
    /// ウィンドウ長
    pub window: Duration,
}

impl FromStr for RateLimitQuota {
    type Err = String;

    /// "10/minute", "10 per minute", "100/2 hours" を受け付ける
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (count, period) = s
            .split_once('/')
            .or_else(|| s.split_once(" per "))
            .ok_or_else(|| format!("invalid rate limit '{s}': expected N/period"))?;

        let limit: u64 = count
            .trim()
            .parse()
            .map_err(|_| format!("invalid rate limit count '{}'", count.trim()))?;
        if limit == 0 {
            return Err("rate limit count must be positive".to_string());
        }

        let period = period.trim();
        let (multiplier, unit) = match period.split_once(char::is_whitespace) {
            Some((n, unit)) => (
                n.parse::<u64>()
                    .map_err(|_| format!("invalid rate limit multiplier '{n}'"))?,
                unit.trim(),
            ),
            None => (1, period),
        };
        if multiplier == 0 {
            return Err("rate limit period must be positive".to_string());
        }

        let unit_secs = match unit.to_ascii_lowercase().trim_end_matches('s') {
            "second" | "sec" => 1,
            "minute" | "min" => 60,
            "hour" => 3600,
            "day" => 86400,
            other => return Err(format!("unknown rate limit period '{other}'")),
        };

        Ok(Self {
            limit,
            window: Duration::from_secs(multiplier * unit_secs),
        })
    }
}

impl TryFrom<String> for RateLimitQuota {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RateLimitQuota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.window.as_secs();
        let (n, unit) = [(86400, "day"), (3600, "hour"), (60, "minute")]
            .into_iter()
            .find(|(unit_secs, _)| secs >= *unit_secs && secs % unit_secs == 0)
            .map(|(unit_secs, unit)| (secs / unit_secs, unit))
            .unwrap_or((secs, "second"));
        write!(f, "{} per {} {}", self.limit, n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_quota() {
        let quota: RateLimitQuota = "10/minute".parse().unwrap();
        assert_eq!(quota.limit, 10);
        assert_eq!(quota.window, Duration::from_secs(60));
        assert_eq!(quota, default_rate_limit());
    }

    #[test]
    fn test_parse_quota_variants() {
        let quota: RateLimitQuota = "5 per hour".parse().unwrap();
        assert_eq!(quota.window, Duration::from_secs(3600));

        let quota: RateLimitQuota = "100/2 minutes".parse().unwrap();
        assert_eq!(quota.limit, 100);
        assert_eq!(quota.window, Duration::from_secs(120));

        let quota: RateLimitQuota = "3/second".parse().unwrap();
        assert_eq!(quota.window, Duration::from_secs(1));
    }

    #[test]
    fn test_parse_invalid_quota() {
        assert!("ten/minute".parse::<RateLimitQuota>().is_err());
        assert!("0/minute".parse::<RateLimitQuota>().is_err());
        assert!("10/fortnight".parse::<RateLimitQuota>().is_err());
        assert!("10".parse::<RateLimitQuota>().is_err());
    }

    #[test]
    fn test_quota_display() {
        let quota: RateLimitQuota = "10/minute".parse().unwrap();
        assert_eq!(quota.to_string(), "10 per 1 minute");
        let quota: RateLimitQuota = "7/90 seconds".parse().unwrap();
        assert_eq!(quota.to_string(), "7 per 90 second");
    }

    #[test]
    fn test_operating_mode_exposes_reset_tokens() {
        assert!(OperatingMode::Development.exposes_reset_tokens());
        assert!(!OperatingMode::Production.exposes_reset_tokens());
    }

    #[test]
    fn test_redis_url() {
        let config = GatewayConfig::default();
        assert_eq!(config.redis_url(), "redis://redis:6379/0");
    }
}
