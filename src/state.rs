use std::sync::Arc;

use secrecy::ExposeSecret;
use time::Duration;

use crate::config::{AuthConfig, GatewayConfig};
use crate::error::AppError;
use crate::repositories::UserStore;
use crate::services::password::PasswordPolicy;
use crate::services::{
    AuthService, ProxyClient, RateLimiter, ResponseCache, SharedStore, TokenCodec,
};

/// 認証サービスの共有状態
///
/// axum の State として全ハンドラーで共有される。
#[derive(Clone)]
pub struct AuthState {
    pub auth_service: AuthService,
}

impl AuthState {
    /// 設定から AuthState を構築
    pub fn new(config: &AuthConfig, user_store: Arc<dyn UserStore>) -> Result<Self, AppError> {
        let token_codec = TokenCodec::new(
            config.secret_key.expose_secret(),
            &config.algorithm,
            Duration::minutes(config.access_token_expire_minutes),
        )?;
        let policy = PasswordPolicy::new(
            config.password_min_length,
            config.password_forbidden_chars.clone(),
        );
        let auth_service = AuthService::new(
            user_store,
            token_codec,
            policy,
            Duration::hours(config.reset_token_expire_hours),
            config.env,
        );

        Ok(Self { auth_service })
    }

    pub fn from_service(auth_service: AuthService) -> Self {
        Self { auth_service }
    }
}

/// ゲートウェイの共有状態
///
/// プロセス内で可変状態は持たず、キャッシュとカウンタは共有ストアに置く。
#[derive(Clone)]
pub struct GatewayState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<GatewayConfig>,
    /// 下流転送クライアント
    pub proxy: ProxyClient,
    /// レスポンスキャッシュ
    pub cache: ResponseCache,
    /// レートリミッター
    pub rate_limiter: RateLimiter,
}

impl GatewayState {
    /// 新しい GatewayState を作成
    pub fn new(config: GatewayConfig, store: Arc<dyn SharedStore>) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let proxy = ProxyClient::new(config.upstream_timeout(), config.max_body_bytes)?;
        let cache = ResponseCache::new(store.clone(), config.cache_ttl(), config.store_timeout());
        let rate_limiter = RateLimiter::new(store, config.rate_limit, config.store_timeout());

        Ok(Self {
            config,
            proxy,
            cache,
            rate_limiter,
        })
    }
}
