use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{self, health_check};
use crate::state::{AuthState, GatewayState};

/// 認証サービスの Router 構築
pub fn create_auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/health", get(|| health_check("auth")))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .route("/auth/verify", get(handlers::verify_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ゲートウェイの Router 構築
///
/// route_layer は後に追加したものが外側になる（レート制限 → キャッシュ → 転送）。
/// `/health` はレート制限・キャッシュの対象外。
pub fn create_gateway_router(state: GatewayState) -> Router {
    let forward = handlers::forward_to_auth;

    Router::new()
        .route(
            "/gateway/auth/{*path}",
            get(forward)
                .post(forward)
                .put(forward)
                .patch(forward)
                .delete(forward),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::response_cache,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::rate_limit,
        ))
        .route("/health", get(|| health_check("gateway")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// tracing の初期化（JSON形式）
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,authgate=debug,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Graceful shutdown シグナル待機
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
