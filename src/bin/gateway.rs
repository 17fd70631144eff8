use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use authgate::{
    app::{create_gateway_router, init_tracing, shutdown_signal},
    config::GatewayConfig,
    services::RedisStore,
    state::GatewayState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env があれば読み込む
    dotenvy::dotenv().ok();

    init_tracing();

    tracing::info!("ゲートウェイ起動中...");

    let config = GatewayConfig::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        auth_service = %config.auth_service_url,
        redis = %format!("{}:{}", config.redis_host, config.redis_port),
        rate_limit = %config.rate_limit,
        "設定読み込み完了"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    // 共有ストア（キャッシュ・レート制限）
    let store = RedisStore::connect(&config.redis_url()).await.map_err(|e| {
        tracing::error!(error = ?e, "Redis 接続に失敗");
        anyhow::anyhow!("Failed to connect to Redis: {}", e)
    })?;

    tracing::info!("Redis 接続完了");

    let state = GatewayState::new(config, Arc::new(store)).map_err(|e| {
        tracing::error!(error = ?e, "GatewayState の構築に失敗");
        anyhow::anyhow!("Failed to create GatewayState: {}", e)
    })?;

    let app = create_gateway_router(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // レート制限のため接続元アドレスを付与
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| {
        tracing::error!(error = ?e, "サーバーエラー");
        anyhow::anyhow!("Server error: {}", e)
    })?;

    tracing::info!("サーバー終了");

    Ok(())
}
