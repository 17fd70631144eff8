use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use authgate::{
    app::{create_auth_router, init_tracing, shutdown_signal},
    config::AuthConfig,
    repositories::PgUserStore,
    state::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env があれば読み込む
    dotenvy::dotenv().ok();

    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("認証サービス起動中...");

    let config = AuthConfig::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, env = ?config.env, "設定読み込み完了");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    // データベース接続プール作成
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "データベース接続に失敗");
            anyhow::anyhow!("Failed to connect to database: {}", e)
        })?;

    let user_store = PgUserStore::new(db_pool);
    user_store.ensure_schema().await.map_err(|e| {
        tracing::error!(error = ?e, "users テーブルの作成に失敗");
        anyhow::anyhow!("Failed to ensure schema: {}", e)
    })?;

    tracing::info!("データベース接続完了");

    let state = AuthState::new(&config, Arc::new(user_store)).map_err(|e| {
        tracing::error!(error = ?e, "AuthState の構築に失敗");
        anyhow::anyhow!("Failed to create AuthState: {}", e)
    })?;

    let app = create_auth_router(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}
