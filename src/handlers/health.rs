use axum::Json;
use serde::Serialize;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// ヘルスチェック
///
/// GET /health
///
/// 認証サービス・ゲートウェイ共通。ルーター側でサービス名を渡す。
pub async fn health_check(service: &'static str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_reports_service() {
        let response = health_check("gateway").await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.service, "gateway");
    }
}
