use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("メールアドレスまたはパスワードが正しくありません")]
    InvalidCredentials,

    #[error("無効なトークン")]
    InvalidToken,

    #[error("無効または期限切れのリセットトークン")]
    InvalidResetToken,

    #[error("リクエスト本文が大きすぎます")]
    PayloadTooLarge,

    #[error("リソースが見つかりません")]
    NotFound,

    #[error("レート制限超過: {limit}")]
    RateLimitExceeded { limit: String, retry_after_secs: u64 },

    #[error("上流サービスに接続できません: {0}")]
    UpstreamUnavailable(String),

    #[error("上流サービスがタイムアウトしました")]
    UpstreamTimeout,

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("共有ストアエラー")]
    SharedStore(#[from] redis::RedisError),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::EmailAlreadyExists => (
                StatusCode::BAD_REQUEST,
                "Email already registered".to_string(),
            ),
            Self::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            // 期限切れ・改ざん・形式不正を区別しない
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            Self::InvalidResetToken => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired reset token".to_string(),
            ),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            Self::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            Self::RateLimitExceeded {
                limit,
                retry_after_secs,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse {
                        detail: format!("Rate limit exceeded: {limit}"),
                    }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                return response;
            }
            Self::UpstreamUnavailable(reason) => {
                tracing::error!(reason = %reason, "上流サービス通信エラー");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service unavailable".to_string(),
                )
            }
            Self::UpstreamTimeout => {
                tracing::error!("上流サービスタイムアウト");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Upstream service timed out".to_string(),
                )
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            Self::SharedStore(e) => {
                tracing::error!(error = ?e, "共有ストア通信エラー");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service unavailable".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { detail: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::EmailAlreadyExists, StatusCode::BAD_REQUEST),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AppError::InvalidResetToken, StatusCode::BAD_REQUEST),
            (AppError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (
                AppError::UpstreamUnavailable("refused".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::UpstreamTimeout, StatusCode::GATEWAY_TIMEOUT),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = AppError::RateLimitExceeded {
            limit: "10 per 1 minute".into(),
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }

    #[tokio::test]
    async fn test_internal_error_is_opaque() {
        let response = AppError::Internal(anyhow::anyhow!("secret detail")).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Internal server error");
    }
}
