use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::services::auth::PasswordResetOutcome;
use crate::state::AuthState;

const GENERIC_RESET_MESSAGE: &str =
    "If an account with this email exists, a reset link has been sent.";
const DEVELOPMENT_RESET_MESSAGE: &str = "Password reset link sent (development)";

// === リセットリクエスト ===

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

impl From<PasswordResetOutcome> for ForgotPasswordResponse {
    fn from(outcome: PasswordResetOutcome) -> Self {
        match outcome {
            PasswordResetOutcome::Acknowledged => Self {
                message: GENERIC_RESET_MESSAGE.to_string(),
                reset_token: None,
            },
            PasswordResetOutcome::Issued { reset_token } => Self {
                message: DEVELOPMENT_RESET_MESSAGE.to_string(),
                reset_token: Some(reset_token),
            },
        }
    }
}

/// POST /auth/forgot-password
///
/// # Security
/// 常に200を返す（ユーザー存在有無を漏洩しない）。
/// 開発モードでのみ既存ユーザーのトークンを返却する。
pub async fn forgot_password(
    State(state): State<AuthState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, AppError> {
    let outcome = state
        .auth_service
        .request_password_reset(&request.email)
        .await?;

    Ok(Json(outcome.into()))
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// POST /auth/reset-password
///
/// # Security
/// - token, new_password はログに出力しない
pub async fn reset_password(
    State(state): State<AuthState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    state
        .auth_service
        .reset_password(&request.token, &request.new_password)
        .await?;

    Ok(Json(ResetPasswordResponse {
        message: "Password has been reset".to_string(),
    }))
}
