use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AuthState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
}

/// アクセストークンレスポンス（登録・ログイン共通）
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

/// ユーザー登録ハンドラー
///
/// POST /auth/register
///
/// # Security
/// - パスワードはログに出力しない
pub async fn register(
    State(state): State<AuthState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let access_token = state
        .auth_service
        .register(&request.email, &request.password)
        .await?;

    Ok(Json(TokenResponse::bearer(access_token)))
}
