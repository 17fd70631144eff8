use axum::{Json, extract::State};
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::register::TokenResponse;
use crate::state::AuthState;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// ユーザーのメールアドレス
    pub email: String,
    /// ユーザーのパスワード
    pub password: String,
}

/// ログインハンドラー
///
/// POST /auth/login
///
/// ユーザー不在・パスワード不一致はどちらも 401 "Invalid credentials"
pub async fn login(
    State(state): State<AuthState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let access_token = state
        .auth_service
        .login(&request.email, &request.password)
        .await?;

    Ok(Json(TokenResponse::bearer(access_token)))
}
