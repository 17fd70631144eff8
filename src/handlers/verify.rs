use axum::{
    Json,
    extract::State,
    http::{
        HeaderMap,
        header::{AUTHORIZATION, CACHE_CONTROL},
    },
    response::IntoResponse,
};

use crate::error::AppError;
use crate::services::token::AccessClaims;
use crate::state::AuthState;

/// アクセストークン検証ハンドラー
///
/// GET /auth/verify
///
/// `Authorization: Bearer <token>` を検証し、クレームを返す。
/// 呼び出し元固有の内容のため共有キャッシュには載せない。
pub async fn verify_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::InvalidToken)?;
    let claims = state
        .auth_service
        .token_codec()
        .verify_access_token(token)?;

    Ok(([(CACHE_CONTROL, "no-store")], Json::<AccessClaims>(claims)))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
