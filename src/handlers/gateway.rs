//! ゲートウェイのリクエスト処理チェーン
//!
//! レート制限 → キャッシュ参照 → 転送 → キャッシュ書き込み の順に適用する。
//! 各段は次段へ進めるか、その場でレスポンスを返して打ち切る。

use std::net::SocketAddr;

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::services::cache::ResponseCache;
use crate::state::GatewayState;

/// ゲートウェイのルートプレフィックス
pub const GATEWAY_PREFIX: &str = "/gateway";

/// 第1段: 呼び出し元 IP ごとのレート制限
pub async fn rate_limit(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_identity(&request);
    state.rate_limiter.check(&client).await?;
    Ok(next.run(request).await)
}

/// 第2段・第4段: GET レスポンスのキャッシュ
///
/// ヒット時は下流を呼ばずに返す。参照はパスとクエリのみで決まる。
/// 保存するのは 2xx の JSON レスポンスのうち、資格情報を伴わないリクエストに対するもので、
/// `Cache-Control: no-store` / `private` が付いたものは除く。
pub async fn response_cache(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() != Method::GET {
        return Ok(next.run(request).await);
    }

    let key = ResponseCache::key(request.uri().path(), request.uri().query());
    if let Some(body) = state.cache.get(&key).await? {
        tracing::debug!(key = %key, "キャッシュヒット");
        return Ok(cached_response(body));
    }

    let credentialed = carries_credentials(request.headers());
    let response = next.run(request).await;
    if credentialed || !is_storable(&response, state.config.max_body_bytes) {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, state.config.max_body_bytes)
        .await
        .map_err(|e| {
            AppError::UpstreamUnavailable(format!("failed to read response body: {e}"))
        })?;

    // 書き込み失敗時もレスポンスは返す
    if let Err(e) = state.cache.put(&key, &body).await {
        tracing::warn!(key = %key, error = %e, "キャッシュ書き込み失敗");
    }

    Ok(Response::from_parts(parts, Body::from(body)))
}

/// ユーザー固有のレスポンスを返しうるリクエストか
fn carries_credentials(headers: &HeaderMap) -> bool {
    headers.contains_key(header::AUTHORIZATION) || headers.contains_key(header::COOKIE)
}

/// 共有キャッシュに保存してよいレスポンスか
fn is_storable(response: &Response, max_body_bytes: usize) -> bool {
    if !response.status().is_success() {
        return false;
    }

    let headers = response.headers();
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"));
    if !is_json {
        return false;
    }

    let forbids_sharing = headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|directive| directive.trim().to_ascii_lowercase())
        .any(|directive| directive == "no-store" || directive.starts_with("private"));
    if forbids_sharing {
        return false;
    }

    // 上限を超える本文はキャッシュせずそのまま返す
    response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= max_body_bytes as u64)
}

/// 第3段: 認証サービスへの転送
///
/// `/gateway/auth/{path}` → `{AUTH_SERVICE_URL}/auth/{path}`
pub async fn forward_to_auth(
    State(state): State<GatewayState>,
    request: Request,
) -> Result<Response, AppError> {
    let path = request
        .uri()
        .path()
        .strip_prefix(GATEWAY_PREFIX)
        .unwrap_or(request.uri().path())
        .to_string();

    state
        .proxy
        .forward(&state.config.auth_service_url, &path, request)
        .await
}

/// 呼び出し元の識別子（接続元 IP）
fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn cached_response(body: axum::body::Bytes) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
