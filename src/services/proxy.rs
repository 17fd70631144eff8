use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderName, header},
    response::Response,
};

use bytes::BytesMut;

use crate::error::AppError;

/// 転送時に除去するヘッダー（プロキシ層で再計算するもの・ホップ間ヘッダー）
const NON_FORWARDED_HEADERS: [HeaderName; 9] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

/// 下流サービスへのリクエスト転送クライアント
#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ProxyClient {
    /// 新しい ProxyClient を作成
    ///
    /// `timeout` は接続から本文受信完了までの上限
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    /// リクエストを `base_url` + `path` に転送し、レスポンスをそのまま返す
    ///
    /// メソッド・クエリ・ヘッダー・本文を保持する。
    pub async fn forward(
        &self,
        base_url: &str,
        path: &str,
        request: Request,
    ) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();

        let base_url = base_url.trim_end_matches('/');
        let target_url = match parts.uri.query() {
            Some(query) => format!("{base_url}{path}?{query}"),
            None => format!("{base_url}{path}"),
        };

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| AppError::PayloadTooLarge)?;

        let mut upstream_request = self
            .client
            .request(parts.method.clone(), &target_url)
            .headers(forwardable_headers(&parts.headers));
        if !body.is_empty() {
            upstream_request = upstream_request.body(body);
        }

        tracing::debug!(method = %parts.method, target = %target_url, "リクエスト転送");

        let upstream_response = upstream_request.send().await.map_err(upstream_error)?;
        let status = upstream_response.status();
        let headers = forwardable_headers(upstream_response.headers());
        let body = self.read_capped(upstream_response).await?;

        tracing::debug!(status = %status, target = %target_url, "上流レスポンス受信");

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// 上流レスポンス本文を `max_body_bytes` まで読み込む
    ///
    /// 上限超過は上流障害として扱う。
    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Bytes, AppError> {
        let limit = self.max_body_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(response_too_large(limit));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(upstream_error)? {
            if body.len() + chunk.len() > limit {
                return Err(response_too_large(limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn response_too_large(limit: usize) -> AppError {
    AppError::UpstreamUnavailable(format!("upstream response exceeds {limit} bytes"))
}

/// 転送対象のヘッダーのみを複製
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !NON_FORWARDED_HEADERS.contains(name) && name.as_str() != "keep-alive" {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// タイムアウトと接続失敗を区別して上流エラーに変換
fn upstream_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamTimeout
    } else {
        AppError::UpstreamUnavailable(e.to_string())
    }
}
