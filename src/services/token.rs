use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::error::AppError;

/// リセットトークンのランダムバイト数
const RESET_TOKEN_BYTES: usize = 48;

/// アクセストークンのペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// 正規化済みメールアドレス
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// 署名付きアクセストークンの発行・検証
///
/// 発行済みトークンはサーバー側に保存しない（失効リストなし）。
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl TokenCodec {
    /// 新しい TokenCodec を作成
    ///
    /// 共有シークレットで署名するため HMAC 系アルゴリズムのみ受け付ける。
    pub fn new(secret: &str, algorithm: &str, ttl: Duration) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "token signing secret must not be empty"
            )));
        }

        let algorithm = Algorithm::from_str(algorithm).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("unknown JWT algorithm '{algorithm}': {e}"))
        })?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "JWT algorithm {algorithm:?} requires an asymmetric key"
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            ttl,
        })
    }

    /// アクセストークンを発行
    pub fn issue_access_token(&self, subject: &str) -> Result<String, AppError> {
        self.issue_access_token_at(subject, OffsetDateTime::now_utc())
    }

    /// 発行時刻を指定してアクセストークンを発行
    pub fn issue_access_token_at(
        &self,
        subject: &str,
        issued_at: OffsetDateTime,
    ) -> Result<String, AppError> {
        let claims = AccessClaims {
            sub: subject.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + self.ttl).unix_timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = ?e, "JWT 署名エラー");
            AppError::Internal(anyhow::anyhow!("token signing error"))
        })
    }

    /// アクセストークンを検証
    ///
    /// 失敗理由（期限切れ・署名不正・形式不正）は呼び出し側に区別させない。
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT 検証失敗");
                AppError::InvalidToken
            })
    }
}

/// ワンタイムのリセットトークンを生成（URL-safe）
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// リセットトークンをSHA256でハッシュ化（保存用）
pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(secret: &str) -> TokenCodec {
        TokenCodec::new(secret, "HS256", Duration::minutes(60)).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let codec = codec("test-secret");
        let token = codec.issue_access_token("a@x.com").unwrap();
        let claims = codec.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let codec = codec("test-secret");
        let issued_at = OffsetDateTime::now_utc() - Duration::minutes(61);
        let token = codec.issue_access_token_at("a@x.com", issued_at).unwrap();
        assert!(matches!(
            codec.verify_access_token(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = codec("secret-a").issue_access_token("a@x.com").unwrap();
        assert!(matches!(
            codec("secret-b").verify_access_token(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_malformed_token_is_rejected() {
        let codec = codec("test-secret");
        assert!(matches!(
            codec.verify_access_token("not.a.jwt"),
            Err(AppError::InvalidToken)
        ));

        let mut token = codec.issue_access_token("a@x.com").unwrap();
        token.push('x');
        assert!(codec.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_algorithm_is_configurable() {
        let codec = TokenCodec::new("test-secret", "HS512", Duration::minutes(5)).unwrap();
        let token = codec.issue_access_token("a@x.com").unwrap();
        assert_eq!(codec.verify_access_token(&token).unwrap().sub, "a@x.com");
    }

    #[test]
    fn test_rejects_unusable_configuration() {
        assert!(TokenCodec::new("test-secret", "RS256", Duration::minutes(5)).is_err());
        assert!(TokenCodec::new("test-secret", "NOPE", Duration::minutes(5)).is_err());
        assert!(TokenCodec::new("", "HS256", Duration::minutes(5)).is_err());
    }

    #[test]
    fn test_generate_reset_token() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        // 48バイト → Base64(パディングなし) 64文字
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_hash_reset_token_is_deterministic() {
        assert_eq!(hash_reset_token("abc"), hash_reset_token("abc"));
        assert_ne!(hash_reset_token("abc"), hash_reset_token("abd"));
        assert_eq!(hash_reset_token("abc").len(), 64);
    }
}
