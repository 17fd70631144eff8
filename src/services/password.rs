use std::sync::LazyLock;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::error::AppError;

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードを検証
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// タイミング攻撃対策用のダミーハッシュ
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("dummy-password-for-timing").ok());

/// ユーザー不在時にも同等のコストで検証を実行する
pub fn verify_dummy_password(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}

/// パスワードポリシー
///
/// 禁止文字はデニーリスト。正当なパスワードを弾かないよう最小限に保つこと。
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    min_length: usize,
    forbidden_chars: String,
}

impl PasswordPolicy {
    pub fn new(min_length: usize, forbidden_chars: impl Into<String>) -> Self {
        Self {
            min_length,
            forbidden_chars: forbidden_chars.into(),
        }
    }

    /// ポリシー適合チェック
    ///
    /// 不適合の場合は理由を返す。
    pub fn check(&self, password: &str) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            return Err(format!(
                "Password must be at least {} characters long.",
                self.min_length
            ));
        }

        if password.chars().any(|c| self.forbidden_chars.contains(c)) {
            return Err(format!(
                "Password must not contain special characters like {}",
                self.forbidden_chars
            ));
        }

        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(8, "!@#$\",.<>/?\\")
    }
}
