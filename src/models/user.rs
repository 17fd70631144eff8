use time::OffsetDateTime;
use uuid::Uuid;

/// 認証ユーザー（ドメイン値）
///
/// 永続化スキーマとは分離されており、リポジトリ境界で変換する。
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// リセットトークンの SHA-256 ハッシュ（平文は保存しない）
    pub reset_token_hash: Option<String>,
    pub reset_token_expires: Option<OffsetDateTime>,
}

/// メールアドレスを正規化（前後空白除去・小文字化）
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
