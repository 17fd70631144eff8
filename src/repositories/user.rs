use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// 認証情報ストア
///
/// メールアドレスの一意性はストア側で保証すること。
/// アプリケーション側の事前チェックは最適化に過ぎない。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 正規化済みメールアドレスでユーザーを検索
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// 新しいユーザーを作成
    ///
    /// # Errors
    /// - メールアドレス重複時: `AppError::EmailAlreadyExists`
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AppError>;

    /// リセットトークン（ハッシュ）と有効期限をまとめて設定
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// 有効なリセットトークンを消費してパスワードを更新
    ///
    /// トークン一致・期限内の場合のみ更新し、トークンと期限を同時に消去する。
    /// 更新した場合 `true` を返す。
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError>;
}

/// `users` テーブルの行
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    reset_token: Option<String>,
    reset_token_expires: Option<OffsetDateTime>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            reset_token_hash: row.reset_token,
            reset_token_expires: row.reset_token_expires,
        }
    }
}

/// PostgreSQL 実装
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `users` テーブルが無ければ作成
    ///
    /// `email` の UNIQUE 制約が重複登録に対する最終的な防御となる。
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                reset_token TEXT NULL,
                reset_token_expires TIMESTAMPTZ NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, reset_token, reset_token_expires
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, reset_token, reset_token_expires
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック
            if let sqlx::Error::Database(db_err) = &e
                && db_err.is_unique_violation()
            {
                return AppError::EmailAlreadyExists;
            }
            AppError::Database(e)
        })?;

        Ok(row.into())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expires = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        // 照合・期限確認・消去を1文で行い、同一トークンの二重使用を防ぐ
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, reset_token = NULL, reset_token_expires = NULL
            WHERE reset_token = $1 AND reset_token_expires > $3
            "#,
        )
        .bind(token_hash)
        .bind(new_password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// インメモリ実装（テスト・ローカル実行用）
///
/// 単一プロセス内でのみ一意性を保証する。
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録済みユーザー数
    pub async fn user_count(&self) -> usize {
        self.users.lock().await.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        let mut users = self.users.lock().await;
        if users.contains_key(email) {
            return Err(AppError::EmailAlreadyExists);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            reset_token_hash: None,
            reset_token_expires: None,
        };
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.values_mut().find(|u| u.id == user_id) {
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_token_expires = Some(expires_at);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        let mut users = self.users.lock().await;
        let user = users.values_mut().find(|u| {
            u.reset_token_hash.as_deref() == Some(token_hash)
                && u.reset_token_expires.is_some_and(|expires| expires > now)
        });

        match user {
            Some(user) => {
                user.password_hash = new_password_hash.to_string();
                user.reset_token_hash = None;
                user.reset_token_expires = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
