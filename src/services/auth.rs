use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::config::OperatingMode;
use crate::error::AppError;
use crate::models::user::normalize_email;
use crate::repositories::UserStore;
use crate::services::password::{
    PasswordPolicy, hash_password, verify_dummy_password, verify_password,
};
use crate::services::token::{TokenCodec, generate_reset_token, hash_reset_token};

/// パスワードリセット要求の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordResetOutcome {
    /// ユーザー有無を区別しない汎用応答
    Acknowledged,
    /// 開発モードのみ: 発行したトークンを返す
    Issued { reset_token: String },
}

/// 認証サービス
#[derive(Clone)]
pub struct AuthService {
    user_store: Arc<dyn UserStore>,
    token_codec: TokenCodec,
    policy: PasswordPolicy,
    reset_token_ttl: Duration,
    mode: OperatingMode,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(
        user_store: Arc<dyn UserStore>,
        token_codec: TokenCodec,
        policy: PasswordPolicy,
        reset_token_ttl: Duration,
        mode: OperatingMode,
    ) -> Self {
        Self {
            user_store,
            token_codec,
            policy,
            reset_token_ttl,
            mode,
        }
    }

    pub fn token_codec(&self) -> &TokenCodec {
        &self.token_codec
    }

    /// ユーザー登録
    ///
    /// 事前の存在チェックは最適化に過ぎず、並行登録時はストアの一意制約が判定する。
    ///
    /// # Security
    /// - パスワードはログに出力しない
    pub async fn register(&self, email: &str, password: &str) -> Result<String, AppError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        self.policy.check(password).map_err(AppError::Validation)?;

        if self.user_store.find_by_email(&email).await?.is_some() {
            tracing::info!(email = %email, "登録失敗: メールアドレス重複");
            return Err(AppError::EmailAlreadyExists);
        }

        let password_hash = hash_password(password)?;
        let user = self.user_store.create_user(&email, &password_hash).await?;

        tracing::info!(user_id = %user.id, email = %user.email, "ユーザー登録成功");
        self.token_codec.issue_access_token(&user.email)
    }

    /// ログイン
    ///
    /// ユーザー不在とパスワード不一致は同じエラーを返す。
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AppError> {
        let email = normalize_email(email);

        let user = match self.user_store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                verify_dummy_password(password);
                tracing::warn!(email = %email, "認証失敗: ユーザー不在");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(email = %email, "認証失敗: パスワード不一致");
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(email = %email, "認証成功");
        self.token_codec.issue_access_token(&user.email)
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - トークン（平文）はログに出力しない
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<PasswordResetOutcome, AppError> {
        let email = normalize_email(email);
        validate_email(&email)?;

        let user = match self.user_store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
                return Ok(PasswordResetOutcome::Acknowledged);
            }
        };

        let token = generate_reset_token();
        let expires_at = OffsetDateTime::now_utc() + self.reset_token_ttl;
        self.user_store
            .set_reset_token(user.id, &hash_reset_token(&token), expires_at)
            .await?;

        tracing::info!(user_id = %user.id, "パスワードリセットトークン発行");

        if self.mode.exposes_reset_tokens() {
            Ok(PasswordResetOutcome::Issued { reset_token: token })
        } else {
            Ok(PasswordResetOutcome::Acknowledged)
        }
    }

    /// リセットトークンを消費してパスワードを更新
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        if token.trim().is_empty() {
            return Err(AppError::InvalidResetToken);
        }
        self.policy.check(new_password).map_err(AppError::Validation)?;

        let password_hash = hash_password(new_password)?;
        let consumed = self
            .user_store
            .consume_reset_token(
                &hash_reset_token(token),
                &password_hash,
                OffsetDateTime::now_utc(),
            )
            .await?;

        if !consumed {
            tracing::warn!("無効・使用済み・期限切れのリセットトークン");
            return Err(AppError::InvalidResetToken);
        }

        tracing::info!("パスワードリセット完了");
        Ok(())
    }
}

/// メールアドレスの形式チェック
fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation(
            "A valid email address is required.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryUserStore;

    fn service_with(mode: OperatingMode) -> (AuthService, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        let codec = TokenCodec::new("test-secret", "HS256", Duration::minutes(60)).unwrap();
        let service = AuthService::new(
            store.clone(),
            codec,
            PasswordPolicy::default(),
            Duration::hours(1),
            mode,
        );
        (service, store)
    }

    fn service() -> (AuthService, Arc<InMemoryUserStore>) {
        service_with(OperatingMode::Development)
    }

    #[tokio::test]
    async fn test_register_then_login_yields_normalized_subject() {
        let (service, _) = service();
        let token = service
            .register("  Alice@Example.com ", "ValidPass123")
            .await
            .unwrap();
        let claims = service.token_codec().verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "alice@example.com");

        let token = service
            .login("ALICE@example.com", "ValidPass123")
            .await
            .unwrap();
        let claims = service.token_codec().verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "alice@example.com");
    }

    #[tokio::test]
    async fn test_register_short_password_persists_nothing() {
        let (service, store) = service();
        let result = service.register("a@x.com", "short").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_invalid_email() {
        let (service, _) = service();
        let result = service.register("not-an-email", "ValidPass123").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (service, store) = service();
        service.register("a@x.com", "ValidPass123").await.unwrap();
        let result = service.register(" A@X.com", "OtherPass123").await;
        assert!(matches!(result, Err(AppError::EmailAlreadyExists)));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_creates_one_user() {
        let (service, store) = service();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.register("race@x.com", "ValidPass123").await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(AppError::EmailAlreadyExists) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _) = service();
        service.register("a@x.com", "ValidPass123").await.unwrap();

        let wrong_password = service.login("a@x.com", "WrongPass123").await;
        let unknown_user = service.login("nobody@x.com", "ValidPass123").await;
        assert!(matches!(wrong_password, Err(AppError::InvalidCredentials)));
        assert!(matches!(unknown_user, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_password_reset_unknown_email_is_acknowledged() {
        let (service, _) = service();
        let outcome = service
            .request_password_reset("nobody@x.com")
            .await
            .unwrap();
        assert_eq!(outcome, PasswordResetOutcome::Acknowledged);
    }

    #[tokio::test]
    async fn test_password_reset_production_hides_token() {
        let (service, store) = service_with(OperatingMode::Production);
        service.register("a@x.com", "ValidPass123").await.unwrap();

        let outcome = service.request_password_reset("a@x.com").await.unwrap();
        assert_eq!(outcome, PasswordResetOutcome::Acknowledged);

        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.reset_token_hash.is_some());
        assert!(user.reset_token_expires.is_some());
    }

    #[tokio::test]
    async fn test_password_reset_round_trip_is_single_use() {
        let (service, store) = service();
        service.register("a@x.com", "ValidPass123").await.unwrap();

        let PasswordResetOutcome::Issued { reset_token } =
            service.request_password_reset("A@x.com").await.unwrap()
        else {
            panic!("development mode should expose the reset token");
        };

        // 平文トークンは保存しない
        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_ne!(user.reset_token_hash.as_deref(), Some(reset_token.as_str()));

        service
            .reset_password(&reset_token, "NewPass456")
            .await
            .unwrap();
        assert!(service.login("a@x.com", "NewPass456").await.is_ok());
        assert!(service.login("a@x.com", "ValidPass123").await.is_err());

        let second = service.reset_password(&reset_token, "Another789").await;
        assert!(matches!(second, Err(AppError::InvalidResetToken)));
    }

    #[tokio::test]
    async fn test_reset_password_enforces_policy() {
        let (service, _) = service();
        let result = service.reset_password("whatever", "short").await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = service.reset_password("unknown-token", "ValidPass123").await;
        assert!(matches!(result, Err(AppError::InvalidResetToken)));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }
}
