/// Password reset flow
///
/// A reset moves through `no reset pending -> pending(digest, expiry) ->
/// consumed | expired`. Only the digest of the emailed token is stored, and
/// an expired digest is treated exactly like a missing one.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::auth::password::{validate_password_policy, PasswordHasher};
use crate::configuration::PasswordResetSettings;
use crate::email_client::EmailClient;
use crate::error::{AppError, AuthError, ValidationError};
use crate::store::{RefreshTokenStore, TokenDigest, UserStore};
use crate::validators::{is_valid_email, require_non_empty};

const RESET_EMAIL_SUBJECT: &str = "Reset your password";

/// Generate a new single-use reset token (plaintext, emailed to the user)
pub fn generate_reset_token() -> String {
    super::generate_opaque_token()
}

#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    email_client: EmailClient,
    settings: PasswordResetSettings,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: PasswordHasher,
        email_client: EmailClient,
        settings: PasswordResetSettings,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            hasher,
            email_client,
            settings,
        }
    }

    /// Start a reset for `email`
    ///
    /// Succeeds without side effects when no account uses the address, so
    /// the response never reveals whether an account exists. A repeated
    /// request replaces the pending token.
    ///
    /// # Errors
    /// `AppError::Email` if the message cannot be handed off; the stored
    /// token stays pending, so the request can simply be retried.
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        let email = is_valid_email(email)?;

        let Some(user) = self.users.find_by_email(&email).await? else {
            tracing::info!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::seconds(self.settings.token_expiry);
        let saved = self
            .users
            .save_reset_token(&user.email, &TokenDigest::from_plaintext(&token), expires_at)
            .await?;
        if !saved {
            tracing::info!(user_id = %user.id, "Account removed before reset token was stored");
            return Ok(());
        }

        tracing::info!(user_id = %user.id, "Password reset token issued");

        let link = self.reset_link(&token);
        let html = format!(
            "<p>A password reset was requested for your account.</p>\
             <p><a href=\"{link}\">Choose a new password</a></p>\
             <p>The link expires in {} minutes. If you did not ask for this, ignore this email.</p>",
            self.settings.token_expiry / 60
        );
        let text = format!(
            "A password reset was requested for your account.\n\
             Choose a new password: {link}\n\
             The link expires in {} minutes. If you did not ask for this, ignore this email.",
            self.settings.token_expiry / 60
        );

        self.email_client
            .send_email(&user.email, RESET_EMAIL_SUBJECT, &html, &text)
            .await?;

        Ok(())
    }

    fn reset_link(&self, token: &str) -> String {
        format!("{}?token={}", self.settings.reset_url, token)
    }

    /// Check that `token` is pending and unexpired, without consuming it
    pub async fn verify_reset_token(&self, token: &str) -> Result<(), AppError> {
        require_non_empty("token", token)?;

        self.users
            .find_by_reset_token(&TokenDigest::from_plaintext(token), Utc::now())
            .await?
            .map(|_| ())
            .ok_or_else(|| AuthError::ResetTokenInvalidOrExpired.into())
    }

    /// Exchange `token` for a password change, exactly once
    ///
    /// On success the password and the cleared reset state are written in
    /// one update, and every refresh token of the user is revoked.
    pub async fn consume_reset(
        &self,
        token: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<(), AppError> {
        if password != password_confirmation {
            return Err(ValidationError::PasswordMismatch.into());
        }
        require_non_empty("token", token)?;
        validate_password_policy(password)?;

        let digest = TokenDigest::from_plaintext(token);

        // Cheap rejection before paying for a bcrypt hash
        if self.users.find_by_reset_token(&digest, Utc::now()).await?.is_none() {
            return Err(AuthError::ResetTokenInvalidOrExpired.into());
        }

        let password_hash = self.hasher.hash(password).await?;
        let user = self
            .users
            .consume_reset_token(&digest, &password_hash, Utc::now())
            .await?
            .ok_or(AuthError::ResetTokenInvalidOrExpired)?;

        let revoked = self.refresh_tokens.delete_all_by_user(user.id).await?;
        tracing::info!(user_id = %user.id, revoked, "Password reset completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthService;
    use crate::configuration::JwtSettings;
    use crate::domain::{NewUser, Role, User};
    use crate::email_client::EmailAddress;
    use crate::store::MemoryStore;
    use chrono::DateTime;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct TestContext {
        auth: AuthService,
        reset: PasswordResetService,
        store: Arc<MemoryStore>,
        email_server: MockServer,
    }

    async fn context() -> TestContext {
        let store = Arc::new(MemoryStore::new());
        let hasher = PasswordHasher::new(4).unwrap();
        let email_server = MockServer::start().await;
        let email_client = EmailClient::new(
            email_server.uri(),
            EmailAddress::parse("no-reply@campus.example.com".to_string()).unwrap(),
            "token".to_string(),
            reqwest::Client::new(),
        );

        let auth = AuthService::new(
            store.clone(),
            store.clone(),
            hasher.clone(),
            JwtSettings {
                secret: "test-secret-key-at-least-32-characters-long".to_string(),
                access_token_expiry: 900,
                refresh_token_expiry: 604800,
                issuer: "test".to_string(),
            },
        );
        let reset = PasswordResetService::new(
            store.clone(),
            store.clone(),
            hasher,
            email_client,
            PasswordResetSettings {
                token_expiry: 3600,
                reset_url: "https://campus.example.com/reset".to_string(),
            },
        );

        TestContext {
            auth,
            reset,
            store,
            email_server,
        }
    }

    /// Pulls the plaintext token out of the last reset email
    async fn token_from_last_email(server: &MockServer) -> String {
        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(&requests.last().unwrap().body).unwrap();
        let text = body["TextBody"].as_str().unwrap();
        let start = text.find("?token=").unwrap() + "?token=".len();
        text[start..start + 64].to_string()
    }

    #[tokio::test]
    async fn test_reset_round_trip() {
        let ctx = context().await;
        Mock::given(method("POST"))
            .and(path("/email"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&ctx.email_server)
            .await;

        let (_, session) = ctx.auth.register_alumni("a@x.com", "longpass1").await.unwrap();
        ctx.reset.request_reset("a@x.com").await.unwrap();
        let token = token_from_last_email(&ctx.email_server).await;

        ctx.reset.verify_reset_token(&token).await.unwrap();
        ctx.reset.consume_reset(&token, "brandnew9", "brandnew9").await.unwrap();

        assert!(ctx.auth.login("a@x.com", "brandnew9").await.is_ok());
        assert!(ctx.auth.login("a@x.com", "longpass1").await.is_err());
        assert!(ctx.auth.refresh(&session.refresh_token).await.is_err());

        let err = ctx.reset.consume_reset(&token, "another9", "another9").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::ResetTokenInvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_unknown_email_creates_nothing_and_sends_nothing() {
        let ctx = context().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ctx.email_server)
            .await;

        ctx.reset.request_reset("ghost@x.com").await.unwrap();
        assert_eq!(ctx.store.stored_reset_tokens().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_while_still_stored() {
        let ctx = context().await;
        let (user, _) = ctx.auth.register_alumni("a@x.com", "longpass1").await.unwrap();

        let token = generate_reset_token();
        ctx.store
            .save_reset_token(
                &user.email,
                &TokenDigest::from_plaintext(&token),
                Utc::now() - Duration::seconds(1),
            )
            .await
            .unwrap();

        let err = ctx.reset.consume_reset(&token, "brandnew9", "brandnew9").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::ResetTokenInvalidOrExpired)));
        assert!(ctx.reset.verify_reset_token(&token).await.is_err());

        let stored = ctx.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.reset_token.is_some());
        assert!(ctx.auth.login("a@x.com", "longpass1").await.is_ok());
    }

    #[tokio::test]
    async fn test_confirmation_mismatch_fails_before_lookup() {
        let ctx = context().await;
        let (user, _) = ctx.auth.register_alumni("a@x.com", "longpass1").await.unwrap();
        let token = generate_reset_token();
        ctx.store
            .save_reset_token(
                &user.email,
                &TokenDigest::from_plaintext(&token),
                Utc::now() + Duration::hours(1),
            )
            .await
            .unwrap();

        let err = ctx.reset.consume_reset(&token, "brandnew9", "brandnew8").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::PasswordMismatch)));

        // The token is still usable
        ctx.reset.consume_reset(&token, "brandnew9", "brandnew9").await.unwrap();
    }

    #[tokio::test]
    async fn test_email_failure_surfaces_but_token_stays_pending() {
        let ctx = context().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&ctx.email_server)
            .await;

        let (user, _) = ctx.auth.register_alumni("a@x.com", "longpass1").await.unwrap();
        let err = ctx.reset.request_reset("a@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::Email(_)));

        let stored = ctx.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.pending_reset(Utc::now()).is_some());
    }

    /// Finds every user but never manages to store a reset token, as if the
    /// account were deleted between lookup and save
    struct VanishingUsers(MemoryStore);

    #[async_trait::async_trait]
    impl UserStore for VanishingUsers {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
            self.0.find_by_email(email).await
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
            self.0.find_by_id(id).await
        }
        async fn create(&self, user: NewUser) -> Result<User, AppError> {
            UserStore::create(&self.0, user).await
        }
        async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AppError> {
            self.0.update_password_hash(id, hash).await
        }
        async fn save_reset_token(
            &self,
            _email: &str,
            _token: &TokenDigest,
            _expires_at: DateTime<Utc>,
        ) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn find_by_reset_token(
            &self,
            token: &TokenDigest,
            now: DateTime<Utc>,
        ) -> Result<Option<User>, AppError> {
            self.0.find_by_reset_token(token, now).await
        }
        async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError> {
            self.0.clear_reset_token(id).await
        }
        async fn consume_reset_token(
            &self,
            token: &TokenDigest,
            hash: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<User>, AppError> {
            self.0.consume_reset_token(token, hash, now).await
        }
    }

    #[tokio::test]
    async fn test_no_email_when_token_could_not_be_stored() {
        let ctx = context().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ctx.email_server)
            .await;

        let users = VanishingUsers(MemoryStore::new());
        UserStore::create(
            &users,
            NewUser {
                email: "a@x.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Alumni,
            },
        )
        .await
        .unwrap();

        let reset = PasswordResetService {
            users: Arc::new(users),
            ..ctx.reset.clone()
        };
        reset.request_reset("a@x.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_new_request_replaces_pending_token() {
        let ctx = context().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&ctx.email_server)
            .await;

        ctx.auth
            .create_user("t@x.com", "longpass1", Role::Teacher)
            .await
            .unwrap();
        ctx.reset.request_reset("t@x.com").await.unwrap();
        let first = token_from_last_email(&ctx.email_server).await;
        ctx.reset.request_reset("t@x.com").await.unwrap();
        let second = token_from_last_email(&ctx.email_server).await;

        assert_ne!(first, second);
        assert!(ctx.reset.verify_reset_token(&first).await.is_err());
        assert!(ctx.reset.verify_reset_token(&second).await.is_ok());
    }
}
