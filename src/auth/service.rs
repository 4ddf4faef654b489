//! Account and session operations.
//!
//! `AuthService` owns the login, registration and refresh-token lifecycle.
//! Its stores are injected at construction; it keeps no mutable state of
//! its own, so one instance is shared by every worker.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{validate_password_policy, PasswordHasher};
use crate::auth::refresh_token::generate_refresh_token;
use crate::configuration::JwtSettings;
use crate::domain::{NewUser, Role, User};
use crate::error::{AccountError, AppError, AuthError, ValidationError};
use crate::store::{NewRefreshToken, RefreshTokenStore, TokenDigest, UserStore};
use crate::validators::is_valid_email;

/// Freshly issued credentials for one device
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Result of exchanging a refresh token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    jwt: JwtSettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: PasswordHasher,
        jwt: JwtSettings,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            hasher,
            jwt,
        }
    }

    /// Self-service registration; always creates an Alumni account and
    /// signs it in
    pub async fn register_alumni(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, TokenPair), AppError> {
        let user = self.create_account(email, password, Role::Alumni).await?;
        let tokens = self.issue_token_pair(&user).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "Account registered");
        Ok((user, tokens))
    }

    /// Admin-initiated creation of Student, Teacher and Company accounts
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AppError> {
        if !role.is_admin_provisioned() {
            return Err(ValidationError::UnsupportedRole(role.to_string()).into());
        }

        let user = self.create_account(email, password, role).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "Account provisioned");
        Ok(user)
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AppError> {
        let email = is_valid_email(email)?;
        validate_password_policy(password)?;
        let password_hash = self.hasher.hash(password).await?;

        self.users
            .create(NewUser {
                email,
                password_hash,
                role,
            })
            .await
    }

    /// Authenticate with email and password
    ///
    /// Unknown email, malformed email and wrong password all end in the same
    /// `InvalidCredentials` after one bcrypt verification.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AppError> {
        let user = match is_valid_email(email) {
            Ok(email) => self.users.find_by_email(&email).await?,
            Err(_) => None,
        };

        let user = match user {
            Some(user) => user,
            None => {
                self.hasher.verify_dummy(password).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issue_token_pair(&user).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, tokens))
    }

    /// Sign an access token and persist a new refresh token for `user`
    ///
    /// Nothing is returned unless both steps succeed.
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = generate_access_token(user, &self.jwt)?;
        let refresh_token = generate_refresh_token();
        let refresh_expires_at = Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry);

        self.refresh_tokens
            .create(NewRefreshToken {
                user_id: user.id,
                token_hash: TokenDigest::from_plaintext(&refresh_token),
                expires_at: refresh_expires_at,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expiry,
        })
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token itself stays valid until its own expiry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AppError> {
        let now = Utc::now();
        let record = self
            .refresh_tokens
            .find_by_token(&TokenDigest::from_plaintext(refresh_token))
            .await?
            .filter(|record| record.is_active(now))
            .ok_or(AuthError::RefreshTokenInvalid)?;

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::RefreshTokenInvalid)?;

        let access_token = generate_access_token(&user, &self.jwt)?;
        tracing::debug!(user_id = %user.id, "Access token refreshed");

        Ok(AccessToken {
            access_token,
            expires_in: self.jwt.access_token_expiry,
        })
    }

    /// Delete one refresh token; unknown tokens are ignored
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let removed = self
            .refresh_tokens
            .delete_by_token(&TokenDigest::from_plaintext(refresh_token))
            .await?;

        tracing::info!(removed, "Logout processed");
        Ok(())
    }

    /// Delete every refresh token of `user_id`
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.refresh_tokens.delete_all_by_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        self.refresh_tokens.delete_expired(Utc::now()).await
    }

    /// Replace the password of an authenticated user
    ///
    /// Revokes every session of the user, including the caller's, and
    /// returns a fresh pair for the calling device.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        new_password_confirmation: &str,
    ) -> Result<TokenPair, AppError> {
        if new_password != new_password_confirmation {
            return Err(ValidationError::PasswordMismatch.into());
        }
        validate_password_policy(new_password)?;

        let user = self.current_user(user_id).await?;
        if !self.hasher.verify(current_password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let password_hash = self.hasher.hash(new_password).await?;
        self.users.update_password_hash(user.id, &password_hash).await?;
        self.revoke_all_sessions(user.id).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        self.issue_token_pair(&user).await
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AccountError::NotFound.into())
    }
}
