/// Credential and refresh-token persistence
///
/// The auth services only see the two traits below. Tokens cross this
/// boundary exclusively as `TokenDigest`, so no backend ever receives a
/// plaintext refresh or reset token and lookups always compare digests.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{NewUser, User};
use crate::error::AppError;

pub use memory::MemoryStore;
pub use postgres::{PgRefreshTokenStore, PgUserStore};

/// SHA-256 of a plaintext token, lowercase hex
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenDigest(String);

impl TokenDigest {
    pub fn from_plaintext(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wraps a digest read back from storage
    pub(crate) fn from_stored(digest: String) -> Self {
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenDigest(..)")
    }
}

/// A persisted refresh token
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: TokenDigest,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: TokenDigest,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Fails with `AccountError::DuplicateEmail` when the email is taken
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    /// Sets a new hash and clears any pending reset in the same write, so a
    /// reset link issued before the change can no longer be used
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Stores (or replaces) the pending reset for the account with this
    /// email. Returns false when no such account exists.
    async fn save_reset_token(
        &self,
        email: &str,
        token: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// The user holding `token`, only while it is unexpired at `now`
    async fn find_by_reset_token(
        &self,
        token: &TokenDigest,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError>;

    /// Sets the new hash and clears the reset state in one atomic update,
    /// only if `token` is still pending and unexpired at `now`. A second
    /// consumer of the same token gets `None`.
    async fn consume_reset_token(
        &self,
        token: &TokenDigest,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError>;

    /// Returns the row regardless of expiry; callers check `is_active`
    async fn find_by_token(
        &self,
        token: &TokenDigest,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Returns whether a row was deleted
    async fn delete_by_token(&self, token: &TokenDigest) -> Result<bool, AppError>;

    async fn delete_all_by_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Deletes rows with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
