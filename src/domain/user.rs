use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::Role;
use crate::store::TokenDigest;

/// A stored account
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    /// Normalized (trimmed, lowercase) and unique
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub reset_token: Option<TokenDigest>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The pending reset digest, if one exists and has not expired
    pub fn pending_reset(&self, now: DateTime<Utc>) -> Option<&TokenDigest> {
        match (&self.reset_token, self.reset_token_expires_at) {
            (Some(digest), Some(expires_at)) if now < expires_at => Some(digest),
            _ => None,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("reset_pending", &self.reset_token.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Input to `UserStore::create`
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}
