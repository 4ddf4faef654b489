/// In-process store for tests and database-free local runs.
///
/// Implements both store traits over one mutex-guarded state so the same
/// uniqueness and cascade rules as the Postgres schema apply. The lock is
/// only held inside synchronous sections, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewUser, User};
use crate::error::{AccountError, AppError, DatabaseError};
use crate::store::{NewRefreshToken, RefreshTokenRecord, RefreshTokenStore, TokenDigest, UserStore};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<TokenDigest, RefreshTokenRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    /// Removes a user and, like the foreign key in Postgres, every refresh
    /// token it owns
    pub fn remove_user(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let removed = state.users.remove(&id).is_some();
        state.refresh_tokens.retain(|_, record| record.user_id != id);
        Ok(removed)
    }

    pub fn refresh_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let state = self.state()?;
        Ok(state
            .refresh_tokens
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Number of users carrying reset state, expired or not
    pub fn stored_reset_tokens(&self) -> Result<usize, AppError> {
        let state = self.state()?;
        Ok(state.users.values().filter(|u| u.reset_token.is_some()).count())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state()?;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let mut state = self.state()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AccountError::DuplicateEmail.into());
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut state = self.state()?;
        let user = state.users.get_mut(&id).ok_or(AccountError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.reset_token = None;
        user.reset_token_expires_at = None;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn save_reset_token(
        &self,
        email: &str,
        token: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.users.values_mut().find(|u| u.email == email) {
            Some(user) => {
                user.reset_token = Some(token.clone());
                user.reset_token_expires_at = Some(expires_at);
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_reset_token(
        &self,
        token: &TokenDigest,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let state = self.state()?;
        Ok(state
            .users
            .values()
            .find(|u| u.pending_reset(now) == Some(token))
            .cloned())
    }

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.state()?;
        if let Some(user) = state.users.get_mut(&id) {
            user.reset_token = None;
            user.reset_token_expires_at = None;
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &TokenDigest,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let mut state = self.state()?;
        let Some(user) = state
            .users
            .values_mut()
            .find(|u| u.pending_reset(now) == Some(token))
        else {
            return Ok(None);
        };

        user.password_hash = password_hash.to_string();
        user.reset_token = None;
        user.reset_token_expires_at = None;
        user.updated_at = now;
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        let mut state = self.state()?;
        if !state.users.contains_key(&token.user_id) {
            return Err(DatabaseError::QueryExecution(
                "refresh token owner does not exist".to_string(),
            )
            .into());
        }
        if state.refresh_tokens.contains_key(&token.token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh token already issued".to_string(),
            )
            .into());
        }

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        state
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_token(
        &self,
        token: &TokenDigest,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.state()?.refresh_tokens.get(token).cloned())
    }

    async fn delete_by_token(&self, token: &TokenDigest) -> Result<bool, AppError> {
        Ok(self.state()?.refresh_tokens.remove(token).is_some())
    }

    async fn delete_all_by_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, record| record.user_id != user_id);
        Ok((before - state.refresh_tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, record| record.is_active(now));
        Ok((before - state.refresh_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use chrono::Duration;

    async fn seeded_user(store: &MemoryStore, email: &str) -> User {
        UserStore::create(
            store,
            NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                role: Role::Student,
            },
        )
        .await
        .expect("Failed to create user")
    }

    fn new_token(user_id: Uuid, plaintext: &str, expires_at: DateTime<Utc>) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            token_hash: TokenDigest::from_plaintext(plaintext),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        seeded_user(&store, "dup@example.com").await;

        let result = UserStore::create(
            &store,
            NewUser {
                email: "dup@example.com".to_string(),
                password_hash: "other".to_string(),
                role: Role::Teacher,
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(AppError::Account(AccountError::DuplicateEmail))
        ));
    }

    #[tokio::test]
    async fn test_reset_token_consumed_once() {
        let store = MemoryStore::new();
        let user = seeded_user(&store, "reset@example.com").await;
        let digest = TokenDigest::from_plaintext("reset-token");
        let now = Utc::now();

        assert!(store
            .save_reset_token(&user.email, &digest, now + Duration::hours(1))
            .await
            .unwrap());

        let consumed = store.consume_reset_token(&digest, "new-hash", now).await.unwrap();
        assert_eq!(consumed.map(|u| u.password_hash), Some("new-hash".to_string()));

        let again = store.consume_reset_token(&digest, "newer-hash", now).await.unwrap();
        assert!(again.is_none());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
        assert!(stored.reset_token.is_none());
        assert!(stored.reset_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_password_update_clears_pending_reset() {
        let store = MemoryStore::new();
        let user = seeded_user(&store, "change@example.com").await;
        let digest = TokenDigest::from_plaintext("pending");
        store
            .save_reset_token(&user.email, &digest, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        store.update_password_hash(user.id, "changed").await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "changed");
        assert!(stored.reset_token.is_none());
        assert!(stored.reset_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_expired_reset_token_is_not_found() {
        let store = MemoryStore::new();
        let user = seeded_user(&store, "late@example.com").await;
        let digest = TokenDigest::from_plaintext("late-token");
        let now = Utc::now();

        store
            .save_reset_token(&user.email, &digest, now - Duration::seconds(1))
            .await
            .unwrap();

        assert!(store.find_by_reset_token(&digest, now).await.unwrap().is_none());
        assert!(store.consume_reset_token(&digest, "x", now).await.unwrap().is_none());
        assert_eq!(store.stored_reset_tokens().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_reset_token_for_unknown_email() {
        let store = MemoryStore::new();
        let saved = store
            .save_reset_token(
                "nobody@example.com",
                &TokenDigest::from_plaintext("t"),
                Utc::now() + Duration::hours(1),
            )
            .await
            .unwrap();

        assert!(!saved);
        assert_eq!(store.stored_reset_tokens().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_token_lifecycle() {
        let store = MemoryStore::new();
        let user = seeded_user(&store, "tokens@example.com").await;
        let now = Utc::now();

        RefreshTokenStore::create(&store, new_token(user.id, "live", now + Duration::days(7)))
            .await
            .unwrap();
        RefreshTokenStore::create(&store, new_token(user.id, "dead", now - Duration::minutes(1)))
            .await
            .unwrap();

        assert_eq!(store.delete_expired(now).await.unwrap(), 1);
        assert!(store
            .find_by_token(&TokenDigest::from_plaintext("live"))
            .await
            .unwrap()
            .is_some());

        assert!(store.delete_by_token(&TokenDigest::from_plaintext("live")).await.unwrap());
        assert!(!store.delete_by_token(&TokenDigest::from_plaintext("live")).await.unwrap());
    }

    #[tokio::test]
    async fn test_removing_user_cascades_to_refresh_tokens() {
        let store = MemoryStore::new();
        let user = seeded_user(&store, "gone@example.com").await;

        RefreshTokenStore::create(
            &store,
            new_token(user.id, "orphan", Utc::now() + Duration::days(7)),
        )
        .await
        .unwrap();

        assert!(store.remove_user(user.id).unwrap());
        assert!(store.refresh_tokens_for_user(user.id).unwrap().is_empty());
    }
}
