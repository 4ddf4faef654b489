/// Password Hashing and Verification
///
/// bcrypt hashing with a configurable cost, run on the blocking pool, plus
/// the password policy applied wherever a new password is accepted.

use std::sync::Arc;

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only looks at the first 72 bytes
const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// Verified against when the account does not exist, so a lookup miss
    /// costs the same as a wrong password
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    /// # Errors
    /// Returns error if `cost` is outside bcrypt's accepted range
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let dummy_hash = hash(super::generate_opaque_token(), cost)
            .map_err(|e| AppError::Config(format!("Invalid password hash cost {}: {}", cost, e)))?;

        Ok(Self {
            cost,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash a password with a fresh random salt
    ///
    /// # Errors
    /// Returns error only if bcrypt itself fails
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Constant-time check of `password` against a stored bcrypt hash
    ///
    /// # Errors
    /// Returns error if the stored hash is malformed
    pub async fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let password_hash = password_hash.to_string();

        tokio::task::spawn_blocking(move || verify(password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// Burns one verification for an unknown account
    pub async fn verify_dummy(&self, password: &str) {
        let dummy_hash = self.dummy_hash.to_string();
        if let Err(e) = self.verify(password, &dummy_hash).await {
            tracing::warn!(error = %e, "Dummy password verification failed");
        }
    }
}

/// Validate password policy
///
/// Requirements:
/// - 8 to 72 bytes
/// - At least one letter and one digit
pub fn validate_password_policy(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_numeric());

    if !has_letter || !has_digit {
        return Err(ValidationError::WeakPassword(
            "password must contain at least one letter and one digit".to_string(),
        ));
    }

    Ok(())
}
