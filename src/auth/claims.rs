/// JWT Claims structure
///
/// Payload of an access token: who the caller is, which role they hold,
/// and the standard registered claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Role, User};
use crate::error::{AppError, AuthError};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    /// Create claims for `user`, valid for `expiry_seconds` from now
    pub fn new(user: &User, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// A subject that is not a UUID means the token was not minted here
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenInvalid.into())
    }

    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            password_hash: String::new(),
            role,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_claims_creation() {
        let user = user(Role::Teacher);
        let claims = Claims::new(&user, 900, "test".to_string());

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_user_id_extraction() {
        let user = user(Role::Student);
        let claims = Claims::new(&user, 900, "test".to_string());

        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = Claims::new(&user(Role::Student), 900, "test".to_string());
        claims.sub = "invalid-uuid".to_string();

        assert!(claims.user_id().is_err());
    }

    #[test]
    fn test_role_membership() {
        let claims = Claims::new(&user(Role::Alumni), 900, "test".to_string());

        assert!(claims.has_any_role(&[Role::Alumni, Role::Admin]));
        assert!(!claims.has_any_role(&[Role::Teacher]));
        assert!(!claims.has_any_role(&[]));
    }
}
