/// Authentication module
///
/// Handles JWT access tokens, password hashing, refresh-token sessions
/// and the password-reset flow.

mod claims;
mod jwt;
mod password;
mod password_reset;
mod refresh_token;
mod service;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

pub use claims::Claims;
pub use jwt::generate_access_token;
pub use jwt::validate_access_token;
pub use password::validate_password_policy;
pub use password::PasswordHasher;
pub use password_reset::generate_reset_token;
pub use password_reset::PasswordResetService;
pub use refresh_token::generate_refresh_token;
pub use refresh_token::spawn_session_sweeper;
pub use service::{AccessToken, AuthService, TokenPair};

const OPAQUE_TOKEN_LENGTH: usize = 64;

/// 64 alphanumeric characters (~380 bits) from the thread-local CSPRNG
fn generate_opaque_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
