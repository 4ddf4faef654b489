mod admin;
mod auth;
mod health_check;
mod password_reset;
mod teachers;

pub use admin::create_user;
pub use auth::{
    change_password, get_current_user, login, logout, refresh, register, revoke_sessions,
    AuthResponse, UserResponse,
};
pub use health_check::health_check;
pub use password_reset::{forgot_password, reset_password, verify_reset_token};
pub use teachers::teacher_me;
