/// Password reset routes
///
/// `forgot-password` answers identically whether or not the address
/// belongs to an account.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::PasswordResetService;
use crate::error::AppError;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetTokenQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// POST /auth/forgot-password
///
/// # Errors
/// - 400: malformed email
/// - 503: the reset email could not be sent
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    reset: web::Data<PasswordResetService>,
) -> Result<HttpResponse, AppError> {
    reset.request_reset(&form.email).await?;

    tracing::info!("Password reset request handled");
    Ok(HttpResponse::Ok().json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

/// GET /auth/reset-password?token=...
///
/// Lets a client check a link before showing the new-password form.
pub async fn verify_reset_token(
    query: web::Query<ResetTokenQuery>,
    reset: web::Data<PasswordResetService>,
) -> Result<HttpResponse, AppError> {
    reset.verify_reset_token(&query.token).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Reset token is valid")))
}

/// POST /auth/reset-password
///
/// # Errors
/// - 400: mismatch, weak password, or an invalid/expired/used token
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    reset: web::Data<PasswordResetService>,
) -> Result<HttpResponse, AppError> {
    reset
        .consume_reset(&form.token, &form.password, &form.password_confirmation)
        .await?;

    tracing::info!("Password reset via API");
    Ok(HttpResponse::Ok().json(MessageResponse::new(
        "Password has been reset. Please log in again.",
    )))
}
