/// Authentication Routes
///
/// Registration, login, token refresh, logout and the authenticated
/// account endpoints under `/api/me`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims, TokenPair};
use crate::domain::{Role, User};
use crate::error::AppError;

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `/auth/refresh` and `/auth/logout`
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: String,
    pub role: Role,
}

impl AuthResponse {
    fn new(user: &User, tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            user_id: user.id.to_string(),
            role: user.role,
        }
    }
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct RevokeSessionsResponse {
    pub revoked: u64,
}

/// POST /auth/register
///
/// Self-registration always creates an Alumni account and signs it in.
///
/// # Errors
/// - 400: invalid email or weak password
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let (user, tokens) = auth.register_alumni(&form.email, &form.password).await?;

    tracing::info!(user_id = %user.id, "User registered successfully");

    Ok(HttpResponse::Created().json(AuthResponse::new(&user, tokens)))
}

/// POST /auth/login
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let (user, tokens) = auth.login(&form.email, &form.password).await?;

    tracing::info!(
        user_id = %user.id,
        role = %user.role,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse::new(&user, tokens)))
}

/// POST /auth/refresh
///
/// Issues a new access token. The refresh token is not rotated and keeps
/// its original expiry.
///
/// # Errors
/// - 401: unknown, revoked or expired refresh token
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let refreshed = auth.refresh(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(RefreshResponse {
        access_token: refreshed.access_token,
        token_type: "Bearer".to_string(),
        expires_in: refreshed.expires_in,
    }))
}

/// POST /auth/logout
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&form.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/me
///
/// Claims are injected by `JwtMiddleware`.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth.current_user(claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// POST /api/me/password
///
/// Every existing session is revoked; the response carries a fresh pair
/// for the calling client.
pub async fn change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let tokens = auth
        .change_password(
            user_id,
            &form.current_password,
            &form.new_password,
            &form.new_password_confirmation,
        )
        .await?;
    let user = auth.current_user(user_id).await?;

    tracing::info!(user_id = %user_id, "Password changed via API");

    Ok(HttpResponse::Ok().json(AuthResponse::new(&user, tokens)))
}

/// DELETE /api/me/sessions
///
/// Signs the caller out everywhere. Access tokens already issued stay
/// valid until they expire.
pub async fn revoke_sessions(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let revoked = auth.revoke_all_sessions(claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(RevokeSessionsResponse { revoked }))
}
