use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::{AuthService, Claims};
use crate::error::AppError;
use crate::routes::auth::UserResponse;

#[derive(Serialize)]
pub struct TeacherResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub profile: &'static str,
}

/// GET /api/teachers/me
///
/// Teacher-only (enforced by `RoleGuard`).
pub async fn teacher_me(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth.current_user(claims.user_id()?).await?;

    Ok(HttpResponse::Ok().json(TeacherResponse {
        user: UserResponse::from(&user),
        profile: user.role.profile_table().unwrap_or_default(),
    }))
}
