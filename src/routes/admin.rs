use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::{AuthService, Claims};
use crate::domain::Role;
use crate::error::AppError;
use crate::routes::auth::UserResponse;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// POST /api/admin/users
///
/// Admin-only (enforced by `RoleGuard`). Provisions Student, Teacher and
/// Company accounts; any other role is a 400.
pub async fn create_user(
    claims: web::ReqData<Claims>,
    form: web::Json<CreateUserRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth.create_user(&form.email, &form.password, form.role).await?;

    tracing::info!(
        admin_id = %claims.sub,
        user_id = %user.id,
        role = %user.role,
        "Admin created user"
    );

    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}
