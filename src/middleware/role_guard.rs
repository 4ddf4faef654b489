/// Role-based access control
///
/// `RoleGuard` must sit inside a scope already protected by `JwtMiddleware`;
/// it only reads the `Claims` the gateway attached.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::Claims;
use crate::domain::Role;
use crate::error::{AppError, AuthError};

/// Allow the caller through only if their role is in `allowed`
pub fn authorize(claims: &Claims, allowed: &[Role]) -> Result<(), AuthError> {
    if claims.has_any_role(allowed) {
        Ok(())
    } else {
        Err(AuthError::InsufficientRole)
    }
}

pub struct RoleGuard {
    allowed: Rc<[Role]>,
}

impl RoleGuard {
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoleGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RoleGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RoleGuardService {
            service: Rc::new(service),
            allowed: self.allowed.clone(),
        }))
    }
}

pub struct RoleGuardService<S> {
    service: Rc<S>,
    allowed: Rc<[Role]>,
}

impl<S, B> Service<ServiceRequest> for RoleGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let decision = req
            .extensions()
            .get::<Claims>()
            .map(|claims| (claims.sub.clone(), authorize(claims, &self.allowed)));

        match decision {
            Some((_, Ok(()))) => {
                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Some((user_id, Err(e))) => {
                tracing::warn!(
                    user_id = %user_id,
                    path = %req.path(),
                    "Caller role not permitted"
                );
                Box::pin(async move { Err(AppError::Auth(e).into()) })
            }
            None => {
                tracing::error!(
                    path = %req.path(),
                    "RoleGuard reached without authenticated claims; is JwtMiddleware mounted?"
                );
                Box::pin(async move {
                    Err(AppError::Internal(
                        "role guard mounted without authentication".to_string(),
                    )
                    .into())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};
    use chrono::Utc;
    use uuid::Uuid;

    fn claims(role: Role) -> Claims {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "x@example.com".to_string(),
            password_hash: String::new(),
            role,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        Claims::new(&user, 900, "test".to_string())
    }

    #[::core::prelude::v1::test]
    fn test_authorize_allows_listed_role() {
        assert!(authorize(&claims(Role::Teacher), &[Role::Teacher]).is_ok());
        assert!(authorize(&claims(Role::Admin), &[Role::Teacher, Role::Admin]).is_ok());
    }

    #[::core::prelude::v1::test]
    fn test_authorize_rejects_other_roles() {
        assert_eq!(
            authorize(&claims(Role::Alumni), &[Role::Teacher]),
            Err(AuthError::InsufficientRole)
        );
    }

    /// Status of a guarded `GET /guarded/ping`, with `claims` attached
    /// ahead of the guard when given
    async fn guarded_status(allowed: Role, claims: Option<Claims>) -> StatusCode {
        let app = test::init_service(
            App::new().service(
                web::scope("/guarded")
                    .wrap(RoleGuard::new([allowed]))
                    .wrap_fn(move |req, srv| {
                        if let Some(claims) = claims.clone() {
                            req.extensions_mut().insert(claims);
                        }
                        srv.call(req)
                    })
                    .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/guarded/ping").to_request();
        match test::try_call_service(&app, req).await {
            Ok(res) => res.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    #[actix_web::test]
    async fn test_guard_without_authentication_is_a_server_error() {
        assert_eq!(
            guarded_status(Role::Teacher, None).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_guard_rejects_wrong_role_with_403() {
        assert_eq!(
            guarded_status(Role::Teacher, Some(claims(Role::Alumni))).await,
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn test_guard_passes_allowed_role() {
        assert_eq!(
            guarded_status(Role::Teacher, Some(claims(Role::Teacher))).await,
            StatusCode::OK
        );
    }
}
