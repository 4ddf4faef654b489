use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request/response logging middleware
///
/// Every request runs inside an `http_request` span carrying a fresh
/// `request_id`, which is also returned in the `x-request-id` header. Handler
/// logs and error logs (with their `error_id`) inherit the span. Query
/// strings are logged only when they cannot carry a credential; the
/// Authorization header is never logged.
pub struct LoggerMiddleware;

/// Query string safe to log, or `None` if it is empty or may hold a token
fn loggable_query<'a>(path: &str, query: &'a str) -> Option<&'a str> {
    if query.is_empty() || path.contains("reset-password") || query.contains("token") {
        return None;
    }
    Some(query)
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
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
        let start_time = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let span = tracing::info_span!("http_request", request_id = %request_id);

        span.in_scope(|| match loggable_query(&path, req.query_string()) {
            Some(query) => tracing::info!(%method, %path, %query, "Request started"),
            None => tracing::info!(%method, %path, "Request started"),
        });

        let service = self.service.clone();

        let fut = async move {
            let mut result = service.call(req).await;
            let elapsed_ms = start_time.elapsed().as_millis() as u64;

            // Middleware rejections arrive here as `Err` and are rendered later
            let status = match &result {
                Ok(res) => res.status(),
                Err(e) => e.as_response_error().status_code(),
            };

            tracing::info!(
                %method,
                %path,
                status = status.as_u16(),
                elapsed_ms,
                "Request completed"
            );

            if let (Ok(res), Ok(value)) = (&mut result, HeaderValue::from_str(&request_id)) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }

            result
        };

        Box::pin(fut.instrument(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    #[actix_web::test]
    async fn test_each_response_carries_a_distinct_request_id() {
        let app = test::init_service(
            App::new()
                .wrap(LoggerMiddleware)
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let mut ids = Vec::new();
        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/ping").to_request();
            let res = test::call_service(&app, req).await;
            let id = res.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
            assert!(Uuid::parse_str(id).is_ok());
            ids.push(id.to_string());
        }
        assert_ne!(ids[0], ids[1]);
    }

    #[::core::prelude::v1::test]
    fn test_reset_token_queries_are_not_logged() {
        assert_eq!(loggable_query("/auth/reset-password", "token=abc"), None);
        assert_eq!(loggable_query("/auth/reset-password", "x=1"), None);
        assert_eq!(loggable_query("/other", "access_token=abc"), None);
    }

    #[::core::prelude::v1::test]
    fn test_plain_queries_are_logged() {
        assert_eq!(loggable_query("/api/me", "page=2"), Some("page=2"));
        assert_eq!(loggable_query("/api/me", ""), None);
    }
}
