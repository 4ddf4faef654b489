/// Middleware module
///
/// Request authentication (`JwtMiddleware`) and role authorization
/// (`RoleGuard`). Wrap order matters: the guard must run after the gateway.

mod jwt_middleware;
mod role_guard;

pub use jwt_middleware::{extract_bearer_token, JwtMiddleware};
pub use role_guard::{authorize, RoleGuard};
