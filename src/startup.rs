use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, PasswordResetService};
use crate::configuration::{JwtSettings, Settings};
use crate::domain::Role;
use crate::email_client::EmailClient;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::{JwtMiddleware, RoleGuard};
use crate::routes::{
    change_password, create_user, forgot_password, get_current_user, health_check, login, logout,
    refresh, register, reset_password, revoke_sessions, teacher_me, verify_reset_token,
};
use crate::store::{RefreshTokenStore, UserStore};

/// Everything the handlers share, built once from configuration
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub password_reset: PasswordResetService,
}

impl Services {
    pub fn new(
        settings: &Settings,
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(settings.password.hash_cost)?;

        let sender = settings.email_client.sender().map_err(AppError::Config)?;
        let http_client = reqwest::Client::builder()
            .timeout(settings.email_client.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let email_client = EmailClient::new(
            settings.email_client.base_url.clone(),
            sender,
            settings.email_client.authorization_token.clone(),
            http_client,
        );

        let auth = AuthService::new(
            users.clone(),
            refresh_tokens.clone(),
            hasher.clone(),
            settings.jwt.clone(),
        );
        let password_reset = PasswordResetService::new(
            users,
            refresh_tokens,
            hasher,
            email_client,
            settings.password_reset.clone(),
        );

        Ok(Self {
            auth,
            password_reset,
        })
    }
}

pub fn run(
    listener: TcpListener,
    services: Services,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(services.auth);
    let password_reset = web::Data::new(services.password_reset);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware. `%U` is the path only; query strings may
            // carry reset tokens.
            .wrap(Logger::new("%a %U %s %b %Dms").exclude("/health_check"))
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(auth.clone())
            .app_data(password_reset.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .route("/forgot-password", web::post().to(forgot_password))
                    .route("/reset-password", web::get().to(verify_reset_token))
                    .route("/reset-password", web::post().to(reset_password)),
            )

            // Protected routes. The JWT layer wraps the nested scopes, so the
            // role guards only ever see requests it accepted.
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/teachers")
                            .wrap(RoleGuard::new([Role::Teacher]))
                            .route("/me", web::get().to(teacher_me)),
                    )
                    .service(
                        web::scope("/admin")
                            .wrap(RoleGuard::new([Role::Admin]))
                            .route("/users", web::post().to(create_user)),
                    )
                    .route("/me", web::get().to(get_current_user))
                    .route("/me/password", web::post().to(change_password))
                    .route("/me/sessions", web::delete().to(revoke_sessions))
                    .wrap(JwtMiddleware::new(jwt_config.clone())),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
