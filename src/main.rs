use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use campus_auth::auth::spawn_session_sweeper;
use campus_auth::configuration::{get_configuration, Settings, StoreBackend};
use campus_auth::startup::{run, Services};
use campus_auth::store::{MemoryStore, PgRefreshTokenStore, PgUserStore, RefreshTokenStore, UserStore};
use campus_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

type Stores = (Arc<dyn UserStore>, Arc<dyn RefreshTokenStore>);

async fn build_stores(configuration: &Settings) -> std::io::Result<Stores> {
    match configuration.application.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; all accounts are lost on restart");
            let store = Arc::new(MemoryStore::new());
            Ok((store.clone(), store))
        }
        StoreBackend::Postgres => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(configuration.database.max_connections)
                .connect(&configuration.database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "Database connection error",
                    )
                })?;

            sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
            })?;

            tracing::info!("Database connection pool created successfully");
            Ok((
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(PgRefreshTokenStore::new(pool)),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    init_telemetry(&configuration.telemetry);
    tracing::info!("Starting application");

    let (users, refresh_tokens) = build_stores(&configuration).await?;

    let services = Services::new(&configuration, users, refresh_tokens).map_err(|e| {
        tracing::error!("Failed to build services: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    spawn_session_sweeper(
        services.auth.clone(),
        Duration::from_secs(configuration.sessions.sweep_interval),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, services, configuration.jwt.clone())?;
    server.await
}
