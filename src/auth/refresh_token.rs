/// Refresh Token Management
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Stored only as a SHA-256 `TokenDigest`
/// - Valid until their own expiry or an explicit logout; using one does not
///   rotate it
///
/// Expired rows are rejected at lookup time; the sweeper below only keeps
/// the table small.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::service::AuthService;

/// Generate a new refresh token
///
/// The plaintext is returned to the client; the server keeps its digest.
pub fn generate_refresh_token() -> String {
    super::generate_opaque_token()
}

/// Periodically delete expired refresh tokens
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. A failed sweep is logged and retried on the next tick.
pub fn spawn_session_sweeper(auth: AuthService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match auth.sweep_expired().await {
                Ok(0) => tracing::debug!("No expired refresh tokens to sweep"),
                Ok(removed) => tracing::info!(removed, "Swept expired refresh tokens"),
                Err(e) => tracing::warn!(error = %e, "Refresh token sweep failed"),
            }
        }
    })
}
