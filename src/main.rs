#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::DEFAULT_TOKEN_LIFETIME;
use crate::api::JwtKeys;
use crate::api::router;
use crate::lifecycle::Lifecycle;
use crate::storage::Config as StorageConfig;
use crate::storage::Database;
use crate::users::ensure_initial_user;
use crate::utils::env_var_or_else;
use crate::utils::env_var_parsed_or;

mod api;
mod donations;
mod expiry;
mod graceful_shutdown;
mod lifecycle;
mod password;
mod storage;
#[cfg(test)]
mod tests;
mod users;
mod utils;

const DEFAULT_RUST_LOG: &str = "foodshare=debug,tower_http=debug";
const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let database = setup_database(StorageConfig::DetectConfig).await?;
    let lifecycle = Lifecycle::new(database.clone());

    let shutdown = CancellationToken::new();
    let sweeper = expiry::spawn(lifecycle.clone(), setup_sweep_interval()?, shutdown.clone());

    let app = create_router(database, lifecycle, setup_jwt_keys()?);

    let address = setup_address()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await?;

    shutdown.cancel();
    sweeper.await?;

    Ok(())
}

/// Connect to the storage and make sure it can be logged in to
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Database connection
/// - Initial user setup
pub async fn setup_database(config: StorageConfig) -> Result<Database> {
    let database = storage::setup(config).await?;

    ensure_initial_user(&database).await?;

    Ok(database)
}

/// Create the router for Foodshare
pub fn create_router(database: Database, lifecycle: Lifecycle, jwt_keys: JwtKeys) -> Router {
    Router::new()
        .nest("/api", router())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(database))
        .layer(Extension(lifecycle))
        .layer(Extension(jwt_keys))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}

fn setup_jwt_keys() -> Result<JwtKeys> {
    use crate::password::generate;

    let jwt_secret = env_var_or_else("JWT_SECRET", || {
        let jwt_secret = generate();
        tracing::info!("`JWT_SECRET` is not set, generating temporary one: {jwt_secret}");
        jwt_secret
    });

    let token_lifetime = env_var_parsed_or("TOKEN_LIFETIME_SECS", DEFAULT_TOKEN_LIFETIME)?;
    if token_lifetime <= 0 {
        anyhow::bail!("`TOKEN_LIFETIME_SECS` must be positive");
    }

    Ok(JwtKeys::new(jwt_secret.as_bytes(), token_lifetime))
}

fn setup_sweep_interval() -> Result<Duration> {
    let seconds = env_var_parsed_or(
        "EXPIRY_SWEEP_INTERVAL_SECS",
        expiry::DEFAULT_SWEEP_INTERVAL.as_secs(),
    )?;

    if seconds == 0 {
        anyhow::bail!("`EXPIRY_SWEEP_INTERVAL_SECS` must be at least 1");
    }

    Ok(Duration::from_secs(seconds))
}

fn setup_address() -> Result<SocketAddr> {
    let mut address =
        env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS)).parse::<SocketAddr>()?;

    // optional override of just the port
    if let Ok(port) = std::env::var("PORT") {
        // only check non-empty strings
        if !port.is_empty() {
            let port = port.parse::<u16>()?;

            address.set_port(port);
        }
    }

    Ok(address)
}
