//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Opens the persisted registry and starts its expiration refresher
//! - Starts the HTTP server with graceful shutdown support

use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use snaplink::clock::SystemClock;
use snaplink::config::AppConfig;
use snaplink::database::{MemoryStorage, RedbStorage, Storage};
use snaplink::location::{IpApiLocator, Locator, UnknownLocator};
use snaplink::registry::{spawn_expiration_refresher, UrlRegistry};
use snaplink::resolver::Resolver;
use snaplink::route::{create_app, AppState};

/// Application entry point
///
/// This asynchronous main function:
/// 1. Loads environment variables from .env file
/// 2. Reads configuration (see [`AppConfig`])
/// 3. Opens the embedded database and loads the registry from it
/// 4. Spawns the periodic expiration refresh
/// 5. Starts the HTTP server and stops the refresher once it shuts down
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.as_str())
        .init();

    let storage: Arc<dyn Storage> = match RedbStorage::open(&config.database_path) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Failed to open database {}: {}, data will not persist", config.database_path, e);
            Arc::new(MemoryStorage::new())
        }
    };

    let locator: Arc<dyn Locator> = match config.geo_lookup_url.as_deref() {
        Some(endpoint) => match IpApiLocator::new(endpoint, config.geo_timeout) {
            Ok(locator) => Arc::new(locator),
            Err(e) => {
                warn!("Geolocation disabled: {}", e);
                Arc::new(UnknownLocator)
            }
        },
        None => Arc::new(UnknownLocator),
    };

    let registry = Arc::new(
        UrlRegistry::open(storage, Arc::new(SystemClock), config.base_url.clone())
            .with_max_batch(config.max_batch),
    );
    let resolver = Resolver::new(Arc::clone(&registry), locator)
        .with_redirect_delay(config.redirect_delay)
        .with_location_timeout(config.geo_timeout);

    let shutdown = CancellationToken::new();
    let refresher = spawn_expiration_refresher(
        Arc::clone(&registry),
        config.refresh_interval,
        shutdown.clone(),
    );

    let app = create_app(AppState::with_resolver(registry, resolver))
        .layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the specified port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running at {}", config.base_url);
    info!("Using database: {}", config.database_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = refresher.await;

    Ok(())
}

/// Handles graceful shutdown signals
///
/// Returns when SIGINT (Ctrl+C) or, on Unix, SIGTERM is received. A handler
/// that cannot be installed simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    // On non-Unix systems (Windows), only handle Ctrl+C
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
