//! Application configuration read from the environment
//!
//! `main` loads a `.env` file first, so every variable below can live there.

use std::env;
use std::time::Duration;

use crate::registry::DEFAULT_MAX_BATCH;

/// Runtime settings
///
/// # Environment Variables
///
/// - `PORT` - Server port number (default: 8080)
/// - `DATABASE_URL` - Path to database file (default: "data.db")
/// - `BASE_URL` - Origin used to build short links (default: "http://localhost:{PORT}")
/// - `REFRESH_INTERVAL_SECS` - Expiration refresh cadence (default: 60)
/// - `REDIRECT_DELAY_MS` - Delay before a [`Navigator`](crate::resolver::Navigator)
///   navigates (default: 200). The HTTP redirect route answers at once and
///   does not wait for it; only embedders that drive `navigate` do.
/// - `GEO_LOOKUP_URL` - Geolocation endpoint, empty disables lookups (default: "https://ipapi.co")
/// - `GEO_TIMEOUT_MS` - Geolocation timeout (default: 1500)
/// - `MAX_BATCH_SIZE` - Maximum URLs per creation request (default: 5)
/// - `LOG_FILTER` - tracing filter (default: "snaplink=debug,tower_http=debug")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub refresh_interval: Duration,
    pub redirect_delay: Duration,
    pub geo_lookup_url: Option<String>,
    pub geo_timeout: Duration,
    pub max_batch: usize,
    pub log_filter: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(default)
        };

        let port = lookup("PORT")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(8080);

        let base_url = lookup("BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let geo_lookup_url = match lookup("GEO_LOOKUP_URL") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value),
            None => Some("https://ipapi.co".to_string()),
        };

        Self {
            port,
            database_path: lookup("DATABASE_URL").unwrap_or_else(|| "data.db".to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            refresh_interval: Duration::from_secs(number("REFRESH_INTERVAL_SECS", 60).max(1)),
            redirect_delay: Duration::from_millis(number("REDIRECT_DELAY_MS", 200)),
            geo_lookup_url,
            geo_timeout: Duration::from_millis(number("GEO_TIMEOUT_MS", 1500)),
            max_batch: usize::try_from(number("MAX_BATCH_SIZE", DEFAULT_MAX_BATCH as u64))
                .unwrap_or(DEFAULT_MAX_BATCH)
                .max(1),
            log_filter: lookup("LOG_FILTER")
                .unwrap_or_else(|| "snaplink=debug,tower_http=debug".to_string()),
        }
    }
}
