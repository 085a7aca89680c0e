//! Coarse visitor geolocation
//!
//! A lookup is a nice-to-have for click analytics. Any failure, timeout or
//! disabled provider turns into [`UNKNOWN_LOCATION`] and never blocks the
//! redirect it belongs to.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LocationError;
use crate::model::UNKNOWN_LOCATION;

/// Something that can turn a visitor into a "City, Country" string
#[async_trait]
pub trait Locator: Send + Sync {
    async fn lookup(&self, ip: Option<IpAddr>) -> Result<String, LocationError>;
}

/// Looks the visitor up, falling back to "Unknown Location"
pub async fn coarse_location(locator: &dyn Locator, ip: Option<IpAddr>, timeout: Duration) -> String {
    match tokio::time::timeout(timeout, locator.lookup(ip)).await {
        Ok(Ok(location)) => location,
        Ok(Err(LocationError::Disabled)) => UNKNOWN_LOCATION.to_string(),
        Ok(Err(e)) => {
            warn!("Failed to get location info: {}", e);
            UNKNOWN_LOCATION.to_string()
        }
        Err(_) => {
            warn!("Failed to get location info: {}", LocationError::Timeout);
            UNKNOWN_LOCATION.to_string()
        }
    }
}

#[derive(Deserialize)]
struct IpApiResponse {
    city: Option<String>,
    country_name: Option<String>,
}

/// Locator backed by an ipapi.co compatible JSON endpoint
///
/// Requests `{endpoint}/{ip}/json/` when the visitor address is known and
/// `{endpoint}/json/` otherwise.
pub struct IpApiLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLocator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LocationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, ip: Option<IpAddr>) -> String {
        match ip {
            Some(ip) => format!("{}/{}/json/", self.endpoint, ip),
            None => format!("{}/json/", self.endpoint),
        }
    }
}

#[async_trait]
impl Locator for IpApiLocator {
    async fn lookup(&self, ip: Option<IpAddr>) -> Result<String, LocationError> {
        let url = self.url_for(ip);
        debug!("Fetching location from {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LocationError::Status(response.status()));
        }

        let body: IpApiResponse = response.json().await?;
        Ok(format!(
            "{}, {}",
            body.city.as_deref().unwrap_or("Unknown"),
            body.country_name.as_deref().unwrap_or("Unknown")
        ))
    }
}

/// Always answers with the same location
#[derive(Debug, Clone)]
pub struct FixedLocator(pub String);

#[async_trait]
impl Locator for FixedLocator {
    async fn lookup(&self, _ip: Option<IpAddr>) -> Result<String, LocationError> {
        Ok(self.0.clone())
    }
}

/// Used when lookups are switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownLocator;

#[async_trait]
impl Locator for UnknownLocator {
    async fn lookup(&self, _ip: Option<IpAddr>) -> Result<String, LocationError> {
        Err(LocationError::Disabled)
    }
}
