//! Data models for the URL shortener
//!
//! This module defines the shortened-URL aggregate, its click records, the
//! creation form entries and the request/response payloads of the HTTP API.
//! All structures serialize with camelCase field names, which is also the
//! layout written to persistent storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shortcode::generate_id;

/// Source tag recorded for clicks that came through the short-link route
pub const SOURCE_REDIRECT: &str = "redirect";

/// Location recorded when geolocation is unavailable
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Represents a shortened URL record
///
/// This structure contains all information about a shortened URL including:
/// - The opaque record id and the public short code
/// - Original and shortened URLs
/// - Creation and expiration timestamps
/// - Click analytics
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShortenedUrl {
    /// Opaque unique identifier assigned at creation
    pub id: String,

    /// The destination the short code resolves to
    pub original_url: String,

    /// Unique key of this record inside the registry (e.g., "abc123")
    pub short_code: String,

    /// Public form of the link: site origin + "/" + short code
    pub short_url: String,

    /// Timestamp when this record was created
    pub created_at: DateTime<Utc>,

    /// `created_at + validity_period` minutes
    pub expires_at: DateTime<Utc>,

    /// Requested lifetime in minutes
    pub validity_period: u32,

    /// Number of accepted clicks, always equal to `clicks.len()`
    #[serde(default)]
    pub click_count: u64,

    /// Click history in chronological order
    #[serde(default)]
    pub clicks: Vec<ClickData>,

    /// Cached expiration flag, recomputed by the registry's refresh pass
    #[serde(default)]
    pub is_expired: bool,

    /// Present when the short code was chosen by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_short_code: Option<String>,
}

impl ShortenedUrl {
    /// Builds a fresh record with no clicks.
    ///
    /// `expires_at` is derived from `created_at` and `validity_period` here
    /// and never touched again.
    pub fn new(
        id: String,
        original_url: String,
        short_code: String,
        base_url: &str,
        created_at: DateTime<Utc>,
        validity_period: u32,
        custom_short_code: Option<String>,
    ) -> Self {
        let short_url = format!("{}/{}", base_url.trim_end_matches('/'), short_code);
        Self {
            id,
            original_url,
            short_code,
            short_url,
            created_at,
            expires_at: created_at + Duration::minutes(i64::from(validity_period)),
            validity_period,
            click_count: 0,
            clicks: Vec::new(),
            is_expired: false,
            custom_short_code,
        }
    }

    /// Pure expiration check against the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Appends a click and bumps the counter in one step
    pub fn push_click(&mut self, click: ClickData) {
        self.clicks.push(click);
        self.click_count += 1;
    }

    /// Human readable time left before expiry
    ///
    /// Returns `"Expired"` once `now` has reached `expires_at`, otherwise the
    /// two most significant units (`"2d 3h"`, `"4h 10m"`, `"7m"`).
    pub fn time_remaining(&self, now: DateTime<Utc>) -> String {
        let diff = self.expires_at - now;
        if diff <= Duration::zero() {
            return "Expired".to_string();
        }

        let minutes = diff.num_minutes();
        let hours = minutes / 60;
        let days = hours / 24;

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

/// A single resolved visit to a short code
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClickData {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form tag such as "redirect" or "direct"
    pub source: String,
    /// Coarse location or "Unknown Location"
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClickData {
    pub fn new(
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        location: impl Into<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(timestamp),
            timestamp,
            source: source.into(),
            location: location.into(),
            user_agent,
        }
    }
}

/// One entry of a creation batch
///
/// # Example
/// ```json
/// {
///   "originalUrl": "https://example.com/very/long/url",
///   "validityPeriod": 60,
///   "customShortCode": "promo"
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UrlFormData {
    /// The URL to be shortened
    pub original_url: String,

    /// Lifetime in minutes; absent or 0 means the 30 minute default
    #[serde(default)]
    pub validity_period: Option<i64>,

    /// Optional user-chosen short code
    /// If not provided, a random 6-character code will be generated
    #[serde(default)]
    pub custom_short_code: Option<String>,
}

impl UrlFormData {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            ..Self::default()
        }
    }

    pub fn with_validity(mut self, minutes: i64) -> Self {
        self.validity_period = Some(minutes);
        self
    }

    pub fn with_custom_code(mut self, code: impl Into<String>) -> Self {
        self.custom_short_code = Some(code.into());
        self
    }
}

/// A user-input problem tied to a form field
///
/// Field identifiers look like `url_<index>_<fieldName>` so a form can map
/// each message back to its input; batch-wide problems use `general`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Layout of the persisted collection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
    pub urls: Vec<ShortenedUrl>,
    pub last_updated: DateTime<Utc>,
}

/// Aggregate numbers shown on the statistics view
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UrlStats {
    pub total_urls: usize,
    pub total_clicks: u64,
    pub active_urls: usize,
    pub expired_urls: usize,
    /// Up to five records with at least one click, most clicked first
    pub top_urls: Vec<ShortenedUrl>,
}

/// A click flattened together with the link it belongs to
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClickEntry {
    pub short_code: String,
    pub original_url: String,
    #[serde(flatten)]
    pub click: ClickData,
}

/// Request payload for creating a batch of short URLs
///
/// # Example
/// ```json
/// {
///   "urls": [
///     { "originalUrl": "https://example.com/a" },
///     { "originalUrl": "https://example.com/b", "customShortCode": "promo" }
///   ]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    pub urls: Vec<UrlFormData>,
}

/// Response returned by the creation endpoint
#[derive(Serialize, Debug, Clone)]
pub struct CreateResponse {
    pub success: bool,
    pub urls: Vec<ShortenedUrl>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

/// Fields of a record that may change after creation
///
/// The short code and both timestamps are immutable and have no place here.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UrlPatch {
    pub original_url: Option<String>,
}

/// Which records a listing should include
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Expired,
}

/// Query parameters for listing URLs with pagination
///
/// # Example
/// Query string: `?status=active&page=2&limit=20`
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    /// Restrict the listing to active or expired records
    pub status: Option<StatusFilter>,

    /// Page number for pagination (starts from 1)
    /// Defaults to 1 if not provided
    pub page: Option<usize>,

    /// Number of items per page
    /// Defaults to 10 if not provided, maximum is 100
    pub limit: Option<usize>,
}

/// Query parameters for the click log
#[derive(Deserialize, Debug, Default)]
pub struct ClickParams {
    /// Defaults to 50 if not provided
    pub limit: Option<usize>,
}
