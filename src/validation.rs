//! Input validation and the redirect-target safety predicate
//!
//! Everything here is a pure function. `is_valid_url` is used twice: when a
//! link is created and again by the resolver right before navigating.

use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::{debug, warn};
use url::{Host, Url};

use crate::model::{UrlFormData, ValidationError};

/// Longest accepted validity period: 7 days in minutes
pub const MAX_VALIDITY_MINUTES: i64 = 10_080;

pub const MIN_SHORT_CODE_LEN: usize = 3;
pub const MAX_SHORT_CODE_LEN: usize = 20;

/// Codes that would shadow application routes
pub const RESERVED_CODES: &[&str] = &["api", "health", "stats", "statistics"];

/// True iff `s` is an absolute http(s) URL whose host is not a loopback or
/// private-network address.
pub fn is_valid_url(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && !is_internal_host(&url),
        Err(_) => false,
    }
}

/// Host blocklist shared by creation-time validation and the resolver.
///
/// Blocks `localhost`, `*.local`, IPv4 loopback and the 10/8, 172.16/12 and
/// 192.168/16 ranges, and the IPv6 loopback. A URL without a host counts as
/// internal.
pub fn is_internal_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".local")
        }
        Some(Host::Ipv4(addr)) => is_internal_ipv4(addr),
        Some(Host::Ipv6(addr)) => is_internal_ipv6(addr),
        None => true,
    }
}

fn is_internal_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_private()
}

fn is_internal_ipv6(addr: Ipv6Addr) -> bool {
    addr.is_loopback() || addr.to_ipv4_mapped().is_some_and(is_internal_ipv4)
}

/// True iff `s` matches `^[A-Za-z0-9]{3,20}$`
pub fn is_valid_short_code(s: &str) -> bool {
    (MIN_SHORT_CODE_LEN..=MAX_SHORT_CODE_LEN).contains(&s.len())
        && s.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn is_reserved_code(s: &str) -> bool {
    RESERVED_CODES.iter().any(|reserved| reserved.eq_ignore_ascii_case(s))
}

/// True iff `0 < minutes <= 10080`
pub fn is_valid_validity_period(minutes: i64) -> bool {
    minutes > 0 && minutes <= MAX_VALIDITY_MINUTES
}

/// Checks a whole creation batch and returns every problem found.
///
/// Entries are not short-circuited: a form gets all of its errors at once.
/// `max_batch` bounds the number of entries per submission.
pub fn validate_form_batch(entries: &[UrlFormData], max_batch: usize) -> Vec<ValidationError> {
    debug!("Validating {} URLs", entries.len());

    let mut errors = Vec::new();

    if entries.is_empty() {
        errors.push(ValidationError::new("general", "Please enter at least one URL"));
        return errors;
    }
    if entries.len() > max_batch {
        errors.push(ValidationError::new(
            "general",
            format!("You can shorten at most {} URLs at once", max_batch),
        ));
    }

    for (index, entry) in entries.iter().enumerate() {
        let prefix = format!("url_{}", index);

        if entry.original_url.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}_originalUrl", prefix),
                "URL is required",
            ));
        } else if !is_valid_url(&entry.original_url) {
            errors.push(ValidationError::new(
                format!("{}_originalUrl", prefix),
                "Please enter a valid URL",
            ));
        }

        // 0 is the form's "use the default" value
        if let Some(period) = entry.validity_period.filter(|p| *p != 0) {
            if !is_valid_validity_period(period) {
                errors.push(ValidationError::new(
                    format!("{}_validityPeriod", prefix),
                    "Validity period must be between 1 and 10080 minutes (7 days)",
                ));
            }
        }

        if let Some(code) = entry.custom_short_code.as_deref().filter(|c| !c.is_empty()) {
            if !is_valid_short_code(code) {
                errors.push(ValidationError::new(
                    format!("{}_customShortCode", prefix),
                    "Shortcode must be 3-20 alphanumeric characters",
                ));
            } else if is_reserved_code(code) {
                errors.push(ValidationError::new(
                    format!("{}_customShortCode", prefix),
                    format!("Shortcode \"{}\" is reserved", code),
                ));
            }
        }
    }

    if !errors.is_empty() {
        warn!("Validation failed with {} errors", errors.len());
    }

    errors
}
