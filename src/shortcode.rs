//! Short code and identifier generation
//!
//! Codes only need to be unique, not unpredictable, so the thread-local
//! generator from `rand` is used throughout.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use tracing::debug;

pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Attempts made before falling back to a timestamp-based code
pub const MAX_ATTEMPTS: usize = 100;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Draws `length` characters uniformly from `[A-Za-z0-9]`
pub fn generate(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generates a code absent from `existing`.
///
/// After [`MAX_ATTEMPTS`] collisions the result is a 3 character random
/// prefix followed by the base-36 millisecond timestamp, which always
/// terminates.
pub fn generate_unique(existing: &HashSet<String>, length: usize) -> String {
    for attempt in 0..MAX_ATTEMPTS {
        let code = generate(length);
        if !existing.contains(&code) {
            debug!("Generated unique shortcode: {} (attempts: {})", code, attempt);
            return code;
        }
    }

    let code = format!("{}{}", generate(3), to_base36(millis(Utc::now())));
    debug!("Generated fallback shortcode: {} (attempts: {})", code, MAX_ATTEMPTS);
    code
}

/// Opaque record/click identifier: base-36 timestamp plus random suffix
pub fn generate_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..11)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    format!("{}{}", to_base36(millis(now)), suffix)
}

/// Lowercase base-36 rendering of `value`
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

fn millis(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or_default()
}
