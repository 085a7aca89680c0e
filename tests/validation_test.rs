//! Tests for input validation, code generation and small helpers

use std::cell::RefCell;
use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};

use snaplink::clipboard::{copy_short_url, Clipboard};
use snaplink::config::AppConfig;
use snaplink::model::{ShortenedUrl, UrlFormData};
use snaplink::shortcode::{generate, generate_id, generate_unique, to_base36};
use snaplink::validation::{
    is_valid_short_code, is_valid_url, is_valid_validity_period, validate_form_batch,
};

#[test]
fn test_valid_urls_accepted() {
    assert!(is_valid_url("https://example.com/path?q=1"));
    assert!(is_valid_url("http://test.org"));
    assert!(is_valid_url("https://subdomain.example.com/path?query=1"));
    assert!(is_valid_url("http://172.32.0.1/outside-private-range"));
}

#[test]
fn test_internal_and_malformed_urls_rejected() {
    for url in [
        "http://localhost/x",
        "http://127.0.0.1/x",
        "http://192.168.1.5/x",
        "http://10.0.0.1/x",
        "http://172.20.0.1/x",
        "http://172.16.0.1/x",
        "http://172.31.255.255/x",
        "http://printer.local/x",
        "http://LOCALHOST:8080/x",
        "http://[::1]/x",
        "javascript:alert(1)",
        "ftp://example.com/file",
        "not-a-url",
        "",
        "   ",
    ] {
        assert!(!is_valid_url(url), "{} should be rejected", url);
    }
}

#[test]
fn test_short_code_format() {
    assert!(is_valid_short_code("abc123"));
    assert!(is_valid_short_code("abc"));
    assert!(is_valid_short_code("A1b2C3d4E5f6G7h8I9j0"));
    assert!(!is_valid_short_code("a"));
    assert!(!is_valid_short_code("bad-code!"));
    assert!(!is_valid_short_code("A1b2C3d4E5f6G7h8I9j0k"));
}

#[test]
fn test_validity_period_bounds() {
    assert!(is_valid_validity_period(1));
    assert!(is_valid_validity_period(10080));
    assert!(!is_valid_validity_period(0));
    assert!(!is_valid_validity_period(-1));
    assert!(!is_valid_validity_period(10081));
}

#[test]
fn test_form_batch_valid() {
    let entries = vec![
        UrlFormData::new("https://example.com").with_validity(30),
        UrlFormData::new("http://test.org").with_custom_code("test123"),
    ];

    assert!(validate_form_batch(&entries, 5).is_empty());
}

#[test]
fn test_form_batch_accumulates_all_errors() {
    let entries = vec![
        UrlFormData::new("invalid-url"),
        UrlFormData::new("").with_validity(-1),
        UrlFormData::new("https://example.com").with_custom_code("a"),
        UrlFormData::new("https://example.com").with_custom_code("invalid-code!"),
    ];

    let errors = validate_form_batch(&entries, 5);
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

    assert_eq!(
        fields,
        vec![
            "url_0_originalUrl",
            "url_1_originalUrl",
            "url_1_validityPeriod",
            "url_2_customShortCode",
            "url_3_customShortCode",
        ]
    );
    assert_eq!(errors[0].message, "Please enter a valid URL");
    assert_eq!(errors[1].message, "URL is required");
    assert!(errors[3].message.contains("alphanumeric"));
}

#[test]
fn test_form_batch_zero_validity_means_default() {
    let entries = vec![UrlFormData::new("https://example.com").with_validity(0)];
    assert!(validate_form_batch(&entries, 5).is_empty());
}

#[test]
fn test_form_batch_rejects_reserved_codes() {
    let entries = vec![UrlFormData::new("https://example.com").with_custom_code("api")];

    let errors = validate_form_batch(&entries, 5);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "url_0_customShortCode");
    assert!(errors[0].message.contains("reserved"));
}

#[test]
fn test_form_batch_size_limits() {
    let errors = validate_form_batch(&[], 5);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "general");

    let entries = vec![UrlFormData::new("https://example.com"); 6];
    let errors = validate_form_batch(&entries, 5);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "general");
}

#[test]
fn test_generate_code_length_and_alphabet() {
    let code = generate(8);
    assert_eq!(code.len(), 8);
    assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));

    assert_ne!(generate(6), generate(6));
}

#[test]
fn test_generate_unique_avoids_existing() {
    let existing: HashSet<String> = (0..50).map(|_| generate(6)).collect();

    for _ in 0..200 {
        let code = generate_unique(&existing, 6);
        assert!(!existing.contains(&code));
    }
}

#[test]
fn test_generate_unique_falls_back_when_space_exhausted() {
    // Every 1-character code is taken, so generation must fall back
    let existing: HashSet<String> = ('a'..='z')
        .chain('A'..='Z')
        .chain('0'..='9')
        .map(String::from)
        .collect();

    let code = generate_unique(&existing, 1);
    assert!(code.len() > 3);
    assert!(!existing.contains(&code));
    assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn test_base36() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "z");
    assert_eq!(to_base36(36), "10");
    assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
}

#[test]
fn test_generate_id_unique_for_same_instant() {
    let now = Utc::now();
    let ids: HashSet<String> = (0..100).map(|_| generate_id(now)).collect();
    assert_eq!(ids.len(), 100);
}

#[test]
fn test_time_remaining() {
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let url = ShortenedUrl::new(
        "id".to_string(),
        "https://example.com".to_string(),
        "abc123".to_string(),
        "http://localhost:8080",
        created,
        3 * 24 * 60,
        None,
    );

    assert_eq!(url.time_remaining(created), "3d 0h");
    assert_eq!(url.time_remaining(created + Duration::days(2) + Duration::hours(1)), "23h 0m");
    assert_eq!(url.time_remaining(url.expires_at - Duration::minutes(7)), "7m");
    assert_eq!(url.time_remaining(url.expires_at), "Expired");
    assert_eq!(url.short_url, "http://localhost:8080/abc123");
}

struct FakeClipboard {
    works: bool,
    written: RefCell<Vec<String>>,
}

impl Clipboard for FakeClipboard {
    fn write(&self, text: &str) -> bool {
        if self.works {
            self.written.borrow_mut().push(text.to_string());
        }
        self.works
    }
}

#[test]
fn test_copy_short_url() {
    let url = ShortenedUrl::new(
        "id".to_string(),
        "https://example.com".to_string(),
        "promo".to_string(),
        "https://sho.rt/",
        Utc::now(),
        30,
        Some("promo".to_string()),
    );

    let clipboard = FakeClipboard {
        works: true,
        written: RefCell::new(Vec::new()),
    };
    assert!(copy_short_url(&clipboard, &url));
    assert_eq!(clipboard.written.borrow().as_slice(), ["https://sho.rt/promo"]);

    let broken = FakeClipboard {
        works: false,
        written: RefCell::new(Vec::new()),
    };
    assert!(!copy_short_url(&broken, &url));
}

#[test]
fn test_config_defaults_and_overrides() {
    let config = AppConfig::from_lookup(|_| None);
    assert_eq!(config.port, 8080);
    assert_eq!(config.database_path, "data.db");
    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.refresh_interval.as_secs(), 60);
    assert_eq!(config.redirect_delay.as_millis(), 200);
    assert_eq!(config.geo_lookup_url.as_deref(), Some("https://ipapi.co"));
    assert_eq!(config.max_batch, 5);

    let config = AppConfig::from_lookup(|key| match key {
        "PORT" => Some("9000".to_string()),
        "BASE_URL" => Some("https://sho.rt/".to_string()),
        "REFRESH_INTERVAL_SECS" => Some("not-a-number".to_string()),
        "GEO_LOOKUP_URL" => Some(String::new()),
        "MAX_BATCH_SIZE" => Some("10".to_string()),
        _ => None,
    });
    assert_eq!(config.port, 9000);
    assert_eq!(config.base_url, "https://sho.rt");
    assert_eq!(config.refresh_interval.as_secs(), 60);
    assert_eq!(config.geo_lookup_url, None);
    assert_eq!(config.max_batch, 10);
}
