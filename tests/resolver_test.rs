//! Tests for short code resolution, click recording and delayed navigation

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use snaplink::clock::ManualClock;
use snaplink::database::MemoryStorage;
use snaplink::error::LocationError;
use snaplink::location::{coarse_location, FixedLocator, Locator, UnknownLocator};
use snaplink::model::{UrlFormData, UrlPatch};
use snaplink::registry::UrlRegistry;
use snaplink::resolver::{
    BlockReason, Navigator, NotFoundReason, ResolveState, Resolver, Visit,
};

struct SlowLocator;

#[async_trait]
impl Locator for SlowLocator {
    async fn lookup(&self, _ip: Option<IpAddr>) -> Result<String, LocationError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok("Too, Late".to_string())
    }
}

struct RateLimitedLocator;

#[async_trait]
impl Locator for RateLimitedLocator {
    async fn lookup(&self, _ip: Option<IpAddr>) -> Result<String, LocationError> {
        Err(LocationError::Status(reqwest::StatusCode::TOO_MANY_REQUESTS))
    }
}

#[derive(Default)]
struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, target: &str) {
        self.visited.lock().unwrap().push(target.to_string());
    }
}

fn setup_resolver(locator: Arc<dyn Locator>) -> (Resolver, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let registry = UrlRegistry::open(
        Arc::new(MemoryStorage::new()),
        clock.clone(),
        "http://localhost:8080",
    );
    registry
        .shorten(&[
            UrlFormData::new("https://example.com/landing").with_custom_code("promo"),
            UrlFormData::new("https://example.com/brief")
                .with_custom_code("brief")
                .with_validity(1),
        ])
        .unwrap();

    (Resolver::new(Arc::new(registry), locator), clock)
}

fn click_count(resolver: &Resolver, code: &str) -> u64 {
    resolver.registry().snapshot().get(code).unwrap().click_count
}

#[tokio::test]
async fn test_resolve_records_click_and_redirects() {
    let (resolver, _) = setup_resolver(Arc::new(FixedLocator("Berlin, Germany".to_string())));

    let attempt = resolver.begin(Some("promo".to_string()));
    assert_eq!(attempt.state(), ResolveState::Resolving);

    let visit = Visit {
        user_agent: Some("Mozilla/5.0".to_string()),
        ..Visit::default()
    };
    let state = attempt.resolve(&visit).await;

    assert_eq!(
        state,
        ResolveState::Redirecting {
            short_code: "promo".to_string(),
            target: "https://example.com/landing".to_string(),
        }
    );
    assert!(state.is_terminal());
    assert_eq!(state.message(), None);

    let record = resolver.registry().snapshot().get("promo").cloned().unwrap();
    assert_eq!(record.click_count, 1);
    let click = &record.clicks[0];
    assert_eq!(click.source, "redirect");
    assert_eq!(click.location, "Berlin, Germany");
    assert_eq!(click.user_agent.as_deref(), Some("Mozilla/5.0"));
}

#[tokio::test]
async fn test_resolve_is_one_shot() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));

    let attempt = resolver.begin(Some("promo".to_string()));
    let first = attempt.resolve(&Visit::default()).await;
    let second = attempt.resolve(&Visit::default()).await;

    assert_eq!(first, second);
    assert_eq!(click_count(&resolver, "promo"), 1);
    assert_eq!(
        resolver.registry().snapshot().get("promo").unwrap().clicks[0].location,
        "Unknown Location"
    );
}

#[tokio::test]
async fn test_concurrent_resolve_records_one_click() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));

    let attempt = resolver.begin(Some("promo".to_string()));
    let visit = Visit::default();
    let (a, b) = tokio::join!(attempt.resolve(&visit), attempt.resolve(&visit));

    assert!(a.is_terminal() || b.is_terminal());
    assert_eq!(click_count(&resolver, "promo"), 1);
}

#[tokio::test]
async fn test_separate_attempts_are_debounced() {
    let (resolver, clock) = setup_resolver(Arc::new(UnknownLocator));

    for _ in 0..2 {
        let state = resolver
            .begin(Some("promo".to_string()))
            .resolve(&Visit::default())
            .await;
        assert!(matches!(state, ResolveState::Redirecting { .. }));
    }
    assert_eq!(click_count(&resolver, "promo"), 1);

    clock.advance(chrono::Duration::seconds(2));
    resolver
        .begin(Some("promo".to_string()))
        .resolve(&Visit::default())
        .await;
    assert_eq!(click_count(&resolver, "promo"), 2);
}

#[tokio::test]
async fn test_missing_and_unknown_codes() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));

    let state = resolver.begin(None).resolve(&Visit::default()).await;
    assert_eq!(state, ResolveState::NotFound(NotFoundReason::NoCode));
    assert_eq!(state.message(), Some("No short code provided"));

    let state = resolver
        .begin(Some(String::new()))
        .resolve(&Visit::default())
        .await;
    assert_eq!(state, ResolveState::NotFound(NotFoundReason::NoCode));

    let state = resolver
        .begin(Some("nothere".to_string()))
        .resolve(&Visit::default())
        .await;
    assert_eq!(state, ResolveState::NotFound(NotFoundReason::MissingOrExpired));
    assert_eq!(state.message(), Some("Short URL not found or has expired"));
}

#[tokio::test]
async fn test_expired_code_not_found() {
    let (resolver, clock) = setup_resolver(Arc::new(UnknownLocator));

    clock.advance(chrono::Duration::minutes(2));
    assert_eq!(resolver.registry().refresh_expiration_status(), 1);

    let state = resolver
        .begin(Some("brief".to_string()))
        .resolve(&Visit::default())
        .await;
    assert_eq!(state, ResolveState::NotFound(NotFoundReason::MissingOrExpired));
    assert_eq!(click_count(&resolver, "brief"), 0);

    // Other links are unaffected
    assert!(matches!(
        resolver.check(Some("promo")),
        Ok(record) if record.short_code == "promo"
    ));
}

#[tokio::test]
async fn test_malicious_stored_target_blocked() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let id = resolver.registry().snapshot().get("promo").unwrap().id.clone();

    resolver.registry().update_by_id(
        &id,
        UrlPatch {
            original_url: Some("javascript:alert(1)".to_string()),
        },
    );

    let state = resolver
        .begin(Some("promo".to_string()))
        .resolve(&Visit::default())
        .await;
    assert_eq!(state, ResolveState::Blocked(BlockReason::Malicious));
    assert!(state.message().unwrap().contains("malicious"));
    assert_eq!(click_count(&resolver, "promo"), 0);
}

#[tokio::test]
async fn test_internal_stored_target_blocked() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let id = resolver.registry().snapshot().get("promo").unwrap().id.clone();

    resolver.registry().update_by_id(
        &id,
        UrlPatch {
            original_url: Some("http://127.0.0.1:8080/admin".to_string()),
        },
    );

    let state = resolver
        .begin(Some("promo".to_string()))
        .resolve(&Visit::default())
        .await;
    assert!(matches!(state, ResolveState::Blocked(_)));
    assert_eq!(click_count(&resolver, "promo"), 0);

    let internal = ResolveState::Blocked(BlockReason::InternalTarget);
    assert!(internal.message().unwrap().contains("internal"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_location_lookup_records_nothing() {
    let (resolver, _) = setup_resolver(Arc::new(SlowLocator));
    let resolver = resolver.with_location_timeout(Duration::from_secs(30));

    let attempt = resolver.begin(Some("promo".to_string()));
    let token = attempt.cancellation_token();
    let visit = Visit::default();

    let (state, _) = tokio::join!(attempt.resolve(&visit), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    assert_eq!(state, ResolveState::Resolving);
    assert_eq!(click_count(&resolver, "promo"), 0);

    // A cancelled attempt stays finished
    assert_eq!(attempt.resolve(&visit).await, ResolveState::Resolving);
    assert_eq!(click_count(&resolver, "promo"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_location_times_out_to_unknown() {
    let (resolver, _) = setup_resolver(Arc::new(SlowLocator));
    let resolver = resolver.with_location_timeout(Duration::from_millis(50));

    let state = resolver
        .begin(Some("promo".to_string()))
        .resolve(&Visit::default())
        .await;

    assert!(matches!(state, ResolveState::Redirecting { .. }));
    let record = resolver.registry().snapshot().get("promo").cloned().unwrap();
    assert_eq!(record.clicks[0].location, "Unknown Location");
}

#[tokio::test]
async fn test_coarse_location_falls_back() {
    let timeout = Duration::from_secs(1);
    assert_eq!(
        coarse_location(&RateLimitedLocator, None, timeout).await,
        "Unknown Location"
    );
    assert_eq!(
        coarse_location(&UnknownLocator, None, timeout).await,
        "Unknown Location"
    );
    assert_eq!(
        coarse_location(&FixedLocator("Paris, France".to_string()), None, timeout).await,
        "Paris, France"
    );
}

#[tokio::test(start_paused = true)]
async fn test_navigation_after_delay() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let navigator = RecordingNavigator::default();

    let attempt = resolver.begin(Some("promo".to_string()));
    let started = tokio::time::Instant::now();
    let state = attempt.run(&Visit::default(), &navigator).await;

    assert!(matches!(state, ResolveState::Redirecting { .. }));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(navigator.visited(), vec!["https://example.com/landing".to_string()]);

    // Navigation happens at most once per attempt
    assert!(!attempt.navigate(&navigator).await);
    assert_eq!(navigator.visited().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_uses_configured_delay() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let resolver = resolver.with_redirect_delay(Duration::from_secs(3));
    let navigator = RecordingNavigator::default();

    let attempt = resolver.begin(Some("promo".to_string()));
    attempt.resolve(&Visit::default()).await;

    let started = tokio::time::Instant::now();
    assert!(attempt.navigate(&navigator).await);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(navigator.visited().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_navigation() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let navigator = RecordingNavigator::default();

    let attempt = resolver.begin(Some("promo".to_string()));
    attempt.resolve(&Visit::default()).await;

    let token = attempt.cancellation_token();
    let (navigated, _) = tokio::join!(attempt.navigate(&navigator), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    assert!(!navigated);
    assert!(navigator.visited().is_empty());
    // The click was already recorded before navigation was cancelled
    assert_eq!(click_count(&resolver, "promo"), 1);
}

#[tokio::test]
async fn test_failed_attempt_never_navigates() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let navigator = RecordingNavigator::default();

    let attempt = resolver.begin(Some("nothere".to_string()));
    let state = attempt.run(&Visit::default(), &navigator).await;

    assert_eq!(state, ResolveState::NotFound(NotFoundReason::MissingOrExpired));
    assert!(navigator.visited().is_empty());
}

#[tokio::test]
async fn test_dropped_attempt_cancels_token() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));

    let attempt = resolver.begin(Some("promo".to_string()));
    let token = attempt.cancellation_token();
    assert!(!token.is_cancelled());

    drop(attempt);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_attempt_records_nothing() {
    let (resolver, _) = setup_resolver(Arc::new(UnknownLocator));
    let navigator = RecordingNavigator::default();

    let attempt = resolver.begin(Some("promo".to_string()));
    attempt.cancel();
    let state = attempt.run(&Visit::default(), &navigator).await;

    assert_eq!(state, ResolveState::Resolving);
    assert_eq!(click_count(&resolver, "promo"), 0);
    assert!(navigator.visited().is_empty());
}
