//! Short code resolution: lookup, safety checks, click recording, navigation
//!
//! Each visit to a short link is one [`ResolutionAttempt`]. It moves from
//! `Resolving` to exactly one terminal state and records at most one click,
//! however many times it is driven. The pending navigation is tied to the
//! attempt's cancellation token so tearing the attempt down stops it.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::location::{coarse_location, Locator};
use crate::model::{ClickData, ShortenedUrl, SOURCE_REDIRECT};
use crate::registry::UrlRegistry;
use crate::validation::{is_internal_host, is_valid_url};

pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    NoCode,
    MissingOrExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The stored target fails the URL safety predicate
    Malicious,
    /// The target host is loopback, private or `.local`
    InternalTarget,
}

/// Where a resolution attempt stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveState {
    Resolving,
    Redirecting { short_code: String, target: String },
    NotFound(NotFoundReason),
    Blocked(BlockReason),
    Error(String),
}

impl ResolveState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResolveState::Resolving)
    }

    /// Message shown to the visitor for failure states
    pub fn message(&self) -> Option<&str> {
        match self {
            ResolveState::Resolving | ResolveState::Redirecting { .. } => None,
            ResolveState::NotFound(NotFoundReason::NoCode) => Some("No short code provided"),
            ResolveState::NotFound(NotFoundReason::MissingOrExpired) => {
                Some("Short URL not found or has expired")
            }
            ResolveState::Blocked(BlockReason::Malicious) => Some(
                "This link appears to be invalid or potentially malicious and cannot be accessed",
            ),
            ResolveState::Blocked(BlockReason::InternalTarget) => {
                Some("Redirects to local or internal addresses are not allowed for security reasons")
            }
            ResolveState::Error(message) => Some(message.as_str()),
        }
    }
}

/// Who is visiting, as far as the click log cares
#[derive(Debug, Clone)]
pub struct Visit {
    pub source: String,
    pub user_agent: Option<String>,
    pub ip: Option<IpAddr>,
}

impl Default for Visit {
    fn default() -> Self {
        Self {
            source: SOURCE_REDIRECT.to_string(),
            user_agent: None,
            ip: None,
        }
    }
}

/// Performs the actual navigation once an attempt is redirecting
pub trait Navigator: Send + Sync {
    /// Replaces the current location so the short link leaves no history entry
    fn replace(&self, target: &str);
}

/// Shared entry point that hands out resolution attempts
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<UrlRegistry>,
    locator: Arc<dyn Locator>,
    redirect_delay: Duration,
    location_timeout: Duration,
}

impl Resolver {
    pub fn new(registry: Arc<UrlRegistry>, locator: Arc<dyn Locator>) -> Self {
        Self {
            registry,
            locator,
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
        }
    }

    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<UrlRegistry> {
        &self.registry
    }

    /// Starts a new attempt for `code`
    pub fn begin(&self, code: Option<String>) -> ResolutionAttempt {
        ResolutionAttempt {
            resolver: self.clone(),
            code,
            state: Mutex::new(ResolveState::Resolving),
            processed: AtomicBool::new(false),
            navigated: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Lookup plus both safety checks, with no await in between.
    ///
    /// `Ok` carries the live record; `Err` the terminal state to enter.
    pub fn check(&self, code: Option<&str>) -> Result<ShortenedUrl, ResolveState> {
        let Some(code) = code.filter(|code| !code.is_empty()) else {
            return Err(ResolveState::NotFound(NotFoundReason::NoCode));
        };

        info!("Processing redirect for shortcode: {}", code);

        let Some(record) = self.registry.lookup_by_code(code) else {
            warn!("Short URL not found or expired: {}", code);
            return Err(ResolveState::NotFound(NotFoundReason::MissingOrExpired));
        };

        // Stored data is re-checked, it may have been tampered with
        if !is_valid_url(&record.original_url) {
            error!("Invalid or malicious URL detected: {}", record.original_url);
            return Err(ResolveState::Blocked(BlockReason::Malicious));
        }

        match Url::parse(&record.original_url) {
            Ok(target) if is_internal_host(&target) => {
                warn!("Blocked redirect to internal/local URL: {}", record.original_url);
                Err(ResolveState::Blocked(BlockReason::InternalTarget))
            }
            Ok(_) => Ok(record),
            Err(_) => {
                error!("Failed to parse target URL: {}", record.original_url);
                Err(ResolveState::Error("Invalid URL format detected".to_string()))
            }
        }
    }
}

/// One visit to a short link
pub struct ResolutionAttempt {
    resolver: Resolver,
    code: Option<String>,
    state: Mutex<ResolveState>,
    processed: AtomicBool,
    navigated: AtomicBool,
    cancel: CancellationToken,
}

impl ResolutionAttempt {
    pub fn state(&self) -> ResolveState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_state(&self, state: ResolveState) -> ResolveState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        state
    }

    /// Tears the attempt down; pending work is dropped
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drives the attempt to a terminal state.
    ///
    /// Calling it again, concurrently or later, returns the current state and
    /// never records a second click. If the attempt is cancelled while the
    /// location lookup is in flight, no click is recorded and the state stays
    /// `Resolving`.
    pub async fn resolve(&self, visit: &Visit) -> ResolveState {
        let current = self.state();
        if current.is_terminal() || self.processed.load(Ordering::Acquire) {
            return current;
        }

        let record = match self.resolver.check(self.code.as_deref()) {
            Ok(record) => record,
            Err(terminal) => return self.set_state(terminal),
        };

        if self.processed.swap(true, Ordering::AcqRel) {
            return self.state();
        }

        let location = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Redirect for {} cancelled before the click was recorded", record.short_code);
                return self.state();
            }
            location = coarse_location(
                self.resolver.locator.as_ref(),
                visit.ip,
                self.resolver.location_timeout,
            ) => location,
        };

        let click = ClickData::new(
            self.resolver.registry.now(),
            visit.source.clone(),
            location,
            visit.user_agent.clone(),
        );
        self.resolver.registry.record_click(&record.short_code, click);

        info!("Redirecting to: {}", record.original_url);
        self.set_state(ResolveState::Redirecting {
            short_code: record.short_code,
            target: record.original_url,
        })
    }

    /// Navigates after the configured delay unless cancelled first.
    ///
    /// Returns whether navigation happened. Only the first call on a
    /// redirecting attempt can navigate.
    pub async fn navigate(&self, navigator: &dyn Navigator) -> bool {
        let ResolveState::Redirecting { target, .. } = self.state() else {
            return false;
        };
        if self.navigated.swap(true, Ordering::AcqRel) {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Navigation to {} cancelled", target);
                false
            }
            _ = tokio::time::sleep(self.resolver.redirect_delay) => {
                navigator.replace(&target);
                true
            }
        }
    }

    /// `resolve` followed by `navigate`
    pub async fn run(&self, visit: &Visit, navigator: &dyn Navigator) -> ResolveState {
        let state = self.resolve(visit).await;
        self.navigate(navigator).await;
        state
    }
}

impl Drop for ResolutionAttempt {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
