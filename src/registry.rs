//! The authoritative collection of shortened URLs
//!
//! State is held as an immutable [`Snapshot`] in an [`ArcSwap`], so readers
//! never block. Every mutation builds a complete new collection from the
//! current one and swaps it in under a writer lock, so
//! a refresh tick and a concurrent add can never leave a half-applied state:
//! the last swap fully defines what readers see. After each swap the whole
//! collection is written to [`Storage`]; a failed write is logged and the
//! in-memory state stays authoritative.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::database::Storage;
use crate::error::ShortenError;
use crate::model::{
    ClickData, ClickEntry, ShortenedUrl, StorageData, UrlFormData, UrlPatch, UrlStats,
    ValidationError,
};
use crate::shortcode::{generate_id, generate_unique, DEFAULT_CODE_LENGTH};
use crate::validation::{is_valid_validity_period, validate_form_batch};

pub const DEFAULT_VALIDITY_MINUTES: u32 = 30;

/// Second click on the same code inside this window is dropped
pub const CLICK_DEBOUNCE_MS: i64 = 1000;

pub const DEFAULT_MAX_BATCH: usize = 5;

const TOP_URLS: usize = 5;

/// An immutable view of the collection with a code index
#[derive(Debug, Default)]
pub struct Snapshot {
    urls: Vec<ShortenedUrl>,
    by_code: HashMap<String, usize>,
}

impl Snapshot {
    fn new(urls: Vec<ShortenedUrl>) -> Self {
        let by_code = urls
            .iter()
            .enumerate()
            .map(|(pos, url)| (url.short_code.clone(), pos))
            .collect();
        Self { urls, by_code }
    }

    /// Records in insertion order
    pub fn urls(&self) -> &[ShortenedUrl] {
        &self.urls
    }

    /// O(1) lookup by short code, expired or not
    pub fn get(&self, code: &str) -> Option<&ShortenedUrl> {
        self.by_code.get(code).map(|&pos| &self.urls[pos])
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Turns a batch of form entries into new records.
///
/// Custom codes must be free among `existing` and among the codes handed out
/// earlier in the same batch; the first collision aborts the whole batch.
/// Entries without a custom code get a generated one. A missing or zero
/// validity period means [`DEFAULT_VALIDITY_MINUTES`].
pub fn create_from_form(
    entries: &[UrlFormData],
    existing: &[ShortenedUrl],
    base_url: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ShortenedUrl>, ShortenError> {
    let mut taken: HashSet<String> = existing.iter().map(|url| url.short_code.clone()).collect();
    let mut created = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let validity_period = resolve_validity_period(entry.validity_period).ok_or_else(|| {
            ShortenError::Validation(vec![ValidationError::new(
                format!("url_{}_validityPeriod", index),
                "Validity period must be between 1 and 10080 minutes (7 days)",
            )])
        })?;

        let custom = entry
            .custom_short_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .map(str::to_string);

        let short_code = match &custom {
            Some(code) if taken.contains(code) => {
                warn!("Shortcode \"{}\" is already in use", code);
                return Err(ShortenError::Collision(code.clone()));
            }
            Some(code) => code.clone(),
            None => generate_unique(&taken, DEFAULT_CODE_LENGTH),
        };
        taken.insert(short_code.clone());

        let record = ShortenedUrl::new(
            generate_id(now),
            entry.original_url.clone(),
            short_code,
            base_url,
            now,
            validity_period,
            custom,
        );
        info!("Created shortened URL: {} -> {}", record.short_code, record.original_url);
        created.push(record);
    }

    Ok(created)
}

fn resolve_validity_period(requested: Option<i64>) -> Option<u32> {
    match requested {
        None | Some(0) => Some(DEFAULT_VALIDITY_MINUTES),
        Some(minutes) if is_valid_validity_period(minutes) => u32::try_from(minutes).ok(),
        Some(_) => None,
    }
}

/// Restores the derived fields of records read back from storage.
///
/// `click_count` follows the click history and `expires_at` follows
/// `created_at + validity_period`, whatever the stored values say.
fn normalize_loaded(urls: Vec<ShortenedUrl>, now: DateTime<Utc>) -> Vec<ShortenedUrl> {
    urls.into_iter()
        .map(|mut url| {
            url.click_count = url.clicks.len() as u64;
            url.expires_at = url.created_at + Duration::minutes(i64::from(url.validity_period));
            url.is_expired = url.is_expired_at(now);
            url
        })
        .collect()
}

fn with_expiration_status(urls: &[ShortenedUrl], now: DateTime<Utc>) -> Vec<ShortenedUrl> {
    urls.iter()
        .cloned()
        .map(|mut url| {
            url.is_expired = url.is_expired_at(now);
            url
        })
        .collect()
}

enum ClickRejected {
    UnknownCode,
    Duplicate,
}

/// Registry of shortened URLs for one application session
///
/// Construct it once at startup and hand it around behind an `Arc`.
pub struct UrlRegistry {
    state: ArcSwap<Snapshot>,
    // Serializes writers so apply, swap and save happen in one order
    writer: Mutex<()>,
    recent_clicks: Mutex<HashMap<String, DateTime<Utc>>>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    base_url: String,
    max_batch: usize,
}

impl UrlRegistry {
    /// Loads the persisted collection and refreshes its expiration flags.
    ///
    /// Missing or unreadable storage yields an empty registry.
    pub fn open(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, base_url: impl Into<String>) -> Self {
        let urls = match storage.load() {
            Ok(Some(data)) => {
                debug!("Loaded {} URLs from storage", data.urls.len());
                data.urls
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                error!("Failed to load from storage: {}", e);
                Vec::new()
            }
        };
        let urls = normalize_loaded(urls, clock.now());

        Self {
            state: ArcSwap::from_pointee(Snapshot::new(urls)),
            writer: Mutex::new(()),
            recent_clicks: Mutex::new(HashMap::new()),
            storage,
            clock,
            base_url: base_url.into(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The current collection; later mutations do not affect it
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.load_full()
    }

    pub fn urls(&self) -> Vec<ShortenedUrl> {
        self.snapshot().urls().to_vec()
    }

    pub fn find_by_id(&self, id: &str) -> Option<ShortenedUrl> {
        self.snapshot().urls().iter().find(|url| url.id == id).cloned()
    }

    /// Appends records whose codes the caller already made unique
    pub fn add_batch(&self, new_urls: Vec<ShortenedUrl>) {
        info!("Adding {} new URLs", new_urls.len());
        self.commit(|urls| urls.iter().cloned().chain(new_urls).collect());
    }

    /// Validates, creates and stores a batch of form entries.
    ///
    /// Validation reports every bad field at once. Creation runs under the
    /// write lock against the current collection, so two concurrent batches
    /// cannot hand out the same code.
    pub fn shorten(&self, entries: &[UrlFormData]) -> Result<Vec<ShortenedUrl>, ShortenError> {
        let errors = validate_form_batch(entries, self.max_batch);
        if !errors.is_empty() {
            return Err(ShortenError::Validation(errors));
        }

        info!("Creating {} shortened URLs", entries.len());
        let now = self.clock.now();
        let mut created = Vec::new();
        self.try_commit::<ShortenError>(|urls| {
            created = create_from_form(entries, urls, &self.base_url, now)?;
            Ok(urls.iter().chain(created.iter()).cloned().collect())
        })?;

        Ok(created)
    }

    /// Applies `patch` to the record with `id`; `None` if there is no such record
    pub fn update_by_id(&self, id: &str, patch: UrlPatch) -> Option<ShortenedUrl> {
        self.find_by_id(id)?;

        debug!("Updating URL {}", id);
        let snapshot = self.commit(|urls| {
            urls.iter()
                .cloned()
                .map(|mut url| {
                    if url.id == id {
                        if let Some(original_url) = &patch.original_url {
                            url.original_url = original_url.clone();
                        }
                    }
                    url
                })
                .collect()
        });

        snapshot.urls().iter().find(|url| url.id == id).cloned()
    }

    /// Deletes the record with `id`, returning whether it existed
    pub fn remove_by_id(&self, id: &str) -> bool {
        if self.find_by_id(id).is_none() {
            return false;
        }

        info!("Removing URL {}", id);
        self.commit(|urls| urls.iter().filter(|url| url.id != id).cloned().collect());
        true
    }

    /// Live record for `code`; expired records are invisible here
    pub fn lookup_by_code(&self, code: &str) -> Option<ShortenedUrl> {
        let now = self.clock.now();
        self.snapshot()
            .get(code)
            .filter(|url| !url.is_expired && !url.is_expired_at(now))
            .cloned()
    }

    /// Appends a click to the record for `code`.
    ///
    /// Returns false when the code is unknown or when the same code was
    /// clicked less than [`CLICK_DEBOUNCE_MS`] ago. The existence check, the
    /// debounce slot and the append happen under the writer lock, so a click
    /// that is not recorded never takes the slot.
    pub fn record_click(&self, code: &str, click: ClickData) -> bool {
        let now = self.clock.now();
        let window = Duration::milliseconds(CLICK_DEBOUNCE_MS);

        let outcome = self.try_commit(|urls| {
            if !urls.iter().any(|url| url.short_code == code) {
                return Err(ClickRejected::UnknownCode);
            }

            let mut recent = self.recent_clicks.lock().unwrap_or_else(PoisonError::into_inner);
            recent.retain(|_, at| now.signed_duration_since(*at) < window);
            if recent.contains_key(code) {
                return Err(ClickRejected::Duplicate);
            }
            recent.insert(code.to_string(), now);

            Ok(urls
                .iter()
                .cloned()
                .map(|mut url| {
                    if url.short_code == code {
                        url.push_click(click.clone());
                    }
                    url
                })
                .collect())
        });

        match outcome {
            Ok(_) => {
                info!("Incremented click count for {}", code);
                true
            }
            Err(ClickRejected::UnknownCode) => {
                debug!("Click for unknown shortcode {} ignored", code);
                false
            }
            Err(ClickRejected::Duplicate) => {
                debug!("Duplicate click detected for {}, ignoring", code);
                false
            }
        }
    }

    /// Removes every record flagged as expired, returning how many went
    pub fn sweep_expired(&self) -> usize {
        let expired = self.snapshot().urls().iter().filter(|url| url.is_expired).count();
        if expired == 0 {
            return 0;
        }

        info!("Clearing {} expired URLs", expired);
        let mut removed = 0;
        self.commit(|urls| {
            let kept: Vec<ShortenedUrl> = urls.iter().filter(|url| !url.is_expired).cloned().collect();
            removed = urls.len() - kept.len();
            kept
        });
        removed
    }

    /// Recomputes `is_expired` for every record against the clock.
    ///
    /// Returns the number of expired records afterwards. Nothing is written
    /// when no flag changed.
    pub fn refresh_expiration_status(&self) -> usize {
        let now = self.clock.now();
        let current = self.snapshot();
        let stale = current.urls().iter().any(|url| url.is_expired != url.is_expired_at(now));

        let snapshot = if stale {
            self.commit(|urls| with_expiration_status(urls, now))
        } else {
            current
        };
        snapshot.urls().iter().filter(|url| url.is_expired).count()
    }

    pub fn stats(&self) -> UrlStats {
        let snapshot = self.snapshot();
        let urls = snapshot.urls();

        let mut top_urls: Vec<ShortenedUrl> =
            urls.iter().filter(|url| url.click_count > 0).cloned().collect();
        top_urls.sort_by(|a, b| b.click_count.cmp(&a.click_count));
        top_urls.truncate(TOP_URLS);

        let expired_urls = urls.iter().filter(|url| url.is_expired).count();
        UrlStats {
            total_urls: urls.len(),
            total_clicks: urls.iter().map(|url| url.click_count).sum(),
            active_urls: urls.len() - expired_urls,
            expired_urls,
            top_urls,
        }
    }

    /// Newest clicks across all records, at most `limit`
    pub fn recent_clicks(&self, limit: usize) -> Vec<ClickEntry> {
        let snapshot = self.snapshot();
        let mut clicks: Vec<ClickEntry> = snapshot
            .urls()
            .iter()
            .flat_map(|url| {
                url.clicks.iter().map(|click| ClickEntry {
                    short_code: url.short_code.clone(),
                    original_url: url.original_url.clone(),
                    click: click.clone(),
                })
            })
            .collect();
        clicks.sort_by(|a, b| b.click.timestamp.cmp(&a.click.timestamp));
        clicks.truncate(limit);
        clicks
    }

    fn commit(&self, apply: impl FnOnce(&[ShortenedUrl]) -> Vec<ShortenedUrl>) -> Arc<Snapshot> {
        match self.try_commit::<Infallible>(|urls| Ok(apply(urls))) {
            Ok(snapshot) => snapshot,
            Err(never) => match never {},
        }
    }

    fn try_commit<E>(
        &self,
        apply: impl FnOnce(&[ShortenedUrl]) -> Result<Vec<ShortenedUrl>, E>,
    ) -> Result<Arc<Snapshot>, E> {
        // Held across the save so storage sees writes in swap order
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.state.load_full();
        let next = Arc::new(Snapshot::new(apply(current.urls())?));
        self.state.store(Arc::clone(&next));
        self.persist(next.urls());
        Ok(next)
    }

    fn persist(&self, urls: &[ShortenedUrl]) {
        let data = StorageData {
            urls: urls.to_vec(),
            last_updated: self.clock.now(),
        };
        match self.storage.save(&data) {
            Ok(()) => debug!("Saved {} URLs to storage", urls.len()),
            Err(e) => error!("Failed to save to storage: {}", e),
        }
    }
}

/// Keeps the cached expiration flags current.
///
/// Runs [`UrlRegistry::refresh_expiration_status`] every `every` until
/// `shutdown` is cancelled. The first refresh happens one period after start.
pub fn spawn_expiration_refresher(
    registry: Arc<UrlRegistry>,
    every: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(std::time::Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Expiration refresher stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = registry.refresh_expiration_status();
                    debug!("Expiration status refreshed, {} expired", expired);
                }
            }
        }
    })
}
