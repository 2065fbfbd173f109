//! Scrape coordinator - main orchestration logic
//!
//! This module contains the run loop that ties the pieces together:
//! - Restoring crawl state from the recovery file and the record store
//! - Authenticating the session
//! - Feeding identifiers from discovery (or an explicit list) to the downloader
//! - Retrying, saving and accounting for each record
//! - Checkpointing and handling interruption

use crate::config::{Config, RunMode};
use crate::crawler::{Extractor, HttpSession, PageExtractor, Session};
use crate::discovery::DiscoveryClient;
use crate::output::CrawlStats;
use crate::record::{Record, RecordId};
use crate::state::{CrawlState, StateTracker};
use crate::storage::RecordStore;
use crate::CrawlError;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared between the discovery producer and the download consumer
struct Shared {
    tracker: StateTracker,
    stats: CrawlStats,
}

/// Locks the shared state, recovering it if a holder panicked
fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Final outcome of downloading one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The record was written; `replaced` if a file already existed
    Saved { replaced: bool },
    Failed,
}

/// Main scrape coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    session: Box<dyn Session>,
    extractor: Box<dyn Extractor>,
    store: RecordStore,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Creates the output directory, loads the recovery file and merges it
    /// with a scan of the records already on disk.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated run configuration
    /// * `session` - Session used for login, discovery bootstrap and downloads
    /// * `extractor` - Turns record pages into records
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - The output directory is unusable
    pub fn new(
        config: Config,
        session: Box<dyn Session>,
        extractor: Box<dyn Extractor>,
    ) -> Result<Self, CrawlError> {
        let store = RecordStore::new(&config.output.directory);
        std::fs::create_dir_all(store.root())?;

        let mut tracker = StateTracker::load(config.state_file(), store.clone());
        let report = store.scan_existing()?;
        tracker.merge_scan(&report);

        tracing::info!(
            "Output {}: {} complete, {} pending, {} failed",
            store.root().display(),
            tracker.completed_count(),
            tracker.pending_count(),
            tracker.failed_count()
        );

        Ok(Self {
            config: Arc::new(config),
            session,
            extractor,
            store,
            shared: Arc::new(Mutex::new(Shared {
                tracker,
                stats: CrawlStats::default(),
            })),
            cancel: CancellationToken::new(),
        })
    }

    /// Replaces the cancellation token (e.g. one wired to signal handlers)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Copy of the current crawl state
    pub fn state(&self) -> CrawlState {
        lock(&self.shared).tracker.state().clone()
    }

    /// Copy of the current statistics
    pub fn stats(&self) -> CrawlStats {
        lock(&self.shared).stats.clone()
    }

    /// Runs the scrape
    ///
    /// 1. Logs in (failure aborts the run)
    /// 2. Downloads the explicit identifiers, or discovers and downloads
    /// 3. Logs out, whatever happened in step 2
    /// 4. Saves the state, deleting the recovery file after a clean full run
    pub async fn run(&mut self) -> Result<CrawlStats, CrawlError> {
        tracing::info!(
            "Starting scrape (mode: {}, locale: {})",
            self.config.run.mode,
            self.config.site.locale
        );

        let login_error = match self.session.login().await {
            Ok(true) => None,
            Ok(false) => Some("credentials were not accepted".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = login_error {
            self.logout().await;
            return Err(CrawlError::Authentication(reason));
        }

        let result = self.process().await;
        self.logout().await;

        match result {
            Ok(()) => Ok(self.finish()),
            Err(e) => {
                self.checkpoint();
                Err(e)
            }
        }
    }

    /// Logs out, reporting errors at debug level
    async fn logout(&mut self) {
        if let Err(e) = self.session.logout().await {
            tracing::debug!("Logout failed: {}", e);
        }
    }

    async fn process(&mut self) -> Result<(), CrawlError> {
        if !self.config.run.recipe_ids.is_empty() {
            let ids = self.explicit_ids();
            tracing::info!("Downloading {} explicitly requested records", ids.len());

            let mut processed = 0;
            for id in ids {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.process_id(&id, &mut processed).await;
            }
            return Ok(());
        }

        let discovery = DiscoveryClient::initialize(&self.config, self.session.as_mut())
            .await
            .map_err(CrawlError::Configuration)?;

        let (tx, rx) = mpsc::channel(self.config.timing.queue_capacity.max(1));
        let mode = self.config.run.mode;

        let resume_ids = {
            let shared = lock(&self.shared);
            if mode == RunMode::Continue {
                shared.tracker.pending_ids()
            } else {
                Vec::new()
            }
        };

        let producer: JoinHandle<()> = if resume_ids.is_empty() {
            tracing::info!("Starting discovery");
            tokio::spawn(produce(
                discovery,
                Arc::clone(&self.shared),
                mode,
                tx,
                self.cancel.clone(),
            ))
        } else {
            tracing::info!(
                "Resuming {} pending records from previous run",
                resume_ids.len()
            );
            lock(&self.shared).stats.discovered += resume_ids.len() as u64;
            tokio::spawn(seed(resume_ids, tx, self.cancel.clone()))
        };

        self.consume(rx).await;

        if let Err(e) = producer.await {
            tracing::warn!("Discovery task ended abnormally: {}", e);
        }
        Ok(())
    }

    /// Normalizes, de-duplicates and filters the explicit identifier list
    fn explicit_ids(&self) -> Vec<String> {
        let mode = self.config.run.mode;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut shared = lock(&self.shared);

        for raw in &self.config.run.recipe_ids {
            let id = match RecordId::parse(raw) {
                Ok(id) => id.into_inner(),
                Err(e) => {
                    tracing::warn!("Ignoring recipe id {:?}: {}", raw, e);
                    shared.stats.skipped += 1;
                    continue;
                }
            };

            if !seen.insert(id.clone()) {
                continue;
            }

            shared.stats.discovered += 1;
            shared.tracker.mark_discovered(&id);
            if shared.tracker.should_fetch(&id, mode) {
                shared.tracker.mark_pending(&id);
                ids.push(id);
            } else {
                tracing::debug!("Skipping {} (mode {})", id, mode);
                shared.stats.skipped += 1;
            }
        }

        ids
    }

    /// Drains the queue until the producer is done or the run is cancelled
    async fn consume(&mut self, mut rx: mpsc::Receiver<String>) {
        let cancel = self.cancel.clone();
        let mut processed = 0;

        loop {
            let id = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Interrupted, stopping downloads");
                    break;
                }
                next = rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            self.process_id(&id, &mut processed).await;
        }
    }

    /// Downloads one record and records the outcome
    async fn process_id(&mut self, id: &str, processed: &mut u64) {
        let outcome = self.download_record(id).await;

        {
            let mut shared = lock(&self.shared);
            match outcome {
                Outcome::Saved { replaced } => {
                    shared.tracker.mark_completed(id);
                    if replaced {
                        shared.stats.updated += 1;
                    } else {
                        shared.stats.downloaded += 1;
                    }
                }
                Outcome::Failed => {
                    shared.tracker.mark_failed(id);
                    shared.stats.failures += 1;
                }
            }
        }

        *processed += 1;
        if *processed % u64::from(self.config.timing.save_interval.max(1)) == 0 {
            self.checkpoint();
            let shared = lock(&self.shared);
            tracing::info!(
                "Progress: {} processed ({}), {} pending",
                processed,
                shared.stats,
                shared.tracker.pending_count()
            );
        }
    }

    /// Fetches, extracts and saves a record with retries
    ///
    /// # Retry Logic
    ///
    /// | Attempt result | Not last attempt | Last attempt |
    /// |----------------|------------------|--------------|
    /// | Complete record | save | save |
    /// | Incomplete record | retry | save with warning |
    /// | Fetch/extract/save error | retry | failure |
    async fn download_record(&mut self, id: &str) -> Outcome {
        let url = self.config.record_url(id);
        let replaced = self.store.exists(id);
        let attempts = self.config.timing.max_retries + 1;

        for attempt in 1..=attempts {
            let last = attempt == attempts;

            match self.attempt(id, &url).await {
                Ok(record) if record.is_complete() || last => {
                    if !record.is_complete() {
                        tracing::warn!(
                            "Record {} still has no ingredients or steps after {} attempts, saving anyway",
                            id,
                            attempts
                        );
                    }

                    match self.store.save(&record) {
                        Ok(path) => {
                            tracing::debug!("Saved {} to {}", id, path.display());
                            sleep(self.config.timing.download_delay()).await;
                            return Outcome::Saved { replaced };
                        }
                        Err(e) => tracing::warn!(
                            "Attempt {}/{} for {} failed: {}",
                            attempt,
                            attempts,
                            id,
                            e
                        ),
                    }
                }
                Ok(_) => tracing::debug!(
                    "Record {} incomplete (attempt {}/{}), retrying",
                    id,
                    attempt,
                    attempts
                ),
                Err(e) => tracing::warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, id, e),
            }

            if !last {
                sleep(self.config.timing.retry_delay()).await;
            }
        }

        tracing::error!("Failed to download {} after {} attempts", id, attempts);
        Outcome::Failed
    }

    async fn attempt(&mut self, id: &str, url: &str) -> Result<Record, CrawlError> {
        let page = self.session.fetch_page(url).await?;
        let source_url = self.session.current_url().unwrap_or_else(|| url.to_string());
        let record = self.extractor.extract(&page, id, Some(&source_url))?;
        Ok(record)
    }

    /// Writes the recovery file; failures are logged and the run continues
    fn checkpoint(&self) {
        let (snapshot, path) = {
            let mut shared = lock(&self.shared);
            (shared.tracker.snapshot(), shared.tracker.path().to_path_buf())
        };

        if let Err(e) = snapshot.save(&path) {
            tracing::warn!("Failed to save state: {}", e);
        }
    }

    /// Final save, and removal of the recovery file after a clean full run
    fn finish(&mut self) -> CrawlStats {
        let interrupted = self.cancel.is_cancelled();

        let (stats, pending, failed) = {
            let mut shared = lock(&self.shared);
            shared.stats.interrupted = interrupted;
            (
                shared.stats.clone(),
                shared.tracker.pending_count(),
                shared.tracker.failed_count(),
            )
        };

        self.checkpoint();

        // Failed identifiers from earlier runs keep the file alive too
        if pending == 0 && failed == 0 && !interrupted {
            let shared = lock(&self.shared);
            if let Err(e) = shared.tracker.clear() {
                tracing::warn!("Failed to remove state file: {}", e);
            }
        } else {
            tracing::info!(
                "State saved to {} ({} pending, {} failed)",
                self.config.state_file().display(),
                pending,
                failed
            );
        }

        tracing::info!("Scrape finished: {}", stats);
        stats
    }
}

/// Discovery producer
///
/// Applies the run-mode policy before enqueueing; skipped identifiers never
/// reach the queue. Dropping `tx` on return closes the queue.
async fn produce(
    discovery: DiscoveryClient,
    shared: Arc<Mutex<Shared>>,
    mode: RunMode,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let counter = discovery.query_counter();
    let stream = discovery.discover_all();
    futures::pin_mut!(stream);

    let mut enqueued = 0u64;
    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(raw) => raw,
                None => break,
            },
        };

        let id = match RecordId::parse(&raw) {
            Ok(id) => id.into_inner(),
            Err(e) => {
                tracing::warn!("Ignoring search hit: {}", e);
                lock(&shared).stats.skipped += 1;
                continue;
            }
        };

        let fetch = {
            let mut shared = lock(&shared);
            shared.stats.discovered += 1;
            shared.tracker.mark_discovered(&id);
            if shared.tracker.should_fetch(&id, mode) {
                shared.tracker.mark_pending(&id);
                true
            } else {
                shared.stats.skipped += 1;
                false
            }
        };
        if !fetch {
            continue;
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            result = tx.send(id) => result.is_ok(),
        };
        if !sent {
            break;
        }
        enqueued += 1;
    }

    let queried = counter.load(Ordering::Relaxed) as u64;
    let discovered = {
        let mut shared = lock(&shared);
        shared.stats.prefixes_queried = queried;
        shared.stats.discovered
    };
    tracing::info!(
        "Discovery finished: {} identifiers, {} queued, {} prefixes queried",
        discovered,
        enqueued,
        queried
    );
}

/// Queues identifiers left pending by a previous run
async fn seed(ids: Vec<String>, tx: mpsc::Sender<String>, cancel: CancellationToken) {
    for raw in ids {
        let id = match RecordId::parse(&raw) {
            Ok(id) => id.into_inner(),
            Err(e) => {
                tracing::warn!("Ignoring pending identifier: {}", e);
                continue;
            }
        };
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            result = tx.send(id) => result.is_ok(),
        };
        if !sent {
            break;
        }
    }
}

async fn sleep(duration: std::time::Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Runs a complete scrape with the HTTP session and page extractor
///
/// # Arguments
///
/// * `config` - The validated run configuration
/// * `cancel` - Token that interrupts the run
pub async fn run_scrape(
    config: Config,
    cancel: CancellationToken,
) -> Result<CrawlStats, CrawlError> {
    let session = HttpSession::new(&config)?;
    let mut coordinator = Coordinator::new(config, Box::new(session), Box::new(PageExtractor))?
        .with_cancellation(cancel);
    coordinator.run().await
}
