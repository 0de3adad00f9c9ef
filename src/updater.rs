//! Batch orchestration and scheduling.
//!
//! # Architecture
//!
//! The [`Updater`] owns the per-source state and drives one batch at a time:
//! 1. Probe RIPE, then every external list (a failing probe counts as "no change")
//! 2. If anything changed, rebuild the whole blob and publish it to the [`CacheStore`]
//! 3. Record the batch time and report the status line, changed or not
//!
//! [`Updater::run`] executes a first batch right away, then one per tick,
//! until the shutdown token is cancelled. A batch is awaited inside the loop
//! body, so batches never overlap and an in-flight batch always completes.
//!
//! # Example
//!
//! ```ignore
//! use btblocklist::{CacheStore, Updater, UpdaterConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = UpdaterConfig::load("btblocklist.yml")?;
//! let cache = Arc::new(CacheStore::new());
//! let updater = Updater::from_config(&config, Arc::clone(&cache))?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(updater.run(shutdown.clone()));
//! ```

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::compiler;
use crate::config::{UpdaterConfig, DEFAULT_FREQUENCY_SECS};
use crate::error::Result;
use crate::external::ExternalFetcher;
use crate::probe::{ListProbe, ProbeOutcome, RangeProbe};
use crate::ripe::RipeSearch;
use crate::state::{BatchCounters, StateStore};
use crate::status::{format_status, FileStatus, LogStatus, StatusSink};

/// Shortest interval between batches; `tokio::time::interval` rejects zero.
const MIN_FREQUENCY: Duration = Duration::from_millis(1);

/// What a single batch did.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// When the batch started
    pub started: DateTime<Utc>,
    /// At least one probe returned new lines
    pub changed: bool,
    /// A new blob was published
    pub published: bool,
    /// Counters computed from the state after probing
    pub counters: BatchCounters,
    /// Status line handed to the sink
    pub status: String,
}

/// Periodic refresh driver.
pub struct Updater {
    ripe: Arc<dyn RangeProbe>,
    lists: Arc<dyn ListProbe>,
    /// External list name -> location, probed in name order
    locations: BTreeMap<String, String>,
    state: StateStore,
    cache: Arc<CacheStore>,
    status: Arc<dyn StatusSink>,
    frequency: Duration,
}

impl Updater {
    /// Create an updater over the given probes.
    ///
    /// Status lines go to the log until [`Updater::with_status`] is used.
    pub fn new(
        ripe: Arc<dyn RangeProbe>,
        lists: Arc<dyn ListProbe>,
        locations: BTreeMap<String, String>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let state = StateStore::new(locations.keys().cloned());
        Self {
            ripe,
            lists,
            locations,
            state,
            cache,
            status: Arc::new(LogStatus),
            frequency: Duration::from_secs(DEFAULT_FREQUENCY_SECS),
        }
    }

    /// Build the RIPE and HTTP/file probes described by `config`.
    pub fn from_config(config: &UpdaterConfig, cache: Arc<CacheStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;
        let ripe =
            RipeSearch::with_client(client.clone(), &config.ripe.base_url, &config.ripe.search);
        let lists = ExternalFetcher::with_client(client);

        let status: Arc<dyn StatusSink> = match config.status_file {
            Some(ref path) => Arc::new(FileStatus::new(path)),
            None => Arc::new(LogStatus),
        };

        Ok(Self::new(
            Arc::new(ripe),
            Arc::new(lists),
            config.blocklists.clone(),
            cache,
        )
        .with_status(status)
        .with_frequency(config.frequency()))
    }

    /// Set the status sink.
    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    /// Set the interval between batches, at least one millisecond.
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency.max(MIN_FREQUENCY);
        self
    }

    /// Interval between batches.
    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    /// Shared handle on the published blob.
    pub fn cache(&self) -> Arc<CacheStore> {
        Arc::clone(&self.cache)
    }

    /// Current per-source lines.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run batches until `shutdown` is cancelled.
    ///
    /// The first batch starts immediately. Ticks that fire while a batch is
    /// running are coalesced into one batch started right after it.
    pub async fn run(mut self, shutdown: CancellationToken) {
        log::info!(
            "[Updater] starting: {} external list(s), refresh every {:?}",
            self.locations.len(),
            self.frequency
        );

        let mut interval = tokio::time::interval(self.frequency);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        self.run_batch().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    log::debug!("[Updater] worker received stop signal");
                    break;
                }

                _ = interval.tick() => {
                    self.run_batch().await;
                }
            }
        }
    }

    /// Probe every source and publish a new blob if anything changed.
    pub async fn run_batch(&mut self) -> BatchReport {
        log::debug!("[Updater] worker: starting a new batch");
        let started = Utc::now();

        let mut changed = self.probe_ripe().await;
        for (name, location) in &self.locations {
            match self.lists.probe(name, location).await {
                Ok(ProbeOutcome::Updated(lines)) => {
                    self.state.replace_external(name, lines);
                    changed = true;
                }
                Ok(ProbeOutcome::Unchanged) => {}
                Err(e) => log::warn!("[Updater] keeping previous '{}' list: {}", name, e),
            }
        }

        let published = if changed {
            self.compile_and_publish(started)
        } else {
            log::info!("[Updater] No new data, keeping cache");
            false
        };

        self.cache.record_batch(started);
        let counters = self.state.counters();
        let snapshot = self.cache.snapshot();
        let status = format_status(&counters, snapshot.last_modification, snapshot.last_batch);
        if let Err(e) = self.status.report_status(&status) {
            log::error!("[Updater] can't update status msg: {}", e);
        }

        BatchReport {
            started,
            changed,
            published,
            counters,
            status,
        }
    }

    async fn probe_ripe(&mut self) -> bool {
        match self.ripe.probe().await {
            Ok(ProbeOutcome::Updated(lines)) => {
                self.state.replace_ripe(lines);
                true
            }
            Ok(ProbeOutcome::Unchanged) => false,
            Err(e) => {
                log::warn!("[Updater] keeping previous RIPE ranges: {}", e);
                false
            }
        }
    }

    /// Returns `true` if a new blob was published.
    fn compile_and_publish(&self, started: DateTime<Utc>) -> bool {
        let blob = match compiler::compile(&self.state) {
            Ok(blob) => blob,
            Err(e) => {
                log::error!("[Updater] {}, keeping previous cache", e);
                return false;
            }
        };
        match self.cache.publish(blob.data, started) {
            Ok(()) => {
                log::debug!("[Updater] global cache updated");
                true
            }
            Err(e) => {
                log::error!("[Updater] can't publish: {}, keeping previous cache", e);
                false
            }
        }
    }
}
