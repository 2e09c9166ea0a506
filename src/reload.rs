//! Reload coordinator.
//!
//! Timer ticks and external triggers (SIGHUP, `POST /reload`) feed one
//! serialized reload cycle. A cycle lists the source, keeps the objects
//! modified since the last successful sync, parses them as one batch and
//! merges them into the store. Triggers that arrive while a cycle runs
//! collapse into a single follow-up cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::metrics::ServerMetrics;
use crate::source::{SourceError, ZoneObject, ZoneSource};
use crate::zone::{ZoneError, ZoneLoader, ZoneStore};

/// Objects modified up to this long before the watermark are still
/// reloaded, covering clock differences between writers and the store.
pub const CLOCK_SKEW: TimeDelta = TimeDelta::seconds(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Listing,
    Fetching,
    Loading,
    Publishing,
}

impl fmt::Display for ReloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReloadState::Idle => "idle",
            ReloadState::Listing => "listing",
            ReloadState::Fetching => "fetching",
            ReloadState::Loading => "loading",
            ReloadState::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum ReloadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error("Initial load produced no zones")]
    NoZones,
}

/// Outcome of asking for a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadRequest {
    /// A cycle will start for this request
    Queued,
    /// A cycle is already pending; this request rides along with it
    Coalesced,
    /// The coordinator is gone
    Stopped,
}

/// Cheap handle for triggering reloads and watching progress
#[derive(Clone)]
pub struct ReloadHandle {
    trigger_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<ReloadState>,
}

impl ReloadHandle {
    pub fn request(&self) -> ReloadRequest {
        match self.trigger_tx.try_send(()) {
            Ok(()) => ReloadRequest::Queued,
            Err(mpsc::error::TrySendError::Full(())) => ReloadRequest::Coalesced,
            Err(mpsc::error::TrySendError::Closed(())) => ReloadRequest::Stopped,
        }
    }

    pub fn state(&self) -> ReloadState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReloadState> {
        self.state_rx.clone()
    }
}

/// Summary of one successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub listed: usize,
    pub installed: Vec<String>,
}

/// Objects a cycle has to reload: everything except the prefix placeholder
/// and objects strictly older than `watermark - skew`.
pub fn select_stale(
    catalog: &[ZoneObject],
    prefix: &str,
    watermark: DateTime<Utc>,
    skew: TimeDelta,
) -> Vec<ZoneObject> {
    let cutoff = watermark - skew;
    catalog
        .iter()
        .filter(|object| object.key != prefix)
        .filter(|object| object.last_modified >= cutoff)
        .cloned()
        .collect()
}

/// Zone name carried by an object key
pub fn zone_name_for_key<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

pub struct ReloadCoordinator {
    source: Arc<dyn ZoneSource>,
    store: Arc<ZoneStore>,
    loader: ZoneLoader,
    prefix: String,
    interval: Duration,
    watermark: DateTime<Utc>,
    state_tx: watch::Sender<ReloadState>,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl ReloadCoordinator {
    pub fn new(
        source: Arc<dyn ZoneSource>,
        store: Arc<ZoneStore>,
        prefix: impl Into<String>,
        interval: Duration,
    ) -> Self {
        // One pending slot: a full channel means a cycle is already queued
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (state_tx, _) = watch::channel(ReloadState::Idle);

        Self {
            source,
            store,
            loader: ZoneLoader::new(),
            prefix: prefix.into(),
            interval,
            watermark: DateTime::UNIX_EPOCH,
            state_tx,
            trigger_tx,
            trigger_rx,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_loader(mut self, loader: ZoneLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn handle(&self) -> ReloadHandle {
        ReloadHandle {
            trigger_tx: self.trigger_tx.clone(),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Time of the last successful sync; objects older than this (minus
    /// skew) are skipped by the next cycle.
    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    fn set_state(&self, state: ReloadState) {
        debug!("Reload state -> {}", state);
        self.state_tx.send_replace(state);
    }

    /// Load the whole catalog. Serving must not start before this succeeds.
    pub async fn initial_load(&mut self) -> Result<CycleReport, ReloadError> {
        self.watermark = DateTime::UNIX_EPOCH;
        let report = self.run_cycle().await?;
        if self.store.zone_count() == 0 {
            return Err(ReloadError::NoZones);
        }
        Ok(report)
    }

    /// Run one reload cycle. On failure nothing is merged and the watermark
    /// stays where it was.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ReloadError> {
        let started_at = Utc::now();
        let result = self.cycle(started_at).await;
        self.set_state(ReloadState::Idle);

        match &result {
            Ok(report) => {
                self.watermark = started_at;
                info!(
                    "Reload from {}: listed {}, reloaded {} zone(s), serving {}",
                    self.source.describe(),
                    report.listed,
                    report.installed.len(),
                    self.store.zone_count()
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_reload_success(report.installed.len(), self.store.zone_count());
                }
            }
            Err(e) => {
                error!("Reload from {} failed: {}", self.source.describe(), e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_reload_failure();
                }
            }
        }
        result
    }

    async fn cycle(&self, started_at: DateTime<Utc>) -> Result<CycleReport, ReloadError> {
        self.set_state(ReloadState::Listing);
        let catalog = self.source.list_objects(&self.prefix).await?;
        let stale = select_stale(&catalog, &self.prefix, self.watermark, CLOCK_SKEW);
        debug!(
            "{} of {} objects changed since {}",
            stale.len(),
            catalog.len(),
            self.watermark
        );

        self.set_state(ReloadState::Fetching);
        let mut fetched = Vec::with_capacity(stale.len());
        for object in &stale {
            let content = self.source.get_object(&object.key).await?;
            let zone_name = zone_name_for_key(&object.key, &self.prefix);
            debug!("Fetched {} ({} bytes) for zone {}", object.key, content.len(), zone_name);
            fetched.push((zone_name.to_string(), content));
        }

        self.set_state(ReloadState::Loading);
        let zones = self.loader.load_batch(fetched)?;

        self.set_state(ReloadState::Publishing);
        let mut installed: Vec<String> = zones.keys().cloned().collect();
        installed.sort();
        self.store.merge(zones, started_at);

        Ok(CycleReport {
            started_at,
            listed: catalog.len(),
            installed,
        })
    }

    /// Serve reload requests until a cycle fails.
    ///
    /// The timer restarts after every cycle, so a triggered reload pushes
    /// the next timed one back by a full interval.
    pub async fn run(mut self) -> Result<(), ReloadError> {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    debug!("Reload timer fired");
                }
                Some(()) = self.trigger_rx.recv() => {
                    debug!("Reload requested");
                }
            }
            self.run_cycle().await?;
        }
    }
}
