//! In-memory observation store for PWS telemetry.
//!
//! The store is a bounded, time-ordered ring of raw samples, newest first.
//! It is the single piece of shared mutable telemetry state in the service:
//! request handlers ingest into it concurrently, the aggregator reads
//! snapshots of it, and a periodic worker snapshots it to disk.
//!
//! Readers take copy-on-write snapshots: `snapshot` clones the inner `Arc`,
//! ingest mutates through `Arc::make_mut`, so a snapshot taken before an
//! ingest never observes the mutation. All state transitions (the prepend,
//! the rain-counter update, trim) happen inside the write lock.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Observations older than this are trimmed from the store (8 days).
pub const RETENTION_SECS: i64 = 8 * 86_400;

/// File name of the persisted sample array inside the persistence directory.
pub const OBSERVATIONS_FILE: &str = "observations.json";

/// A single ingested PWS sample. Any sensor field may be absent; stations
/// report `-9999.0` for missing sensors and the ingest path maps that to
/// `None` before the sample reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Epoch seconds, UTC.
    pub timestamp: i64,
    pub temp_f: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_mph: Option<f64>,
    pub solar_kwh_m2_day: Option<f64>,
    /// Running daily total as reported by the station; resets at the
    /// station's local midnight or on power-cycle.
    pub daily_rain_in: Option<f64>,
    /// Non-negative delta derived from `daily_rain_in` at ingest.
    pub interval_rain_in: Option<f64>,
}

/// An incoming sample before the rain delta has been computed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    pub timestamp: i64,
    pub temp_f: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_mph: Option<f64>,
    pub solar_kwh_m2_day: Option<f64>,
    pub daily_rain_in: Option<f64>,
    /// Instantaneous rain rate in in/hr; only consulted for `last_rain_epoch`.
    pub rain_rate_in_hr: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write observation snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode observation snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Inner {
    /// Newest first, insertion order.
    samples: Arc<VecDeque<Observation>>,
    /// Last `daily_rain_in` seen, for the wraparound delta. Starts at zero so
    /// the first report contributes its full running total.
    last_daily_rain: f64,
    last_rain_epoch: Option<i64>,
}

/// Singleton sample ring shared by the ingest handlers, the aggregator and
/// the persistence worker.
pub struct ObservationStore {
    inner: RwLock<Inner>,
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                samples: Arc::new(VecDeque::new()),
                last_daily_rain: 0.0,
                last_rain_epoch: None,
            }),
        }
    }

    /// Ingest one sample. Never fails: absent fields are absorbed.
    ///
    /// The rain counter reported by the station is a running daily total, so
    /// the per-interval amount is its delta, except across a counter reset
    /// (midnight or power-cycle), where the new total *is* the interval.
    pub async fn ingest(&self, sample: Sample) {
        let mut inner = self.inner.write().await;

        let interval_rain_in = match sample.daily_rain_in {
            Some(daily) => {
                let last = inner.last_daily_rain;
                inner.last_daily_rain = daily;
                Some(if daily < last { daily } else { daily - last })
            }
            None => None,
        };

        if sample.rain_rate_in_hr.is_some_and(|rate| rate > 0.0) {
            inner.last_rain_epoch = Some(sample.timestamp);
        }

        let observation = Observation {
            timestamp: sample.timestamp,
            temp_f: sample.temp_f,
            humidity_pct: sample.humidity_pct,
            wind_mph: sample.wind_mph,
            solar_kwh_m2_day: sample.solar_kwh_m2_day,
            daily_rain_in: sample.daily_rain_in,
            interval_rain_in,
        };

        Arc::make_mut(&mut inner.samples).push_front(observation);
    }

    /// Drop observations older than the retention window.
    pub async fn trim(&self, now: i64) {
        let mut inner = self.inner.write().await;
        let has_expired = inner
            .samples
            .iter()
            .any(|o| now - o.timestamp > RETENTION_SECS);
        if has_expired {
            Arc::make_mut(&mut inner.samples).retain(|o| now - o.timestamp <= RETENTION_SECS);
        }
    }

    /// A read-consistent snapshot of the ring, newest first. Cheap: clones
    /// the `Arc`, not the samples. Later ingests never alter the snapshot.
    pub async fn snapshot(&self) -> Arc<VecDeque<Observation>> {
        self.inner.read().await.samples.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.samples.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.samples.is_empty()
    }

    /// Epoch of the last sample whose rain-rate sensor read above zero.
    pub async fn last_rain_epoch(&self) -> Option<i64> {
        self.inner.read().await.last_rain_epoch
    }

    /// Serialize the current snapshot to `<dir>/observations.json`.
    ///
    /// The write goes to a temp file first and is renamed into place so a
    /// crash mid-write never leaves a truncated file behind.
    pub async fn persist_to(&self, dir: &Path) -> Result<(), PersistError> {
        let snapshot = self.snapshot().await;
        let body = serde_json::to_vec(snapshot.as_ref())?;

        let path = dir.join(OBSERVATIONS_FILE);
        let tmp = dir.join(format!("{OBSERVATIONS_FILE}.tmp"));
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!(
            "persisted {} observations to {}",
            snapshot.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a previously persisted snapshot, replacing the ring.
    ///
    /// A missing file is a normal first run. A corrupt file resets the store
    /// to empty; the error is logged and the service continues.
    pub async fn restore_from(&self, dir: &Path) -> usize {
        let path = dir.join(OBSERVATIONS_FILE);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no persisted observations at {}", path.display());
                return 0;
            }
            Err(e) => {
                warn!("could not read {}: {}", path.display(), e);
                return 0;
            }
        };

        let samples: VecDeque<Observation> = match serde_json::from_slice(&body) {
            Ok(samples) => samples,
            Err(e) => {
                error!(
                    "corrupt observation snapshot at {}, starting empty: {}",
                    path.display(),
                    e
                );
                return 0;
            }
        };

        let restored = samples.len();
        let last_daily_rain = samples
            .front()
            .and_then(|o| o.daily_rain_in)
            .unwrap_or(0.0);

        let mut inner = self.inner.write().await;
        inner.samples = Arc::new(samples);
        inner.last_daily_rain = last_daily_rain;

        info!("restored {} observations from {}", restored, path.display());
        restored
    }
}

/// Create the persistence directory if missing and confirm it is usable.
pub fn prepare_persistence_dir(dir: &Path) -> Result<(), crate::error::Error> {
    std::fs::create_dir_all(dir).map_err(|e| {
        crate::error::Error::Configuration(format!(
            "persistence directory {}: {}",
            dir.display(),
            e
        ))
    })
}

/// Periodic persistence worker. Runs off the request path; write failures
/// are logged and retried on the next tick.
pub async fn run_persistence(
    store: Arc<ObservationStore>,
    dir: std::path::PathBuf,
    interval_secs: u64,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; skip it, we just restored.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let now = crate::utils::unix_now();
        store.trim(now).await;
        if let Err(e) = store.persist_to(&dir).await {
            error!("observation persistence failed, will retry: {}", e);
        }
    }
}
