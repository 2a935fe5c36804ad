//! Measured-data views over the observation store.
//!
//! `LocalProvider` is the read side of the PWS pipeline: a 24 h
//! instantaneous rollup for rain-delay checks and the 8-day watering window
//! for adjustment algorithms. Both operate on an immutable snapshot of the
//! store, so concurrent ingestion cannot tear a read.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::aggregate::{aggregate, DayBucket};
use crate::error::Error;
use crate::store::ObservationStore;
use crate::tz::{Coordinates, TimeZoneResolver};

/// Instantaneous conditions derived from the last 24 h of samples.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CurrentConditions {
    /// Newest sample's temperature, floored to whole degrees.
    pub temp_f: Option<i64>,
    pub humidity_pct: Option<i64>,
    /// Newest sample's wind speed, one decimal.
    pub wind_mph: Option<f64>,
    /// Total measured precipitation over the window.
    pub precip_24h_in: f64,
    pub raining: bool,
    pub last_rain_epoch: Option<i64>,
    /// Timestamp of the newest contributing sample.
    pub timestamp: i64,
}

pub struct LocalProvider {
    store: Arc<ObservationStore>,
    tz: Arc<TimeZoneResolver>,
}

impl LocalProvider {
    pub fn new(store: Arc<ObservationStore>, tz: Arc<TimeZoneResolver>) -> Self {
        Self { store, tz }
    }

    /// The newest sample's instantaneous readings plus the 24 h rain total.
    /// Fails with `InsufficientData` when the window holds no samples.
    pub async fn current(&self, now: i64) -> Result<CurrentConditions, Error> {
        let snapshot = self.store.snapshot().await;
        let cutoff = now - 86_400;

        let mut newest = None;
        let mut precip_24h_in = 0.0;
        for obs in snapshot.iter().filter(|o| o.timestamp >= cutoff) {
            precip_24h_in += obs.interval_rain_in.unwrap_or(0.0).max(0.0);
            match newest {
                Some(ts) if ts >= obs.timestamp => {}
                _ => newest = Some(obs.timestamp),
            }
        }
        let newest_ts =
            newest.ok_or_else(|| Error::InsufficientData("no observations in the last 24 h".into()))?;
        let newest_obs = snapshot
            .iter()
            .find(|o| o.timestamp == newest_ts)
            .ok_or_else(|| Error::InsufficientData("no observations in the last 24 h".into()))?;

        Ok(CurrentConditions {
            temp_f: newest_obs.temp_f.map(|t| t.floor() as i64),
            humidity_pct: newest_obs.humidity_pct.map(|h| h.floor() as i64),
            wind_mph: newest_obs.wind_mph.map(|w| (w * 10.0).round() / 10.0),
            precip_24h_in,
            raining: precip_24h_in > 0.0,
            last_rain_epoch: self.store.last_rain_epoch().await,
            timestamp: newest_ts,
        })
    }

    /// The 8-day watering window (partial today + up to 7 past days),
    /// newest first, in the local zone of `coords`.
    pub async fn watering_window(
        &self,
        coords: Coordinates,
        now: i64,
    ) -> Result<Vec<DayBucket>, Error> {
        let snapshot = self.store.snapshot().await;
        let today_midnight = self.tz.local_midnight(coords, now);
        aggregate(&snapshot, today_midnight, now)
    }
}
