//! Hybrid composition of measured past and forecast future.
//!
//! The composer is the single piece of cross-request state in the core: a
//! short-TTL cache of combined series keyed by `(coords, provider)`. Two
//! consumers read it through different views; concurrent cache misses on the
//! same key are collapsed into one composition by a per-key mutex.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use utoipa::ToSchema;

use crate::aggregate::DayBucket;
use crate::error::Error;
use crate::forecast::{AdapterRegistry, ForecastAdapter, ForecastDay, ProviderTag};
use crate::local::{CurrentConditions, LocalProvider};
use crate::tz::{Coordinates, TimeZoneResolver};

/// Cache lifetime of a fully-composed series.
pub const CACHE_TTL_SECS: i64 = 300;

/// Cache lifetime when one source failed and the series is degraded; short
/// so the missing source is retried quickly.
pub const DEGRADED_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SeriesSource {
    Local,
    Forecast,
}

/// One element of a combined series: a measured day or a forecast day,
/// unioned into a single shape.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SeriesDay {
    pub source: SeriesSource,
    pub local_midnight_epoch: i64,
    /// Mean temperature; absent on forecast days.
    pub temp_f: Option<f64>,
    pub min_temp_f: f64,
    pub max_temp_f: f64,
    pub humidity_pct: Option<f64>,
    pub min_humidity_pct: Option<f64>,
    pub max_humidity_pct: Option<f64>,
    pub precip_in: f64,
    pub solar_kwh_m2_day: Option<f64>,
    pub wind_mph: Option<f64>,
    /// Originating upstream; absent on local days.
    pub provider: Option<ProviderTag>,
}

impl From<DayBucket> for SeriesDay {
    fn from(day: DayBucket) -> Self {
        SeriesDay {
            source: SeriesSource::Local,
            local_midnight_epoch: day.local_midnight_epoch,
            temp_f: Some(day.temp_f),
            min_temp_f: day.min_temp_f,
            max_temp_f: day.max_temp_f,
            humidity_pct: Some(day.humidity_pct),
            min_humidity_pct: Some(day.min_humidity_pct),
            max_humidity_pct: Some(day.max_humidity_pct),
            precip_in: day.precip_in,
            solar_kwh_m2_day: day.solar_kwh_m2_day,
            wind_mph: day.wind_mph,
            provider: None,
        }
    }
}

impl From<ForecastDay> for SeriesDay {
    fn from(day: ForecastDay) -> Self {
        SeriesDay {
            source: SeriesSource::Forecast,
            local_midnight_epoch: day.local_midnight_epoch,
            temp_f: None,
            min_temp_f: day.min_temp_f,
            max_temp_f: day.max_temp_f,
            humidity_pct: day.humidity_pct,
            min_humidity_pct: None,
            max_humidity_pct: None,
            precip_in: day.precip_in,
            solar_kwh_m2_day: day.solar_kwh_m2_day,
            wind_mph: day.wind_mph,
            provider: Some(day.provider),
        }
    }
}

/// Cache keys quantize coordinates to ~11 m so float noise in query params
/// does not fragment the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    lat_e4: i64,
    lon_e4: i64,
    provider: ProviderTag,
}

impl CacheKey {
    fn new(coords: Coordinates, provider: ProviderTag) -> Self {
        Self {
            lat_e4: (coords.lat * 10_000.0).round() as i64,
            lon_e4: (coords.lon * 10_000.0).round() as i64,
            provider,
        }
    }
}

#[derive(Clone)]
struct CachedView {
    series: Arc<Vec<SeriesDay>>,
    coords: Coordinates,
    created_at: i64,
    ttl_secs: i64,
}

impl CachedView {
    fn fresh(&self, now: i64, coords: Coordinates) -> bool {
        self.coords == coords && now - self.created_at <= self.ttl_secs
    }
}

/// Per-key slot. The mutex serializes compositions for one key: the first
/// cache-miss caller composes while concurrent callers wait, then read the
/// stored result. A failed composition leaves the slot unchanged, so the
/// next caller retries instead of seeing a poisoned entry.
struct CacheEntry {
    slot: Mutex<Option<CachedView>>,
}

pub struct HybridComposer {
    local: LocalProvider,
    registry: AdapterRegistry,
    tz: Arc<TimeZoneResolver>,
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
}

impl HybridComposer {
    pub fn new(local: LocalProvider, registry: AdapterRegistry, tz: Arc<TimeZoneResolver>) -> Self {
        Self {
            local,
            registry,
            tz,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The full combined series, newest first. Served from cache within the
    /// TTL; composed on demand otherwise.
    pub async fn view_for_adjustment(
        &self,
        coords: Coordinates,
        provider: ProviderTag,
        now: i64,
    ) -> Result<Arc<Vec<SeriesDay>>, Error> {
        let adapter = self.registry.get(provider)?;
        let entry = self.entry(CacheKey::new(coords, provider)).await;

        let mut slot = entry.slot.lock().await;
        if let Some(view) = slot.as_ref() {
            if view.fresh(now, coords) {
                return Ok(view.series.clone());
            }
        }

        let view = self.compose(coords, adapter.as_ref(), now).await?;
        let series = view.series.clone();
        *slot = Some(view);
        Ok(series)
    }

    /// Current conditions plus the forecast tail of the combined series.
    /// Composes transparently when the cache is cold.
    pub async fn view_for_rain_restriction(
        &self,
        coords: Coordinates,
        provider: ProviderTag,
        now: i64,
    ) -> Result<(CurrentConditions, Vec<SeriesDay>), Error> {
        let current = self.local.current(now).await?;
        let series = self.view_for_adjustment(coords, provider, now).await?;
        let tail: Vec<SeriesDay> = series
            .iter()
            .filter(|d| d.source == SeriesSource::Forecast)
            .cloned()
            .collect();
        Ok((current, tail))
    }

    async fn entry(&self, key: CacheKey) -> Arc<CacheEntry> {
        if let Some(entry) = self.entries.read().await.get(&key) {
            return entry.clone();
        }
        self.entries
            .write()
            .await
            .entry(key)
            .or_insert_with(|| {
                Arc::new(CacheEntry {
                    slot: Mutex::new(None),
                })
            })
            .clone()
    }

    /// One composition: measured past + today unioned with the strictly
    /// future part of the forecast, ordered newest first.
    async fn compose(
        &self,
        coords: Coordinates,
        adapter: &dyn ForecastAdapter,
        now: i64,
    ) -> Result<CachedView, Error> {
        let today = self.tz.local_calendar_day(coords, now);

        let (local_days, local_ok) = match self.local.watering_window(coords, now).await {
            Ok(days) => (days, true),
            Err(e) => {
                debug!("local watering window unavailable: {}", e);
                (Vec::new(), false)
            }
        };

        let (forecast_days, forecast_ok) = match adapter.fetch_daily(coords).await {
            Ok(days) => (days, true),
            Err(e) => {
                warn!("forecast fetch from {} failed: {}", adapter.tag(), e);
                (Vec::new(), false)
            }
        };

        // Keep only forecast days whose local calendar date is strictly
        // after today. Comparing (year, month, day) rather than raw epochs
        // also handles upstreams that mark days at 06:00 instead of
        // midnight.
        let mut filtered: Vec<ForecastDay> = forecast_days
            .into_iter()
            .filter(|d| self.tz.local_calendar_day(coords, d.local_midnight_epoch) > today)
            .collect();

        // Guard against overlap with the measured side: nothing at or before
        // the latest local day survives.
        if let Some(latest_local) = local_days.first() {
            let latest_day = self
                .tz
                .local_calendar_day(coords, latest_local.local_midnight_epoch);
            filtered.retain(|d| {
                self.tz.local_calendar_day(coords, d.local_midnight_epoch) > latest_day
            });
        }

        let mut combined: Vec<SeriesDay> = local_days
            .into_iter()
            .map(SeriesDay::from)
            .chain(filtered.into_iter().map(SeriesDay::from))
            .collect();

        if combined.is_empty() {
            return Err(Error::InsufficientData(
                "neither local observations nor forecast produced any days".into(),
            ));
        }

        combined.sort_by(|a, b| b.local_midnight_epoch.cmp(&a.local_midnight_epoch));

        let degraded = !(local_ok && forecast_ok);
        if degraded {
            debug!(
                "composed degraded series for {} (local_ok={}, forecast_ok={})",
                coords, local_ok, forecast_ok
            );
        }

        Ok(CachedView {
            series: Arc::new(combined),
            coords,
            created_at: now,
            ttl_secs: if degraded {
                DEGRADED_TTL_SECS
            } else {
                CACHE_TTL_SECS
            },
        })
    }
}
