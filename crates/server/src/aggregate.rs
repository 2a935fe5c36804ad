//! Per-calendar-day rollups over raw PWS samples.
//!
//! The aggregator turns at most 8 local days of samples (7 past plus a
//! partial "today") into `DayBucket`s. All windows are half-open
//! `[start, end)` in the caller's local zone; one builder serves both the
//! partial today window and the full past days.

use std::collections::VecDeque;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::Error;
use crate::store::Observation;

/// Samples outside these physical ranges are sensor glitches and are
/// ignored per field, the same way an absent field is.
const TEMP_RANGE_F: std::ops::RangeInclusive<f64> = -40.0..=140.0;
const HUMIDITY_RANGE_PCT: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// Minimum wall-clock coverage before any aggregation is attempted.
const MIN_SPAN_SECS: i64 = 23 * 3600;

const DAY_SECS: i64 = 86_400;

/// One local calendar day of aggregated observations.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DayBucket {
    pub local_midnight_epoch: i64,
    pub temp_f: f64,
    pub min_temp_f: f64,
    pub max_temp_f: f64,
    pub humidity_pct: f64,
    pub min_humidity_pct: f64,
    pub max_humidity_pct: f64,
    pub precip_in: f64,
    pub solar_kwh_m2_day: Option<f64>,
    pub wind_mph: Option<f64>,
    pub sample_count: usize,
    /// Whether the bucket's window covers at least 23 h of wall time. The
    /// partial today bucket is the only one this is normally false for.
    pub complete: bool,
}

#[derive(Default)]
struct BucketBuilder {
    temp_sum: f64,
    temp_count: usize,
    min_temp: f64,
    max_temp: f64,
    humidity_sum: f64,
    humidity_count: usize,
    min_humidity: f64,
    max_humidity: f64,
    precip: f64,
    solar_sum: f64,
    solar_count: usize,
    wind_sum: f64,
    wind_count: usize,
    sample_count: usize,
}

impl BucketBuilder {
    fn new() -> Self {
        Self {
            min_temp: f64::INFINITY,
            max_temp: f64::NEG_INFINITY,
            min_humidity: f64::INFINITY,
            max_humidity: f64::NEG_INFINITY,
            ..Self::default()
        }
    }

    fn push(&mut self, obs: &Observation) {
        self.sample_count += 1;
        if let Some(t) = obs.temp_f.filter(|t| TEMP_RANGE_F.contains(t)) {
            self.temp_sum += t;
            self.temp_count += 1;
            self.min_temp = self.min_temp.min(t);
            self.max_temp = self.max_temp.max(t);
        }
        if let Some(h) = obs.humidity_pct.filter(|h| HUMIDITY_RANGE_PCT.contains(h)) {
            self.humidity_sum += h;
            self.humidity_count += 1;
            self.min_humidity = self.min_humidity.min(h);
            self.max_humidity = self.max_humidity.max(h);
        }
        if let Some(p) = obs.interval_rain_in.filter(|p| *p >= 0.0) {
            self.precip += p;
        }
        if let Some(s) = obs.solar_kwh_m2_day.filter(|s| *s >= 0.0) {
            self.solar_sum += s;
            self.solar_count += 1;
        }
        if let Some(w) = obs.wind_mph.filter(|w| *w >= 0.0) {
            self.wind_sum += w;
            self.wind_count += 1;
        }
    }

    /// Emit the bucket iff temp and humidity both contributed at least one
    /// sample and every min/max is finite.
    fn build(self, start: i64, end: i64, now: i64) -> Option<DayBucket> {
        if self.temp_count == 0 || self.humidity_count == 0 {
            return None;
        }
        if !(self.min_temp.is_finite()
            && self.max_temp.is_finite()
            && self.min_humidity.is_finite()
            && self.max_humidity.is_finite())
        {
            return None;
        }
        let covered = end.min(now) - start;
        Some(DayBucket {
            local_midnight_epoch: start,
            temp_f: self.temp_sum / self.temp_count as f64,
            min_temp_f: self.min_temp,
            max_temp_f: self.max_temp,
            humidity_pct: self.humidity_sum / self.humidity_count as f64,
            min_humidity_pct: self.min_humidity,
            max_humidity_pct: self.max_humidity,
            precip_in: self.precip,
            solar_kwh_m2_day: (self.solar_count > 0)
                .then(|| self.solar_sum / self.solar_count as f64),
            wind_mph: (self.wind_count > 0).then(|| self.wind_sum / self.wind_count as f64),
            sample_count: self.sample_count,
            complete: covered >= MIN_SPAN_SECS,
        })
    }
}

fn build_window(
    samples: &VecDeque<Observation>,
    start: i64,
    end: i64,
    now: i64,
) -> Option<DayBucket> {
    let mut builder = BucketBuilder::new();
    for obs in samples
        .iter()
        .filter(|o| o.timestamp >= start && o.timestamp < end)
    {
        builder.push(obs);
    }
    builder.build(start, end, now)
}

/// Roll the sample ring up into at most 8 buckets, newest first: a partial
/// today bucket followed by up to 7 past days.
///
/// Yesterday is mandatory: adjustment algorithms anchor on it, so a gap
/// there fails the whole aggregation. Older days stop at the first gap and
/// the contiguous prefix is returned; interpolating across a gap would bias
/// the trend the consumers compute.
pub fn aggregate(
    samples: &VecDeque<Observation>,
    today_midnight: i64,
    now: i64,
) -> Result<Vec<DayBucket>, Error> {
    let (head, tail) = match (samples.front(), samples.back()) {
        (Some(head), Some(tail)) => (head, tail),
        _ => {
            return Err(Error::InsufficientData(
                "no observations ingested yet".into(),
            ))
        }
    };
    if head.timestamp - tail.timestamp < MIN_SPAN_SECS {
        return Err(Error::InsufficientData(format!(
            "only {:.1} h of observations, need 23 h",
            (head.timestamp - tail.timestamp) as f64 / 3600.0
        )));
    }

    let mut days = Vec::with_capacity(8);

    // Partial today window; its absence is not an error.
    if let Some(today) = build_window(samples, today_midnight, now + 1, now) {
        days.push(today);
    }

    for i in 1..=7 {
        let start = today_midnight - i * DAY_SECS;
        match build_window(samples, start, start + DAY_SECS, now) {
            Some(bucket) => days.push(bucket),
            None if i == 1 => {
                return Err(Error::InsufficientData(
                    "yesterday's observations are incomplete".into(),
                ))
            }
            None => break,
        }
    }

    Ok(days)
}
