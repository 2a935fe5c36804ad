//! Weather-Underground-compatible telemetry push.
//!
//! PWS firmware is not negotiable about its wire format: a GET with loosely
//! typed query parameters, expecting the literal body `success\n` back. The
//! handler therefore never rejects a push; anything missing, non-numeric, or
//! set to the `-9999` sensor-absent sentinel is simply absorbed as absent.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::NaiveDateTime;
use log::debug;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::startup::AppState;
use crate::store::Sample;
use crate::utils::unix_now;

/// Sentinel some stations report for a sensor that is not installed.
const SENSOR_ABSENT: f64 = -9999.0;

/// Solar radiation arrives in W/m²; the canonical unit is kWh/m²/day.
const WPM2_TO_KWH_M2_DAY: f64 = 24.0 / 1000.0;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct WuUpdateParams {
    /// UTC timestamp `YYYY-MM-DD HH:MM:SS`, or the literal `now`.
    pub dateutc: Option<String>,
    pub tempf: Option<String>,
    pub humidity: Option<String>,
    pub windspeedmph: Option<String>,
    /// W/m²
    pub solarradiation: Option<String>,
    /// Running daily total, inches.
    pub dailyrainin: Option<String>,
    /// Instantaneous rate, in/hr.
    pub rainin: Option<String>,
}

impl WuUpdateParams {
    pub fn into_sample(self, now: i64) -> Sample {
        Sample {
            timestamp: parse_dateutc(self.dateutc.as_deref(), now),
            temp_f: parse_numeric(self.tempf.as_deref()),
            humidity_pct: parse_numeric(self.humidity.as_deref()),
            wind_mph: parse_numeric(self.windspeedmph.as_deref()),
            solar_kwh_m2_day: parse_numeric(self.solarradiation.as_deref())
                .map(|w| w * WPM2_TO_KWH_M2_DAY),
            daily_rain_in: parse_numeric(self.dailyrainin.as_deref()),
            rain_rate_in_hr: parse_numeric(self.rainin.as_deref()),
        }
    }
}

fn parse_numeric(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v != SENSOR_ABSENT)
}

fn parse_dateutc(raw: Option<&str>, now: i64) -> i64 {
    match raw {
        None => now,
        Some("now") => now,
        Some(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(now),
    }
}

/// Handler for PWS pushes (GET /weatherstation/updateweatherstation)
#[utoipa::path(
    get,
    path = "/weatherstation/updateweatherstation",
    params(WuUpdateParams),
    responses(
        (status = 200, description = "Sample ingested", body = String)
    )
)]
pub async fn update_weather_station(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WuUpdateParams>,
) -> impl IntoResponse {
    let now = unix_now();
    let sample = params.into_sample(now);
    debug!("ingesting PWS sample at {}", sample.timestamp);

    state.store.ingest(sample).await;
    state.store.trim(now).await;

    "success\n"
}
