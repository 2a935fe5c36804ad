//! OpenWeatherMap forecast adapter.
//!
//! Uses OWM's daily forecast product, which serves up to 16 days per
//! request. Eight days are requested so a full week remains after the
//! composer drops today and earlier.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;

use super::{Error, ForecastAdapter, ForecastDay, ProviderTag};
use crate::tz::{Coordinates, TimeZoneResolver};

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5/forecast/daily";

/// Days requested from the upstream: today plus a week.
const FORECAST_DAYS: u8 = 8;

const MM_TO_IN: f64 = 1.0 / 25.4;

/// OpenWeatherMap API response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct ForecastResponse {
        pub list: Vec<Day>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Day {
        /// Midday of the forecast day, epoch seconds UTC.
        pub dt: i64,
        pub temp: Temp,
        #[serde(default)]
        pub humidity: Option<f64>,
        /// Wind speed; mph when imperial units are requested.
        #[serde(default)]
        pub speed: Option<f64>,
        /// Liquid accumulation in millimetres regardless of the `units`
        /// query parameter.
        #[serde(default)]
        pub rain: Option<f64>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Temp {
        pub min: f64,
        pub max: f64,
    }
}

#[derive(Default)]
struct DayAccum {
    min_temp: f64,
    max_temp: f64,
    precip_in: f64,
    humidity_sum: f64,
    humidity_count: usize,
    wind_sum: f64,
    wind_count: usize,
}

pub struct OpenWeatherMapAdapter {
    client: reqwest::Client,
    api_key: String,
    tz: Arc<TimeZoneResolver>,
}

impl OpenWeatherMapAdapter {
    pub fn new(client: reqwest::Client, api_key: String, tz: Arc<TimeZoneResolver>) -> Self {
        Self {
            client,
            api_key,
            tz,
        }
    }

    /// Re-anchor each upstream day to the local calendar at `coords`. The
    /// upstream marks days at UTC midday, so far-offset zones can land two
    /// upstream entries on one local date; those merge instead of producing
    /// duplicate days.
    fn convert(
        &self,
        response: api::ForecastResponse,
        coords: Coordinates,
    ) -> Result<Vec<ForecastDay>, Error> {
        if response.list.is_empty() {
            return Err(Error::MissingField("list"));
        }

        let mut by_day: BTreeMap<NaiveDate, DayAccum> = BTreeMap::new();
        for entry in &response.list {
            let date = self.tz.local_calendar_day(coords, entry.dt);
            let accum = by_day.entry(date).or_insert_with(|| DayAccum {
                min_temp: f64::INFINITY,
                max_temp: f64::NEG_INFINITY,
                ..DayAccum::default()
            });
            accum.min_temp = accum.min_temp.min(entry.temp.min);
            accum.max_temp = accum.max_temp.max(entry.temp.max);
            if let Some(mm) = entry.rain {
                accum.precip_in += mm.max(0.0) * MM_TO_IN;
            }
            if let Some(h) = entry.humidity {
                accum.humidity_sum += h;
                accum.humidity_count += 1;
            }
            if let Some(w) = entry.speed {
                accum.wind_sum += w;
                accum.wind_count += 1;
            }
        }

        Ok(by_day
            .into_iter()
            .map(|(date, accum)| ForecastDay {
                local_midnight_epoch: self.tz.local_midnight_for_date(coords, date),
                min_temp_f: accum.min_temp,
                max_temp_f: accum.max_temp,
                precip_in: accum.precip_in,
                humidity_pct: (accum.humidity_count > 0)
                    .then(|| accum.humidity_sum / accum.humidity_count as f64),
                wind_mph: (accum.wind_count > 0)
                    .then(|| accum.wind_sum / accum.wind_count as f64),
                // OWM has no daily radiation product
                solar_kwh_m2_day: None,
                provider: ProviderTag::OpenWeatherMap,
            })
            .collect())
    }
}

#[async_trait]
impl ForecastAdapter for OpenWeatherMapAdapter {
    fn tag(&self) -> ProviderTag {
        ProviderTag::OpenWeatherMap
    }

    async fn fetch_daily(&self, coords: Coordinates) -> Result<Vec<ForecastDay>, Error> {
        debug!("fetching openweathermap daily forecast for {}", coords);
        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "imperial".to_string()),
                ("cnt", FORECAST_DAYS.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(
                "openweathermap returned {}: {}",
                status,
                truncate_body(&body)
            );
            return Err(Error::Status(status.as_u16()));
        }

        let body: api::ForecastResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        self.convert(body, coords)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        format!("{}...", &body[..MAX])
    } else {
        body.to_string()
    }
}
