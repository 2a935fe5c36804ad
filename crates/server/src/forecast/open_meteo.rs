//! Open-Meteo daily forecast adapter. Keyless.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;

use super::{Error, ForecastAdapter, ForecastDay, ProviderTag};
use crate::tz::{Coordinates, TimeZoneResolver};

const BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Shortwave radiation arrives as MJ/m²/day; canonical is kWh/m²/day.
const MJ_TO_KWH: f64 = 1.0 / 3.6;

/// Open-Meteo API response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct ForecastResponse {
        pub daily: Daily,
    }

    #[derive(Debug, Deserialize)]
    pub struct Daily {
        pub time: Vec<String>,
        #[serde(default)]
        pub temperature_2m_max: Option<Vec<Option<f64>>>,
        #[serde(default)]
        pub temperature_2m_min: Option<Vec<Option<f64>>>,
        #[serde(default)]
        pub precipitation_sum: Option<Vec<Option<f64>>>,
        #[serde(default)]
        pub relative_humidity_2m_mean: Option<Vec<Option<f64>>>,
        #[serde(default)]
        pub wind_speed_10m_mean: Option<Vec<Option<f64>>>,
        #[serde(default)]
        pub shortwave_radiation_sum: Option<Vec<Option<f64>>>,
    }
}

pub struct OpenMeteoAdapter {
    client: reqwest::Client,
    tz: Arc<TimeZoneResolver>,
}

impl OpenMeteoAdapter {
    pub fn new(client: reqwest::Client, tz: Arc<TimeZoneResolver>) -> Self {
        Self { client, tz }
    }

    fn convert(
        &self,
        response: api::ForecastResponse,
        coords: Coordinates,
    ) -> Result<Vec<ForecastDay>, Error> {
        let daily = response.daily;
        let max_temps = daily
            .temperature_2m_max
            .as_ref()
            .ok_or(Error::MissingField("temperature_2m_max"))?;
        let min_temps = daily
            .temperature_2m_min
            .as_ref()
            .ok_or(Error::MissingField("temperature_2m_min"))?;
        let precip = daily
            .precipitation_sum
            .as_ref()
            .ok_or(Error::MissingField("precipitation_sum"))?;

        let optional = |values: &Option<Vec<Option<f64>>>, i: usize| -> Option<f64> {
            values.as_ref().and_then(|v| v.get(i).copied().flatten())
        };

        let mut days = Vec::with_capacity(daily.time.len());
        for (i, date_str) in daily.time.iter().enumerate() {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| Error::Parse(format!("bad date '{date_str}': {e}")))?;

            // A trailing day sometimes arrives with null temperatures; skip
            // it rather than failing the whole fetch.
            let (min_temp_f, max_temp_f) = match (
                min_temps.get(i).copied().flatten(),
                max_temps.get(i).copied().flatten(),
            ) {
                (Some(min), Some(max)) => (min, max),
                _ => {
                    debug!("open-meteo: skipping {date_str}, temperatures null");
                    continue;
                }
            };

            days.push(ForecastDay {
                local_midnight_epoch: self.tz.local_midnight_for_date(coords, date),
                min_temp_f,
                max_temp_f,
                // a null precipitation sum reads as a dry day
                precip_in: precip.get(i).copied().flatten().unwrap_or(0.0),
                humidity_pct: optional(&daily.relative_humidity_2m_mean, i),
                wind_mph: optional(&daily.wind_speed_10m_mean, i),
                solar_kwh_m2_day: optional(&daily.shortwave_radiation_sum, i)
                    .map(|mj| mj * MJ_TO_KWH),
                provider: ProviderTag::OpenMeteo,
            });
        }
        Ok(days)
    }
}

#[async_trait]
impl ForecastAdapter for OpenMeteoAdapter {
    fn tag(&self) -> ProviderTag {
        ProviderTag::OpenMeteo
    }

    async fn fetch_daily(&self, coords: Coordinates) -> Result<Vec<ForecastDay>, Error> {
        let url = format!(
            "{}?latitude={}&longitude={}\
             &daily=temperature_2m_max,temperature_2m_min,precipitation_sum,\
             relative_humidity_2m_mean,wind_speed_10m_mean,shortwave_radiation_sum\
             &temperature_unit=fahrenheit&wind_speed_unit=mph&precipitation_unit=inch\
             &timezone=auto&forecast_days=8",
            BASE_URL, coords.lat, coords.lon
        );
        debug!("fetching open-meteo forecast: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }

        let body: api::ForecastResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        self.convert(body, coords)
    }
}
