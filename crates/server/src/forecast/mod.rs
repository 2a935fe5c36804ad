//! Upstream forecast providers behind a common daily shape.
//!
//! Every upstream is reduced to `fetch_daily`: at least the provider's next
//! week of calendar days, converted to canonical units (°F, inches, mph,
//! kWh/m²/day) with day boundaries anchored to local midnight at the request
//! coordinates. Optional fields a provider does not report stay absent; the
//! composer and downstream algorithms decide what to do about that.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::tz::{Coordinates, TimeZoneResolver};

pub mod open_meteo;
pub mod openweather;

pub use open_meteo::OpenMeteoAdapter;
pub use openweather::OpenWeatherMapAdapter;

/// Per-call timeout on upstream requests. A hung upstream must surface as a
/// transient failure, never stall a composition.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Registry key of a forecast adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ProviderTag {
    #[serde(rename = "open-meteo")]
    OpenMeteo,
    #[serde(rename = "openweathermap")]
    OpenWeatherMap,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::OpenMeteo => "open-meteo",
            ProviderTag::OpenWeatherMap => "openweathermap",
        }
    }

    pub const fn all() -> &'static [ProviderTag] {
        &[ProviderTag::OpenMeteo, ProviderTag::OpenWeatherMap]
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderTag {
    type Error = crate::error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "open-meteo" => Ok(ProviderTag::OpenMeteo),
            "openweathermap" => Ok(ProviderTag::OpenWeatherMap),
            _ => Err(crate::error::Error::InvalidProvider(value.to_string())),
        }
    }
}

/// One forecast calendar day in canonical units.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastDay {
    pub local_midnight_epoch: i64,
    pub min_temp_f: f64,
    pub max_temp_f: f64,
    pub precip_in: f64,
    pub humidity_pct: Option<f64>,
    pub solar_kwh_m2_day: Option<f64>,
    pub wind_mph: Option<f64>,
    pub provider: ProviderTag,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("upstream request failed: {0}")]
    Transient(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("required forecast field '{0}' missing from upstream response")]
    MissingField(&'static str),
    #[error("unparseable upstream response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Transient(format!("request timed out after {REQUEST_TIMEOUT_SECS}s: {e}"))
        } else {
            Error::Transient(e.to_string())
        }
    }
}

#[async_trait]
pub trait ForecastAdapter: Send + Sync {
    fn tag(&self) -> ProviderTag;

    /// Fetch and convert the upstream's daily forecast for `coords`.
    async fn fetch_daily(&self, coords: Coordinates) -> Result<Vec<ForecastDay>, Error>;
}

impl std::fmt::Debug for dyn ForecastAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ForecastAdapter({})", self.tag())
    }
}

/// Table of registered adapters keyed by provider tag. Built once at
/// startup; which upstreams register depends on which API keys are
/// configured.
pub struct AdapterRegistry {
    adapters: HashMap<ProviderTag, Arc<dyn ForecastAdapter>>,
}

impl AdapterRegistry {
    pub fn from_adapters(
        adapters: impl IntoIterator<Item = Arc<dyn ForecastAdapter>>,
    ) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.tag(), a)).collect(),
        }
    }

    /// Build the registry from configuration. Open-Meteo is keyless and is
    /// always registered; keyed upstreams register only when configured.
    pub fn from_config(
        owm_api_key: Option<String>,
        tz: Arc<TimeZoneResolver>,
    ) -> Result<Self, crate::error::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| {
                crate::error::Error::Configuration(format!("http client setup failed: {e}"))
            })?;

        let mut adapters: Vec<Arc<dyn ForecastAdapter>> = vec![Arc::new(OpenMeteoAdapter::new(
            client.clone(),
            tz.clone(),
        ))];
        if let Some(key) = owm_api_key {
            adapters.push(Arc::new(OpenWeatherMapAdapter::new(client, key, tz)));
        }
        Ok(Self::from_adapters(adapters))
    }

    pub fn get(&self, tag: ProviderTag) -> Result<Arc<dyn ForecastAdapter>, crate::error::Error> {
        self.adapters
            .get(&tag)
            .cloned()
            .ok_or_else(|| crate::error::Error::InvalidProvider(tag.to_string()))
    }

    pub fn tags(&self) -> Vec<ProviderTag> {
        let mut tags: Vec<ProviderTag> = self.adapters.keys().copied().collect();
        tags.sort_by_key(|t| t.as_str());
        tags
    }
}
