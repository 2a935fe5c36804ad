//! Watering-decision endpoint: the combined series consumed by adjustment
//! algorithms on downstream controllers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::compose::SeriesDay;
use crate::error::Error;
use crate::forecast::ProviderTag;
use crate::startup::AppState;
use crate::tz::Coordinates;
use crate::utils::unix_now;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WateringQuery {
    pub lat: f64,
    pub lon: f64,
    /// Forecast provider tag; defaults to open-meteo.
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WateringResponse {
    pub provider: ProviderTag,
    /// Newest first: forecast days, then today, then measured past days.
    pub days: Vec<SeriesDay>,
}

pub(crate) fn resolve_provider(raw: Option<&str>) -> Result<ProviderTag, Error> {
    match raw {
        Some(s) => ProviderTag::try_from(s),
        None => Ok(ProviderTag::OpenMeteo),
    }
}

/// Handler for the watering window (GET /watering)
#[utoipa::path(
    get,
    path = "/watering",
    params(WateringQuery),
    responses(
        (status = 200, description = "Combined measured + forecast series", body = WateringResponse),
        (status = 400, description = "Unknown provider tag", body = crate::error::ErrorBody),
        (status = 503, description = "Insufficient weather data", body = crate::error::ErrorBody)
    )
)]
pub async fn watering_window(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WateringQuery>,
) -> Result<Json<WateringResponse>, Error> {
    let provider = resolve_provider(query.provider.as_deref())?;
    let coords = Coordinates::new(query.lat, query.lon);

    let series = state
        .composer
        .view_for_adjustment(coords, provider, unix_now())
        .await?;

    Ok(Json(WateringResponse {
        provider,
        days: series.as_ref().clone(),
    }))
}
