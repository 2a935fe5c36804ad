//! Weather endpoint: current conditions plus the forecast tail, consumed by
//! rain-delay checks.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::compose::SeriesDay;
use crate::error::Error;
use crate::local::CurrentConditions;
use crate::routes::watering::{resolve_provider, WateringQuery};
use crate::startup::AppState;
use crate::tz::Coordinates;
use crate::utils::unix_now;

#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherResponse {
    pub current: CurrentConditions,
    /// Forecast-sourced slice of the combined series, newest first.
    pub forecast: Vec<SeriesDay>,
}

/// Handler for current weather (GET /weather)
#[utoipa::path(
    get,
    path = "/weather",
    params(WateringQuery),
    responses(
        (status = 200, description = "Current conditions and forecast", body = WeatherResponse),
        (status = 400, description = "Unknown provider tag", body = crate::error::ErrorBody),
        (status = 503, description = "Insufficient weather data", body = crate::error::ErrorBody)
    )
)]
pub async fn weather(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WateringQuery>,
) -> Result<Json<WeatherResponse>, Error> {
    let provider = resolve_provider(query.provider.as_deref())?;
    let coords = Coordinates::new(query.lat, query.lon);

    let (current, forecast) = state
        .composer
        .view_for_rain_restriction(coords, provider, unix_now())
        .await?;

    Ok(Json(WeatherResponse { current, forecast }))
}
