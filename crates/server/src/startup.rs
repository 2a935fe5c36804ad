use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::info;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    compose::HybridComposer,
    forecast::AdapterRegistry,
    local::LocalProvider,
    routes::{update_weather_station, watering_window, weather},
    store::ObservationStore,
    tz::TimeZoneResolver,
    utils::Cli,
    routes,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ObservationStore>,
    pub composer: Arc<HybridComposer>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::ingest::update_weather_station,
        routes::watering::watering_window,
        routes::weather::weather,
    ),
    components(
        schemas(
            crate::compose::SeriesDay,
            crate::compose::SeriesSource,
            crate::forecast::ProviderTag,
            crate::local::CurrentConditions,
            crate::error::ErrorBody,
            routes::watering::WateringResponse,
            routes::weather::WeatherResponse,
        )
    ),
    tags(
        (name = "sprinklerd api", description = "weather aggregation and watering-window service for sprinkler controllers")
    )
)]
struct ApiDoc;

/// Wire the engine together. Persistence restore and the snapshot worker
/// are the caller's business; this only builds the object graph.
pub fn build_app_state(cli: &Cli) -> Result<AppState, anyhow::Error> {
    let tz = Arc::new(TimeZoneResolver::new());
    let store = Arc::new(ObservationStore::new());

    let registry = AdapterRegistry::from_config(cli.owm_api_key(), tz.clone())?;
    let local = LocalProvider::new(store.clone(), tz.clone());
    let composer = Arc::new(HybridComposer::new(local, registry, tz));

    Ok(AppState { store, composer })
}

#[derive(Serialize)]
struct HealthBody {
    observations: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let observations = state.store.len().await;
    (StatusCode::OK, Json(HealthBody { observations }))
}

pub fn app(app_state: AppState) -> Router {
    let api_docs = ApiDoc::openapi();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route(
            "/weatherstation/updateweatherstation",
            get(update_weather_station),
        )
        .route("/watering", get(watering_window))
        .route("/weather", get(weather))
        .route("/health", get(health_check))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .merge(Scalar::with_url("/docs", api_docs))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
