use std::sync::{Arc, OnceLock};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hyper::Method;
use mockall::mock;
use sprinklerd::{
    app, AdapterRegistry, AppState, Coordinates, ForecastAdapter, ForecastDay, HybridComposer,
    LocalProvider, ObservationStore, ProviderTag, Sample, TimeZoneResolver,
};
use tower::ServiceExt;

mock! {
    pub Adapter {}

    #[async_trait::async_trait]
    impl ForecastAdapter for Adapter {
        fn tag(&self) -> ProviderTag;
        async fn fetch_daily(
            &self,
            coords: Coordinates,
        ) -> Result<Vec<ForecastDay>, sprinklerd::forecast::Error>;
    }
}

/// Manhattan; resolves to America/New_York.
pub fn test_coords() -> Coordinates {
    Coordinates::new(40.7128, -74.0060)
}

// The zone-boundary index takes a moment to build; share one resolver
// across every test in the binary.
static TZ: OnceLock<Arc<TimeZoneResolver>> = OnceLock::new();

pub fn shared_tz() -> Arc<TimeZoneResolver> {
    TZ.get_or_init(|| Arc::new(TimeZoneResolver::new())).clone()
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub tz: Arc<TimeZoneResolver>,
}

pub fn spawn_app(adapter: MockAdapter) -> TestApp {
    let tz = shared_tz();
    let store = Arc::new(ObservationStore::new());
    let registry =
        AdapterRegistry::from_adapters([Arc::new(adapter) as Arc<dyn ForecastAdapter>]);
    let local = LocalProvider::new(store.clone(), tz.clone());
    let composer = Arc::new(HybridComposer::new(local, registry, tz.clone()));

    let state = AppState { store, composer };
    TestApp {
        app: app(state.clone()),
        state,
        tz,
    }
}

/// A mock adapter that already answers `tag()`; tests add their own
/// `fetch_daily` expectations.
pub fn mock_adapter() -> MockAdapter {
    let mut adapter = MockAdapter::new();
    adapter.expect_tag().return_const(ProviderTag::OpenMeteo);
    adapter
}

/// Seed the store with half-hourly samples covering `hours` hours back from
/// `now`, full sensor set, dry.
pub async fn seed_half_hourly(store: &ObservationStore, now: i64, hours: i64) {
    for i in (0..=hours * 2).rev() {
        let ts = now - i * 1800;
        store
            .ingest(Sample {
                timestamp: ts,
                temp_f: Some(62.0 + ((ts / 3600) % 12) as f64),
                humidity_pct: Some(42.0 + ((ts / 7200) % 9) as f64),
                wind_mph: Some(3.5),
                solar_kwh_m2_day: Some(6.2),
                daily_rain_in: None,
                rain_rate_in_hr: None,
            })
            .await;
    }
}

/// Forecast days for local calendar dates `today + start_offset` through
/// `today + start_offset + count - 1`, marked at local midnight.
pub fn forecast_days(
    tz: &TimeZoneResolver,
    coords: Coordinates,
    now: i64,
    start_offset: i64,
    count: i64,
) -> Vec<ForecastDay> {
    let today = tz.local_calendar_day(coords, now);
    (start_offset..start_offset + count)
        .map(|i| {
            let date = today + chrono::Duration::days(i);
            ForecastDay {
                local_midnight_epoch: tz.local_midnight_for_date(coords, date),
                min_temp_f: 54.0 + i as f64,
                max_temp_f: 78.0 + i as f64,
                precip_in: 0.02 * i as f64,
                humidity_pct: Some(48.0),
                solar_kwh_m2_day: None,
                wind_mph: Some(5.5),
                provider: ProviderTag::OpenMeteo,
            }
        })
        .collect()
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request.");

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, body)
}

pub fn json_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).expect("response body should be JSON")
}
