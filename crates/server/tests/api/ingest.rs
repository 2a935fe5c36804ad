use crate::helpers::{get, mock_adapter, spawn_app};

#[tokio::test]
async fn push_returns_success_and_lands_in_the_store() {
    let test_app = spawn_app(mock_adapter());

    let (status, body) = get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=now&tempf=70.5&humidity=52&windspeedmph=4.2&dailyrainin=0.10",
    )
    .await;

    assert!(status.is_success());
    assert_eq!(body, b"success\n");
    assert_eq!(test_app.state.store.len().await, 1);

    let snapshot = test_app.state.store.snapshot().await;
    let obs = snapshot.front().unwrap();
    assert_eq!(obs.temp_f, Some(70.5));
    assert_eq!(obs.humidity_pct, Some(52.0));
    // first daily-rain report: the full running total is the interval
    assert_eq!(obs.interval_rain_in, Some(0.10));
}

#[tokio::test]
async fn consecutive_pushes_accumulate_rain_deltas() {
    let test_app = spawn_app(mock_adapter());

    get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=now&tempf=70&humidity=50&dailyrainin=0.10",
    )
    .await;
    get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=now&tempf=70&humidity=50&dailyrainin=0.15",
    )
    .await;
    // counter reset, e.g. station-local midnight
    get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=now&tempf=70&humidity=50&dailyrainin=0.02",
    )
    .await;

    let snapshot = test_app.state.store.snapshot().await;
    let total: f64 = snapshot.iter().filter_map(|o| o.interval_rain_in).sum();
    assert!((total - 0.17).abs() < 1e-9);
}

#[tokio::test]
async fn sentinel_and_garbage_fields_are_absorbed_not_rejected() {
    let test_app = spawn_app(mock_adapter());

    let (status, body) = get(
        &test_app.app,
        "/weatherstation/updateweatherstation?tempf=-9999.0&humidity=notanumber&solarradiation=",
    )
    .await;

    assert!(status.is_success());
    assert_eq!(body, b"success\n");

    let snapshot = test_app.state.store.snapshot().await;
    let obs = snapshot.front().unwrap();
    assert_eq!(obs.temp_f, None);
    assert_eq!(obs.humidity_pct, None);
    assert_eq!(obs.solar_kwh_m2_day, None);
}

#[tokio::test]
async fn pushes_older_than_retention_are_trimmed_immediately() {
    let test_app = spawn_app(mock_adapter());

    let (status, _) = get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=2000-01-01%2000:00:00&tempf=60",
    )
    .await;
    assert!(status.is_success());
    assert_eq!(test_app.state.store.len().await, 0);

    get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=now&tempf=60&humidity=50",
    )
    .await;
    assert_eq!(test_app.state.store.len().await, 1);
}

#[tokio::test]
async fn health_reports_store_size() {
    let test_app = spawn_app(mock_adapter());
    get(
        &test_app.app,
        "/weatherstation/updateweatherstation?dateutc=now&tempf=64",
    )
    .await;

    let (status, body) = get(&test_app.app, "/health").await;
    assert!(status.is_success());
    assert_eq!(crate::helpers::json_body(&body)["observations"], 1);
}
