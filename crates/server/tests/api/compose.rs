use std::collections::HashSet;
use std::sync::Arc;

use sprinklerd::{forecast, unix_now, CACHE_TTL_SECS};

use crate::helpers::{
    forecast_days, get, json_body, mock_adapter, seed_half_hourly, spawn_app, test_coords,
};

const WATERING_URI: &str = "/watering?lat=40.7128&lon=-74.0060";
const WEATHER_URI: &str = "/weather?lat=40.7128&lon=-74.0060";

#[tokio::test]
async fn cold_start_with_no_upstream_is_insufficient() {
    let mut adapter = mock_adapter();
    adapter
        .expect_fetch_daily()
        .returning(|_| Err(forecast::Error::Transient("connection refused".into())));
    let test_app = spawn_app(adapter);

    // 12 h of samples is under the 23 h aggregation gate
    seed_half_hourly(&test_app.state.store, unix_now(), 12).await;

    let (status, body) = get(&test_app.app, WATERING_URI).await;
    assert_eq!(status.as_u16(), 503);
    assert_eq!(json_body(&body)["error"], "insufficient_data");
}

#[tokio::test]
async fn happy_path_composes_fifteen_days() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 1, 7);
    adapter
        .expect_fetch_daily()
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let (status, body) = get(&test_app.app, WATERING_URI).await;
    assert!(status.is_success());

    let response = json_body(&body);
    let days = response["days"].as_array().unwrap();
    assert_eq!(days.len(), 15);

    let today = test_app.tz.local_calendar_day(coords, now);
    let date_of = |day: &serde_json::Value| {
        test_app
            .tz
            .local_calendar_day(coords, day["local_midnight_epoch"].as_i64().unwrap())
    };

    // newest first: the far end of the forecast leads
    assert_eq!(days[0]["source"], "forecast");
    assert_eq!(date_of(&days[0]), today + chrono::Duration::days(7));
    assert_eq!(days[0]["provider"], "open-meteo");

    // the tail is the oldest measured day
    let last = days.last().unwrap();
    assert_eq!(last["source"], "local");
    assert_eq!(date_of(last), today - chrono::Duration::days(7));

    // strictly descending epochs, no calendar-day duplicates
    let epochs: Vec<i64> = days
        .iter()
        .map(|d| d["local_midnight_epoch"].as_i64().unwrap())
        .collect();
    assert!(epochs.windows(2).all(|w| w[0] > w[1]));
    let dates: HashSet<_> = days.iter().map(date_of).collect();
    assert_eq!(dates.len(), 15);
}

#[tokio::test]
async fn forecast_overlapping_today_is_filtered_out() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    // today plus six future days
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 0, 7);
    adapter
        .expect_fetch_daily()
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let (status, body) = get(&test_app.app, WATERING_URI).await;
    assert!(status.is_success());

    let response = json_body(&body);
    let days = response["days"].as_array().unwrap();
    let today = test_app.tz.local_calendar_day(coords, now);

    let forecast_entries: Vec<_> = days
        .iter()
        .filter(|d| d["source"] == "forecast")
        .collect();
    assert_eq!(forecast_entries.len(), 6);
    for entry in forecast_entries {
        let date = test_app
            .tz
            .local_calendar_day(coords, entry["local_midnight_epoch"].as_i64().unwrap());
        assert!(date > today);
    }
}

#[tokio::test]
async fn forecast_outage_degrades_to_local_only() {
    let now = unix_now();

    let mut adapter = mock_adapter();
    adapter
        .expect_fetch_daily()
        .returning(|_| Err(forecast::Error::Transient("upstream 502".into())));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let (status, body) = get(&test_app.app, WATERING_URI).await;
    assert!(status.is_success());

    let response = json_body(&body);
    let days = response["days"].as_array().unwrap();
    assert_eq!(days.len(), 8);
    assert!(days.iter().all(|d| d["source"] == "local"));
}

#[tokio::test]
async fn non_midnight_forecast_marks_filter_by_calendar_day() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    // upstream marks its days at 06:00 local instead of midnight
    let mut days = forecast_days(&crate::helpers::shared_tz(), coords, now, 0, 7);
    for day in &mut days {
        day.local_midnight_epoch += 6 * 3600;
    }
    adapter
        .expect_fetch_daily()
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let (status, body) = get(&test_app.app, WATERING_URI).await;
    assert!(status.is_success());

    let response = json_body(&body);
    let today = test_app.tz.local_calendar_day(coords, now);
    let forecast_dates: Vec<_> = response["days"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|d| d["source"] == "forecast")
        .map(|d| {
            test_app
                .tz
                .local_calendar_day(coords, d["local_midnight_epoch"].as_i64().unwrap())
        })
        .collect();

    // exactly the six days whose local date is strictly after today survive
    assert_eq!(forecast_dates.len(), 6);
    assert!(forecast_dates.iter().all(|date| *date > today));
}

#[tokio::test]
async fn series_is_cached_within_the_ttl() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 1, 7);
    adapter
        .expect_fetch_daily()
        .times(1)
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let composer = &test_app.state.composer;
    let tag = sprinklerd::ProviderTag::OpenMeteo;
    let first = composer.view_for_adjustment(coords, tag, now).await.unwrap();
    let second = composer
        .view_for_adjustment(coords, tag, now + CACHE_TTL_SECS)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn stale_series_is_recomposed() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 1, 7);
    adapter
        .expect_fetch_daily()
        .times(2)
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let composer = &test_app.state.composer;
    let tag = sprinklerd::ProviderTag::OpenMeteo;
    let first = composer.view_for_adjustment(coords, tag, now).await.unwrap();
    let second = composer
        .view_for_adjustment(coords, tag, now + CACHE_TTL_SECS + 1)
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn concurrent_misses_share_one_composition() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 1, 7);
    adapter
        .expect_fetch_daily()
        .times(1)
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let composer = test_app.state.composer.clone();
    let tag = sprinklerd::ProviderTag::OpenMeteo;
    let (a, b) = tokio::join!(
        composer.view_for_adjustment(coords, tag, now),
        composer.view_for_adjustment(coords, tag, now),
    );
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
}

#[tokio::test]
async fn unknown_provider_is_a_client_error() {
    let test_app = spawn_app(mock_adapter());

    let (status, body) = get(&test_app.app, "/watering?lat=40.7&lon=-74.0&provider=darksky").await;
    assert_eq!(status.as_u16(), 400);
    assert_eq!(json_body(&body)["error"], "invalid_provider");
}

#[tokio::test]
async fn weather_endpoint_returns_current_plus_forecast_tail() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 1, 7);
    adapter
        .expect_fetch_daily()
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    seed_half_hourly(&test_app.state.store, now, 8 * 24).await;

    let (status, body) = get(&test_app.app, WEATHER_URI).await;
    assert!(status.is_success());

    let response = json_body(&body);
    assert!(response["current"]["temp_f"].is_i64());
    assert!(response["current"]["humidity_pct"].is_i64());
    assert_eq!(response["current"]["raining"], false);

    let forecast = response["forecast"].as_array().unwrap();
    assert_eq!(forecast.len(), 7);
    assert!(forecast.iter().all(|d| d["source"] == "forecast"));
}

#[tokio::test]
async fn weather_endpoint_without_any_samples_is_insufficient() {
    let now = unix_now();
    let coords = test_coords();

    let mut adapter = mock_adapter();
    let days = forecast_days(&crate::helpers::shared_tz(), coords, now, 1, 7);
    adapter
        .expect_fetch_daily()
        .returning(move |_| Ok(days.clone()));
    let test_app = spawn_app(adapter);

    let (status, body) = get(&test_app.app, WEATHER_URI).await;
    assert_eq!(status.as_u16(), 503);
    assert_eq!(json_body(&body)["error"], "insufficient_data");
}
