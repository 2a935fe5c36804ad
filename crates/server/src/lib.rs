//! Hybrid weather composition and watering-window engine.
//!
//! The service ingests pushes from a personal weather station, aggregates
//! them into per-local-day metrics, composes them with an upstream forecast,
//! and serves the combined series to irrigation controllers.

pub mod aggregate;
pub mod compose;
pub mod error;
pub mod forecast;
pub mod local;
pub mod routes;
pub mod startup;
pub mod store;
pub mod tz;
pub mod utils;

pub use aggregate::{aggregate, DayBucket};
pub use compose::{
    HybridComposer, SeriesDay, SeriesSource, CACHE_TTL_SECS, DEGRADED_TTL_SECS,
};
pub use error::{Error, ErrorBody};
pub use forecast::{AdapterRegistry, ForecastAdapter, ForecastDay, ProviderTag};
pub use local::{CurrentConditions, LocalProvider};
pub use routes::{WateringQuery, WateringResponse, WeatherResponse, WuUpdateParams};
pub use startup::{app, build_app_state, AppState};
pub use store::{
    prepare_persistence_dir, run_persistence, Observation, ObservationStore, Sample,
    OBSERVATIONS_FILE, RETENTION_SECS,
};
pub use tz::{Coordinates, TimeZoneResolver};
pub use utils::{get_config_info, get_log_level, setup_logger, unix_now, Cli};
