//! Coordinate to time-zone resolution.
//!
//! Every day boundary in the engine is computed in the civil time zone of the
//! request coordinates, never in server-local time. The resolver maps a
//! `(lat, lon)` pair to an IANA zone and exposes the two derived quantities
//! the rest of the engine consumes: the epoch of local midnight and the local
//! calendar date.

use std::str::FromStr;

use chrono::{DateTime, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use log::debug;
use serde::{Deserialize, Serialize};
use tzf_rs::DefaultFinder;
use utoipa::ToSchema;

/// A latitude/longitude pair, request-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// Resolves coordinates to an IANA zone and computes local day boundaries.
///
/// The embedded zone-boundary index is large; build one resolver at startup
/// and share it behind an `Arc`.
pub struct TimeZoneResolver {
    finder: DefaultFinder,
}

impl Default for TimeZoneResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeZoneResolver {
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }

    /// The IANA zone covering `coords`. Coordinates outside any zone
    /// (open ocean, bad input) fall back to UTC.
    pub fn zone(&self, coords: Coordinates) -> Tz {
        let name = self.finder.get_tz_name(coords.lon, coords.lat);
        match Tz::from_str(name) {
            Ok(tz) => tz,
            Err(_) => {
                debug!("no IANA zone for {}, falling back to UTC", coords);
                Tz::UTC
            }
        }
    }

    /// Epoch seconds of 00:00:00 local time on the calendar day containing
    /// `instant` at `coords`.
    pub fn local_midnight(&self, coords: Coordinates, instant: i64) -> i64 {
        let tz = self.zone(coords);
        let date = utc_instant(instant).with_timezone(&tz).date_naive();
        midnight_epoch(tz, date)
    }

    /// The local calendar date of `instant` at `coords`.
    pub fn local_calendar_day(&self, coords: Coordinates, instant: i64) -> NaiveDate {
        let tz = self.zone(coords);
        utc_instant(instant).with_timezone(&tz).date_naive()
    }

    /// Epoch seconds of local midnight on a specific calendar date at
    /// `coords`. Used by forecast adapters to anchor upstream dates.
    pub fn local_midnight_for_date(&self, coords: Coordinates, date: NaiveDate) -> i64 {
        midnight_epoch(self.zone(coords), date)
    }
}

fn utc_instant(epoch: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(epoch, 0).unwrap_or_default()
}

fn midnight_epoch(tz: Tz, date: NaiveDate) -> i64 {
    let civil = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    match tz.from_local_datetime(&civil) {
        LocalResult::Single(dt) => dt.timestamp(),
        // DST fold: two midnights exist, take the earlier one
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
        // DST gap: midnight was skipped, the day starts where the gap ends
        LocalResult::None => {
            let after_gap = civil + chrono::Duration::hours(1);
            match tz.from_local_datetime(&after_gap) {
                LocalResult::Single(dt) => dt.timestamp(),
                LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
                LocalResult::None => Utc.from_utc_datetime(&civil).timestamp(),
            }
        }
    }
}
