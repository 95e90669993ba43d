#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]

//! # Folio-Calendar
//! US equity market calendar and trade schedules for the Folio backtesting engine.
//!
//! Provides two layers:
//! * [`MarketCalendar`] - rule-generated market holidays, early closes, and
//!   trading-day phase classification (first/last trading day of week, month, year).
//! * [`Schedule`] - a cron-like predicate extended with phase tokens
//!   (`@monthend`, `@weekbegin`, ...) and a market-hours guard, answering
//!   `is_trade_day`, `next` and `prev` for any instant.
//!
//! All date-of-record computations use US Eastern time; the regular session
//! closes 16:00 local (13:00 on early-close days).

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Market holiday and early-close calendar, plus phase classification.
pub mod calendar;

/// Defines all possible errors in Folio-Calendar.
pub mod error;

/// Cron+phase [`Schedule`] predicate over market instants.
pub mod schedule;

pub use calendar::{Frequency, MarketCalendar, Phase};
pub use error::ScheduleError;
pub use schedule::{MarketHours, Schedule};

/// Reference timezone for all date-of-record computations.
pub const MARKET_TZ: Tz = chrono_tz::America::New_York;

/// Convert an instant to the reference (US Eastern) timezone.
pub fn eastern(time: DateTime<Utc>) -> DateTime<Tz> {
    time.with_timezone(&MARKET_TZ)
}

/// Calendar date of an instant in the reference timezone.
///
/// "Same day" comparisons must compare these, never raw epoch seconds.
pub fn eastern_date(time: DateTime<Utc>) -> NaiveDate {
    eastern(time).date_naive()
}

/// Resolve an Eastern wall-clock `(date, time)` to a UTC instant.
///
/// Session times (09:30, 13:00, 16:00, 20:00) never fall inside a DST
/// transition gap, which occurs at 02:00 local.
pub fn market_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    MARKET_TZ
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .expect("market session times do not fall in a DST gap")
        .with_timezone(&Utc)
}
