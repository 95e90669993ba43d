use crate::market_instant;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};
use std::{ops::RangeInclusive, sync::OnceLock};

/// First year of generated calendar rules.
const YEAR_MIN: i32 = 1970;

/// Last year of generated calendar rules.
const YEAR_MAX: i32 = 2060;

/// Trading-day phase within a week, month or year.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Phase {
    WeekBegin,
    WeekEnd,
    MonthBegin,
    MonthEnd,
    YearBegin,
    YearEnd,
}

/// Resampling frequency for date-indexed data, classified against the market
/// calendar at the regular-hours session close.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Frequency {
    Daily,
    WeekBegin,
    WeekEnd,
    MonthBegin,
    MonthEnd,
    YearBegin,
    YearEnd,
}

impl Frequency {
    /// `Weekly` is an alias for the last trading day of the week.
    pub const WEEKLY: Self = Self::WeekEnd;
    /// `Monthly` is an alias for the last trading day of the month.
    pub const MONTHLY: Self = Self::MonthEnd;
    /// `Annually` is an alias for the last trading day of the year.
    pub const ANNUALLY: Self = Self::YearEnd;

    /// The phase a row must satisfy, or `None` for every trading day.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Daily => None,
            Self::WeekBegin => Some(Phase::WeekBegin),
            Self::WeekEnd => Some(Phase::WeekEnd),
            Self::MonthBegin => Some(Phase::MonthBegin),
            Self::MonthEnd => Some(Phase::MonthEnd),
            Self::YearBegin => Some(Phase::YearBegin),
            Self::YearEnd => Some(Phase::YearEnd),
        }
    }
}

/// Market holiday set and early-close schedule for a US equity venue.
///
/// Generated from observance rules rather than a static table so that any
/// simulation range inside `[YEAR_MIN, YEAR_MAX]` classifies identically on
/// every run. Entries are immutable after construction.
#[derive(Debug)]
pub struct MarketCalendar {
    holidays: FnvHashSet<NaiveDate>,
    early_closes: FnvHashSet<NaiveDate>,
    years: RangeInclusive<i32>,
}

impl MarketCalendar {
    /// Process-wide NYSE calendar. Populated once, never mutated.
    pub fn nyse() -> &'static Self {
        static NYSE: OnceLock<MarketCalendar> = OnceLock::new();
        NYSE.get_or_init(|| Self::generate(YEAR_MIN..=YEAR_MAX))
    }

    /// Generate the calendar for an inclusive range of years.
    pub fn generate(years: RangeInclusive<i32>) -> Self {
        let mut holidays = FnvHashSet::default();
        let mut early_closes = FnvHashSet::default();

        for year in years.clone() {
            push_holidays(year, &mut holidays);
        }

        // Early closes depend on the holiday set (eg/ July 3rd is a half-day
        // only when it is itself a weekday trading day).
        for year in years.clone() {
            push_early_closes(year, &holidays, &mut early_closes);
        }

        Self {
            holidays,
            early_closes,
            years,
        }
    }

    /// True iff the market is open on the provided Eastern calendar date.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// True iff the provided date is a 13:00 early close.
    pub fn is_early_close(&self, date: NaiveDate) -> bool {
        self.early_closes.contains(&date)
    }

    /// Regular session open, 09:30 Eastern.
    pub fn session_open(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(9, 30, 0).unwrap()
    }

    /// Regular session close for the provided date: 16:00 Eastern, or 13:00
    /// on early-close days.
    pub fn session_close(&self, date: NaiveDate) -> NaiveTime {
        if self.is_early_close(date) {
            NaiveTime::from_hms_opt(13, 0, 0).unwrap()
        } else {
            NaiveTime::from_hms_opt(16, 0, 0).unwrap()
        }
    }

    /// UTC instant of the regular session close on the provided Eastern date.
    pub fn close_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        market_instant(date, self.session_close(date))
    }

    /// UTC instant of the regular session open on the provided Eastern date.
    pub fn open_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        market_instant(date, self.session_open())
    }

    /// Next trading day strictly after the provided date.
    pub fn next_trading_day(&self, mut date: NaiveDate) -> NaiveDate {
        loop {
            date = date.succ_opt().expect("calendar date overflow");
            if self.is_trading_day(date) {
                return date;
            }
        }
    }

    /// Previous trading day strictly before the provided date.
    pub fn prev_trading_day(&self, mut date: NaiveDate) -> NaiveDate {
        loop {
            date = date.pred_opt().expect("calendar date underflow");
            if self.is_trading_day(date) {
                return date;
            }
        }
    }

    /// Classify a trading day against a [`Phase`].
    ///
    /// Weeks run Monday through Sunday. A non-trading day satisfies no phase.
    pub fn is_phase_day(&self, date: NaiveDate, phase: Phase) -> bool {
        if !self.is_trading_day(date) {
            return false;
        }

        match phase {
            Phase::WeekBegin => self.first_trading_day_of_week(date) == date,
            Phase::WeekEnd => self.last_trading_day_of_week(date) == date,
            Phase::MonthBegin => self.first_trading_day_of_month(date.year(), date.month()) == date,
            Phase::MonthEnd => self.last_trading_day_of_month(date.year(), date.month()) == date,
            Phase::YearBegin => self.first_trading_day_of_month(date.year(), 1) == date,
            Phase::YearEnd => self.last_trading_day_of_month(date.year(), 12) == date,
        }
    }

    /// First trading day of the Monday-Sunday week containing the date.
    pub fn first_trading_day_of_week(&self, date: NaiveDate) -> NaiveDate {
        let monday = date - chrono::Days::new(date.weekday().num_days_from_monday() as u64);
        let mut day = monday;
        while !self.is_trading_day(day) {
            day = day.succ_opt().expect("calendar date overflow");
        }
        day
    }

    /// Last trading day of the Monday-Sunday week containing the date.
    pub fn last_trading_day_of_week(&self, date: NaiveDate) -> NaiveDate {
        let offset = 4u64.saturating_sub(date.weekday().num_days_from_monday() as u64);
        let mut day = date + chrono::Days::new(offset);
        while !self.is_trading_day(day) {
            day = day.pred_opt().expect("calendar date underflow");
        }
        day
    }

    /// First trading day of the provided month.
    pub fn first_trading_day_of_month(&self, year: i32, month: u32) -> NaiveDate {
        let mut day = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
        while !self.is_trading_day(day) {
            day = day.succ_opt().expect("calendar date overflow");
        }
        day
    }

    /// Last trading day of the provided month.
    pub fn last_trading_day_of_month(&self, year: i32, month: u32) -> NaiveDate {
        let mut day = last_day_of_month(year, month);
        while !self.is_trading_day(day) {
            day = day.pred_opt().expect("calendar date underflow");
        }
        day
    }

    /// Inclusive year range the rules were generated for.
    pub fn years(&self) -> &RangeInclusive<i32> {
        &self.years
    }
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::generate(YEAR_MIN..=YEAR_MAX)
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .expect("valid month")
        .pred_opt()
        .expect("valid date")
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, nth: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let offset = (7 + weekday.num_days_from_monday() as i64
        - first.weekday().num_days_from_monday() as i64)
        % 7;
    first + chrono::Days::new(offset as u64 + 7 * (nth as u64 - 1))
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let last = last_day_of_month(year, month);
    let offset = (7 + last.weekday().num_days_from_monday() as i64
        - weekday.num_days_from_monday() as i64)
        % 7;
    last - chrono::Days::new(offset as u64)
}

/// Gregorian Easter Sunday (anonymous computus).
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).expect("valid easter date")
}

/// Shift a fixed-date holiday to its observed weekday: Sunday observances
/// move to Monday, Saturday observances to the preceding Friday.
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.pred_opt(),
        Weekday::Sun => date.succ_opt(),
        _ => Some(date),
    }
}

fn push_holidays(year: i32, holidays: &mut FnvHashSet<NaiveDate>) {
    let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d).expect("valid date");

    // New Year's Day. A Saturday January 1st is not observed on the
    // preceding Friday (that session belongs to the prior year).
    let new_year = ymd(1, 1);
    match new_year.weekday() {
        Weekday::Sat => {}
        Weekday::Sun => {
            holidays.insert(ymd(1, 2));
        }
        _ => {
            holidays.insert(new_year);
        }
    }

    // Martin Luther King Jr. Day, third Monday of January, observed since 1998.
    if year >= 1998 {
        holidays.insert(nth_weekday(year, 1, Weekday::Mon, 3));
    }

    // Washington's Birthday, third Monday of February.
    holidays.insert(nth_weekday(year, 2, Weekday::Mon, 3));

    // Good Friday.
    holidays.insert(easter_sunday(year) - chrono::Days::new(2));

    // Memorial Day, last Monday of May.
    holidays.insert(last_weekday(year, 5, Weekday::Mon));

    // Juneteenth, observed since 2022.
    if year >= 2022
        && let Some(day) = observed(ymd(6, 19))
    {
        holidays.insert(day);
    }

    // Independence Day.
    if let Some(day) = observed(ymd(7, 4)) {
        holidays.insert(day);
    }

    // Labor Day, first Monday of September.
    holidays.insert(nth_weekday(year, 9, Weekday::Mon, 1));

    // Thanksgiving, fourth Thursday of November.
    holidays.insert(nth_weekday(year, 11, Weekday::Thu, 4));

    // Christmas Day.
    if let Some(day) = observed(ymd(12, 25)) {
        holidays.insert(day);
    }
}

fn push_early_closes(
    year: i32,
    holidays: &FnvHashSet<NaiveDate>,
    early_closes: &mut FnvHashSet<NaiveDate>,
) {
    let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d).expect("valid date");
    let is_session =
        |d: NaiveDate| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&d);

    // Day after Thanksgiving.
    let friday_after = nth_weekday(year, 11, Weekday::Thu, 4) + chrono::Days::new(1);
    if is_session(friday_after) {
        early_closes.insert(friday_after);
    }

    // July 3rd, when it is itself a session day.
    let july_third = ymd(7, 3);
    if is_session(july_third) {
        early_closes.insert(july_third);
    }

    // Christmas Eve, when it is itself a session day.
    let christmas_eve = ymd(12, 24);
    if is_session(christmas_eve) {
        early_closes.insert(christmas_eve);
    }
}
