use crate::{
    calendar::{MarketCalendar, Phase},
    eastern, eastern_date,
    error::ScheduleError,
    market_instant,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on the day-scan performed by [`Schedule::next`] / [`Schedule::prev`].
///
/// Every parseable schedule fires at least once a year, so ten years of days
/// is unreachable for anything the parser accepts.
const MAX_SCAN_DAYS: usize = 3700;

/// Market-hours guard applied to a [`Schedule`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum MarketHours {
    /// 09:30 - 16:00 Eastern (13:00 on early-close days).
    Regular,
    /// 04:00 - 20:00 Eastern.
    Extended,
    /// 20:00 - 04:00 Eastern.
    Overnight,
}

impl MarketHours {
    fn open(&self, calendar: &MarketCalendar) -> NaiveTime {
        match self {
            Self::Regular => calendar.session_open(),
            Self::Extended => NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            Self::Overnight => NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }

    fn close(&self, calendar: &MarketCalendar, date: NaiveDate) -> NaiveTime {
        match self {
            Self::Regular => calendar.session_close(date),
            Self::Extended => NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            Self::Overnight => NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
        }
    }

    fn in_session(&self, calendar: &MarketCalendar, date: NaiveDate, time: NaiveTime) -> bool {
        let open = self.open(calendar);
        let close = self.close(calendar, date);
        match self {
            // Overnight spans midnight: (20:00..24:00) U (00:00..04:00].
            Self::Overnight => time >= open || time <= close,
            _ => time >= open && time <= close,
        }
    }
}

/// Time-of-day anchor of a [`Schedule`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
enum Anchor {
    /// Fire at the session open.
    Open,
    /// Fire at the session close.
    Close,
    /// Fire at every in-session instant matching the cron minute/hour fields.
    Cron,
}

/// Cron-like trade schedule extended with phase tokens and a market-hours guard.
///
/// Recognised tokens, in order: `@open` | `@close`, `@monthbegin` | `@monthend`
/// | `@weekbegin` | `@weekend`, then an optional standard five-field cron
/// expression (`minute hour day-of-month month day-of-week`). With an
/// `@open`/`@close` anchor the minute and hour fields are implied by the
/// session and only the date fields constrain matches.
///
/// ```
/// use folio_calendar::{MarketHours, Schedule};
///
/// let schedule = Schedule::parse("@monthend @close", MarketHours::Regular).unwrap();
/// let month_close = "2021-06-30T20:00:00Z".parse().unwrap();
/// assert!(schedule.is_trade_day(month_close));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Schedule {
    phase: Option<Phase>,
    anchor: Anchor,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    market_hours: MarketHours,
}

impl Schedule {
    /// Parse a schedule expression under the provided market-hours guard.
    pub fn parse(expr: &str, market_hours: MarketHours) -> Result<Self, ScheduleError> {
        let mut phase = None;
        let mut anchor = None;
        let mut cron = Vec::new();

        for token in expr.split_whitespace() {
            match token {
                "@open" => anchor = Some(Anchor::Open),
                "@close" => anchor = Some(Anchor::Close),
                "@monthbegin" => phase = Some(Phase::MonthBegin),
                "@monthend" => phase = Some(Phase::MonthEnd),
                "@weekbegin" => phase = Some(Phase::WeekBegin),
                "@weekend" => phase = Some(Phase::WeekEnd),
                other if other.starts_with('@') => {
                    return Err(ScheduleError::Parse(format!("unknown token: {other}")));
                }
                other => cron.push(other),
            }
        }

        let (minutes, hours, days_of_month, months, days_of_week) = match cron.len() {
            0 => (
                field_all(0, 59),
                field_all(0, 23),
                field_all(1, 31),
                field_all(1, 12),
                field_all(0, 6),
            ),
            5 => (
                parse_field(cron[0], 0, 59)?,
                parse_field(cron[1], 0, 23)?,
                parse_field(cron[2], 1, 31)?,
                parse_field(cron[3], 1, 12)?,
                parse_dow_field(cron[4])?,
            ),
            n => {
                return Err(ScheduleError::Parse(format!(
                    "expected 5 cron fields, found {n}: {expr}"
                )));
            }
        };

        Ok(Self {
            phase,
            // A schedule without explicit cron fields defaults to the close.
            anchor: anchor.unwrap_or(if cron.is_empty() {
                Anchor::Close
            } else {
                Anchor::Cron
            }),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            market_hours,
        })
    }

    /// Regular-hours close on every trading day.
    pub fn daily_close() -> Self {
        Self::parse("@close", MarketHours::Regular).expect("static expression parses")
    }

    /// Regular-hours close on the last trading day of every week.
    pub fn week_end_close() -> Self {
        Self::parse("@weekend @close", MarketHours::Regular).expect("static expression parses")
    }

    /// Regular-hours close on the last trading day of every month.
    pub fn month_end_close() -> Self {
        Self::parse("@monthend @close", MarketHours::Regular).expect("static expression parses")
    }

    /// Market-hours guard this schedule was built with.
    pub fn market_hours(&self) -> MarketHours {
        self.market_hours
    }

    fn calendar(&self) -> &'static MarketCalendar {
        MarketCalendar::nyse()
    }

    /// True iff `time` is an open market instant satisfying the cron+phase predicate.
    pub fn is_trade_day(&self, time: DateTime<Utc>) -> bool {
        let local = eastern(time);
        let date = local.date_naive();
        let calendar = self.calendar();

        if !calendar.is_trading_day(date) || !self.date_matches(date) {
            return false;
        }
        if let Some(phase) = self.phase
            && !calendar.is_phase_day(date, phase)
        {
            return false;
        }

        match self.anchor {
            Anchor::Open => time == market_instant(date, self.market_hours.open(calendar)),
            Anchor::Close => {
                time == market_instant(date, self.market_hours.close(calendar, date))
            }
            Anchor::Cron => {
                self.minutes & (1 << local.minute()) != 0
                    && self.hours & (1 << local.hour()) != 0
                    && local.second() == 0
                    && self
                        .market_hours
                        .in_session(calendar, date, local.time())
            }
        }
    }

    /// Smallest trade instant strictly greater than `time`. Deterministic and total.
    pub fn next(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = eastern_date(time);
        for _ in 0..MAX_SCAN_DAYS {
            if let Some(found) = self
                .instants_on(date)
                .into_iter()
                .find(|candidate| *candidate > time && self.is_trade_day(*candidate))
            {
                return found;
            }
            date = date.succ_opt().expect("calendar date overflow");
        }
        unreachable!("schedule produced no trade instant within {MAX_SCAN_DAYS} days of {time}")
    }

    /// Largest trade instant strictly less than `time`. Symmetric to [`Self::next`].
    pub fn prev(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = eastern_date(time);
        for _ in 0..MAX_SCAN_DAYS {
            if let Some(found) = self
                .instants_on(date)
                .into_iter()
                .rev()
                .find(|candidate| *candidate < time && self.is_trade_day(*candidate))
            {
                return found;
            }
            date = date.pred_opt().expect("calendar date underflow");
        }
        unreachable!("schedule produced no trade instant within {MAX_SCAN_DAYS} days of {time}")
    }

    /// Every trade instant in `[begin, end]`, ascending.
    pub fn between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        if begin > end {
            return Err(ScheduleError::IntervalInvalid { begin, end });
        }

        let mut instants = Vec::new();
        let mut current = if self.is_trade_day(begin) {
            begin
        } else {
            self.next(begin)
        };
        while current <= end {
            instants.push(current);
            current = self.next(current);
        }
        Ok(instants)
    }

    /// Last trading day of the Monday-Sunday week containing `time`.
    pub fn last_trading_day_of_week(&self, time: DateTime<Utc>) -> NaiveDate {
        self.calendar().last_trading_day_of_week(eastern_date(time))
    }

    /// Last trading day of the month containing `time`.
    pub fn last_trading_day_of_month(&self, time: DateTime<Utc>) -> NaiveDate {
        let date = eastern_date(time);
        self.calendar()
            .last_trading_day_of_month(date.year(), date.month())
    }

    /// Last trading day of the year containing `time`.
    pub fn last_trading_day_of_year(&self, time: DateTime<Utc>) -> NaiveDate {
        self.calendar()
            .last_trading_day_of_month(eastern_date(time).year(), 12)
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        self.days_of_month & (1 << date.day()) != 0
            && self.months & (1 << date.month()) != 0
            && self.days_of_week & (1 << date.weekday().num_days_from_sunday()) != 0
    }

    /// Candidate instants on an Eastern date, ascending. Date-level predicates
    /// are pre-filtered; callers re-validate with [`Self::is_trade_day`].
    fn instants_on(&self, date: NaiveDate) -> Vec<DateTime<Utc>> {
        let calendar = self.calendar();

        if !calendar.is_trading_day(date) || !self.date_matches(date) {
            return Vec::new();
        }
        if let Some(phase) = self.phase
            && !calendar.is_phase_day(date, phase)
        {
            return Vec::new();
        }

        match self.anchor {
            Anchor::Open => vec![market_instant(date, self.market_hours.open(calendar))],
            Anchor::Close => vec![market_instant(
                date,
                self.market_hours.close(calendar, date),
            )],
            Anchor::Cron => {
                let mut instants = Vec::new();
                for hour in 0..24u32 {
                    if self.hours & (1 << hour) == 0 {
                        continue;
                    }
                    for minute in 0..60u32 {
                        if self.minutes & (1 << minute) == 0 {
                            continue;
                        }
                        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
                        if self.market_hours.in_session(calendar, date, time) {
                            instants.push(market_instant(date, time));
                        }
                    }
                }
                instants
            }
        }
    }
}

fn field_all(min: u32, max: u32) -> u64 {
    (min..=max).fold(0, |acc, value| acc | (1 << value))
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<u64, ScheduleError> {
    let mut bits = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| ScheduleError::Parse(format!("bad step: {part}")))?;
                if step == 0 {
                    return Err(ScheduleError::Parse(format!("zero step: {part}")));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = match range {
            "*" => (min, max),
            _ => match range.split_once('-') {
                Some((lo, hi)) => {
                    let lo = lo
                        .parse()
                        .map_err(|_| ScheduleError::Parse(format!("bad range: {part}")))?;
                    let hi = hi
                        .parse()
                        .map_err(|_| ScheduleError::Parse(format!("bad range: {part}")))?;
                    (lo, hi)
                }
                None => {
                    let value = range
                        .parse()
                        .map_err(|_| ScheduleError::Parse(format!("bad value: {part}")))?;
                    (value, value)
                }
            },
        };

        if lo < min || hi > max || lo > hi {
            return Err(ScheduleError::Parse(format!(
                "field out of bounds [{min}, {max}]: {part}"
            )));
        }

        bits |= (lo..=hi)
            .step_by(step as usize)
            .fold(0, |acc, value| acc | (1 << value));
    }

    Ok(bits)
}

/// Day-of-week field: 0-7 where both 0 and 7 are Sunday.
fn parse_dow_field(field: &str) -> Result<u64, ScheduleError> {
    let bits = parse_field(field, 0, 7)?;
    let sunday_wrap = if bits & (1 << 7) != 0 { 1 } else { 0 };
    Ok((bits & 0x7f) | sunday_wrap)
}
