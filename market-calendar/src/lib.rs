// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Exchange session calendar. All date walks skip weekends and exchange
//! holidays; a bare weekday check is only used when the NYSE calendar cannot
//! answer for a date.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use log::warn;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use trading_calendar::{Market, TradingCalendar};

/// Calendar days a walk may examine before giving up.
pub const DEFAULT_MAX_WALK_DAYS: u32 = 30;

pub const EXCHANGE_TZ: Tz = New_York;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("no trading day within {max_days} days of {from}")]
    NoTradingDay { from: NaiveDate, max_days: u32 },
    #[error("calendar backend unavailable: {0}")]
    Backend(String),
}

fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN)
}

fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Date `now` falls on in the exchange timezone.
pub fn exchange_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&EXCHANGE_TZ).date_naive()
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub trait SessionCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    fn max_walk_days(&self) -> u32 {
        DEFAULT_MAX_WALK_DAYS
    }

    /// Nearest trading day strictly before `date`.
    fn previous_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let max_days = self.max_walk_days();
        let mut current = date;
        for _ in 0..max_days {
            current = current
                .pred_opt()
                .ok_or(CalendarError::NoTradingDay { from: date, max_days })?;
            if self.is_trading_day(current) {
                return Ok(current);
            }
        }
        Err(CalendarError::NoTradingDay { from: date, max_days })
    }

    /// Nearest trading day strictly after `date`.
    fn next_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let max_days = self.max_walk_days();
        let mut current = date;
        for _ in 0..max_days {
            current = current
                .succ_opt()
                .ok_or(CalendarError::NoTradingDay { from: date, max_days })?;
            if self.is_trading_day(current) {
                return Ok(current);
            }
        }
        Err(CalendarError::NoTradingDay { from: date, max_days })
    }

    fn last_trading_day_on_or_before(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        if self.is_trading_day(date) {
            return Ok(date);
        }
        self.previous_trading_day(date)
    }

    /// Trading days in `[start, end]`, ascending. Empty when `start > end`.
    fn trading_days_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter(|day| self.is_trading_day(*day))
            .collect()
    }

    /// True when some trading day `d` satisfies `a < d < b`.
    fn has_trading_days_strictly_between(&self, a: NaiveDate, b: NaiveDate) -> bool {
        let Some(first) = a.succ_opt() else {
            return false;
        };
        first
            .iter_days()
            .take_while(|day| *day < b)
            .any(|day| self.is_trading_day(day))
    }

    /// Regular session (09:30 to 16:00 exchange time) is in progress.
    fn is_session_live(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&EXCHANGE_TZ);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }
        let time = local.time();
        time >= session_open() && time < session_close()
    }

    /// Most recent completed session as of `now`: the day before today in the
    /// exchange timezone, walked back to a trading day.
    fn last_completed_session(&self, now: DateTime<Utc>) -> Result<NaiveDate, CalendarError> {
        let yesterday = exchange_date(now) - Duration::days(1);
        self.last_trading_day_on_or_before(yesterday)
    }
}

/// NYSE calendar backed by `trading_calendar`, memoized per date.
pub struct NyseCalendar {
    inner: Mutex<TradingCalendar>,
    memo: Mutex<HashMap<NaiveDate, bool>>,
    max_walk_days: u32,
}

impl NyseCalendar {
    pub fn new() -> Result<Self, CalendarError> {
        let inner =
            TradingCalendar::new(Market::NYSE).map_err(|err| CalendarError::Backend(err.to_string()))?;
        Ok(Self {
            inner: Mutex::new(inner),
            memo: Mutex::new(HashMap::new()),
            max_walk_days: DEFAULT_MAX_WALK_DAYS,
        })
    }

    pub fn with_max_walk_days(mut self, days: u32) -> Self {
        self.max_walk_days = days.max(1);
        self
    }
}

impl SessionCalendar for NyseCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        if let Some(hit) = self.memo.lock().get(&date) {
            return *hit;
        }
        let answer = match self.inner.lock().is_trading_day(date) {
            Ok(open) => open,
            Err(err) => {
                warn!("[calendar] NYSE lookup failed for {date}: {err}; using weekday rule");
                !is_weekend(date)
            }
        };
        self.memo.lock().insert(date, answer);
        answer
    }

    fn max_walk_days(&self) -> u32 {
        self.max_walk_days
    }
}

/// Weekends plus an explicit holiday set.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn weekends_only() -> Self {
        Self::default()
    }
}

impl SessionCalendar for HolidayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.holidays.contains(&date)
    }
}
