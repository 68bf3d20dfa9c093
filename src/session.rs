//! Market-session clocks: the global calculation mode and per-market
//! trading status.
//!
//! The global trading day ends with the US close, around 05:00 Beijing time.
//! Between then and the A-share open the world is in a quiet period where
//! only the prior session is a meaningful baseline. All decisions take an
//! explicit instant so they can be pinned in tests; the argument-free
//! variants read the wall clock.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Asia::Shanghai;
use serde::Serialize;
use std::fmt;

use crate::ticker::Market;

/// Whether "today" or "the prior session" is the valid comparison baseline.
/// One global decision per valuation run, from Beijing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalculationMode {
    CurrentDay,
    PreviousDay,
}

impl fmt::Display for CalculationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculationMode::CurrentDay => write!(f, "current day"),
            CalculationMode::PreviousDay => write!(f, "previous session"),
        }
    }
}

/// Live trading status of one market at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Open,
    /// Mainland/HK midday halt between the two daily sessions.
    LunchBreak,
    /// A weekday before the morning open: this calendar day will trade.
    AwaitingOpen,
    /// After the afternoon close, still the same trading day.
    ClosedToday,
    Closed,
    Unknown,
}

impl SessionState {
    /// Whether a quote request is worth issuing for this market right now.
    pub fn is_quotable(&self) -> bool {
        matches!(
            self,
            SessionState::Open
                | SessionState::LunchBreak
                | SessionState::AwaitingOpen
                | SessionState::ClosedToday
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Open => "open",
            SessionState::LunchBreak => "lunch break",
            SessionState::AwaitingOpen => "pre-open",
            SessionState::ClosedToday => "closed today",
            SessionState::Closed => "closed",
            SessionState::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

// Session boundaries as seconds since local midnight.
const QUIET_START: u32 = 5 * 3600;
const MORNING_OPEN: u32 = 9 * 3600 + 30 * 60;
const MORNING_CLOSE: u32 = 11 * 3600 + 30 * 60;
const AFTERNOON_OPEN: u32 = 13 * 3600;
const AFTERNOON_CLOSE: u32 = 15 * 3600;
const US_OPEN: u32 = 9 * 3600 + 30 * 60;
const US_CLOSE: u32 = 16 * 3600;

/// Global calculation mode right now.
pub fn mode() -> CalculationMode {
    mode_at(Utc::now())
}

/// Global calculation mode at an explicit instant.
pub fn mode_at(now: DateTime<Utc>) -> CalculationMode {
    let beijing = now.with_timezone(&Shanghai);
    if is_weekend(beijing.weekday()) {
        return CalculationMode::PreviousDay;
    }
    let secs = beijing.time().num_seconds_from_midnight();
    if (QUIET_START..MORNING_OPEN).contains(&secs) {
        CalculationMode::PreviousDay
    } else {
        CalculationMode::CurrentDay
    }
}

/// Trading status of `market` right now.
pub fn status(market: Market) -> SessionState {
    status_at(market, Utc::now())
}

/// Trading status of `market` at an explicit instant. Total: every market
/// and instant yields a defined state.
pub fn status_at(market: Market, now: DateTime<Utc>) -> SessionState {
    match market {
        Market::Us => {
            let local = now.with_timezone(&New_York);
            if is_weekend(local.weekday()) {
                return SessionState::Closed;
            }
            let secs = local.time().num_seconds_from_midnight();
            if (US_OPEN..=US_CLOSE).contains(&secs) {
                SessionState::Open
            } else {
                SessionState::Closed
            }
        }
        Market::Shanghai | Market::Shenzhen | Market::Beijing | Market::HongKong => {
            let local = now.with_timezone(&Shanghai);
            if is_weekend(local.weekday()) {
                return SessionState::Closed;
            }
            let secs = local.time().num_seconds_from_midnight();
            if (MORNING_OPEN..=MORNING_CLOSE).contains(&secs)
                || (AFTERNOON_OPEN..=AFTERNOON_CLOSE).contains(&secs)
            {
                SessionState::Open
            } else if secs > MORNING_CLOSE && secs < AFTERNOON_OPEN {
                SessionState::LunchBreak
            } else if secs > AFTERNOON_CLOSE {
                SessionState::ClosedToday
            } else {
                SessionState::AwaitingOpen
            }
        }
        Market::Unknown => SessionState::Unknown,
    }
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}
