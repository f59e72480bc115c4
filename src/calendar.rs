//! Week assignment under the company's toll-week calendar
//!
//! Weeks run Monday through Sunday; week 1 of a year starts on the first
//! Monday on or after January 1. Dates before that Monday belong to the
//! previous year's final week (52 or 53). This is not ISO-8601 week
//! numbering: a year whose January 1 falls on Tuesday through Thursday is
//! offset by one from ISO for most of its dates.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::{TollError, TollResult};

/// A (year, week-number) pair under the first-Monday convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekId {
    /// Calendar year the week is counted in
    pub year: i32,
    /// Week number within that year, 1 through 53
    pub number: u32,
}

impl WeekId {
    /// Create a week id
    pub fn new(year: i32, number: u32) -> Self {
        Self { year, number }
    }

    /// The week that follows this one on the given calendar
    pub fn succ(&self, config: &WeekConfig) -> Self {
        let start = first_week_start(self.year, config);
        week_of(start + Duration::days(7 * i64::from(self.number)), config)
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.number)
    }
}

/// Per-year overrides for the Monday that starts week 1
///
/// The computed rule covers the normal case; some business years pin week 1
/// to a different Monday so invoice weeks stay aligned with the planning
/// calendar customers use. Those exceptions live here as explicit entries
/// instead of being baked into the algorithm. Empty by default.
///
/// A pinned Monday must lie between December 29 of the previous year and
/// January 7, so it is either the computed first Monday or the Monday one
/// week before it. Every year keeps 52 or 53 numbered weeks either way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekConfig {
    /// Year mapped to the Monday that starts week 1 of that year
    week_one_overrides: HashMap<i32, NaiveDate>,
}

impl WeekConfig {
    /// Create an empty config; the computed first-Monday rule applies everywhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin week 1 of `year` to an explicit Monday
    ///
    /// Accepts a Monday between December 29 of the previous year and
    /// January 7 of `year`; any other date is rejected as
    /// `TollError::Validation`.
    pub fn with_override(mut self, year: i32, week_one_monday: NaiveDate) -> TollResult<Self> {
        if week_one_monday.weekday() != Weekday::Mon {
            return Err(TollError::Validation(format!(
                "week 1 of {} must start on a Monday, got {}",
                year, week_one_monday
            )));
        }
        let earliest = NaiveDate::from_ymd_opt(year - 1, 12, 29)
            .expect("December 29 exists in every year");
        let latest =
            NaiveDate::from_ymd_opt(year, 1, 7).expect("January 7 exists in every year");
        if week_one_monday < earliest || week_one_monday > latest {
            return Err(TollError::Validation(format!(
                "week 1 of {} must start between {} and {}, got {}",
                year, earliest, latest, week_one_monday
            )));
        }
        self.week_one_overrides.insert(year, week_one_monday);
        Ok(self)
    }
}

/// The Monday that starts week 1 of `year`
pub fn first_week_start(year: i32, config: &WeekConfig) -> NaiveDate {
    if let Some(pinned) = config.week_one_overrides.get(&year) {
        return *pinned;
    }
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)
        .expect("January 1 of a year taken from an existing date should be valid");
    let days_until_monday = (7 - jan_first.weekday().num_days_from_monday() as i64) % 7;
    jan_first + Duration::days(days_until_monday)
}

/// Map a date to its (year, week-number) pair
///
/// The assignment depends only on the date's Monday: whichever year's
/// week 1 starts last without passing that Monday owns the week, so all
/// seven days of a week share one id. A date before its own year's first
/// Monday lands in the previous year's final week (52 or 53), and a late
/// December Monday opens the next year's week 1 when an override pins it
/// there.
pub fn week_of(date: NaiveDate, config: &WeekConfig) -> WeekId {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let base = monday.year();
    let next_start = first_week_start(base + 1, config);
    let own_start = first_week_start(base, config);
    let (year, start) = if next_start <= monday {
        (base + 1, next_start)
    } else if own_start <= monday {
        (base, own_start)
    } else {
        (base - 1, first_week_start(base - 1, config))
    };
    let number = ((monday - start).num_days() / 7) as u32 + 1;
    WeekId::new(year, number)
}

/// `week_of` with the default, override-free config
pub fn week_of_date(date: NaiveDate) -> WeekId {
    week_of(date, &WeekConfig::default())
}

/// Dutch weekday name as it appears in toll line descriptions
pub fn dutch_weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Maandag",
        Weekday::Tue => "Dinsdag",
        Weekday::Wed => "Woensdag",
        Weekday::Thu => "Donderdag",
        Weekday::Fri => "Vrijdag",
        Weekday::Sat => "Zaterdag",
        Weekday::Sun => "Zondag",
    }
}
