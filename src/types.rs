//! Shared primitive identifiers, month arithmetic, and the meal status enum.

use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{Datelike, Days, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Canonical identity-provider identifier that partitions all records.
///
/// This is never a human-chosen alias such as a roll number: records are
/// written and queried under the same value, so an alias here would make
/// every month read back empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wraps an identifier issued by the identity provider.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrowed identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure to parse one of the textual primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not one of `MEAL_ON`, `MEAL_OFF`, `HALL_CLOSED`.
    #[error("unknown meal status `{0}`")]
    Status(String),
    /// Not a `YYYY-MM` month.
    #[error("invalid year-month `{0}`, expected YYYY-MM")]
    YearMonth(String),
}

/// Per-day meal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MealStatus {
    /// Meal is taken (the implied state of any day without a record).
    #[default]
    MealOn,
    /// Meal is skipped.
    MealOff,
    /// Hall kitchen is closed for the day.
    HallClosed,
}

impl MealStatus {
    /// Status assumed for a date with no stored record.
    pub const DEFAULT: Self = Self::MealOn;

    /// Every status in cycle order.
    pub const ALL: [Self; 3] = [Self::MealOn, Self::MealOff, Self::HallClosed];

    /// Next status in the fixed tap cycle `MEAL_ON -> MEAL_OFF -> HALL_CLOSED -> MEAL_ON`.
    pub fn next(self) -> Self {
        match self {
            Self::MealOn => Self::MealOff,
            Self::MealOff => Self::HallClosed,
            Self::HallClosed => Self::MealOn,
        }
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MealOn => "MEAL_ON",
            Self::MealOff => "MEAL_OFF",
            Self::HallClosed => "HALL_CLOSED",
        }
    }
}

impl fmt::Display for MealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseError::Status(s.to_string()))
    }
}

/// Calendar month, the unit of fetch and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    first: NaiveDate,
}

impl YearMonth {
    /// Returns `None` when `month` is not in `1..=12` or the year is out of range.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    /// Month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            first: date - Days::new(u64::from(date.day0())),
        }
    }

    /// Month containing today's local date.
    pub fn current() -> Self {
        Self::of(Local::now().date_naive())
    }

    /// Calendar year.
    pub fn year(self) -> i32 {
        self.first.year()
    }

    /// Month number, `1..=12`.
    pub fn month(self) -> u32 {
        self.first.month()
    }

    /// First day of the month.
    pub fn first_day(self) -> NaiveDate {
        self.first
    }

    /// Moves by `delta` months, crossing year boundaries as needed.
    ///
    /// Stays put at the edge of the representable date range.
    pub fn shift(self, delta: i32) -> Self {
        let months = Months::new(delta.unsigned_abs());
        let moved = if delta >= 0 {
            self.first.checked_add_months(months)
        } else {
            self.first.checked_sub_months(months)
        };
        moved.map_or(self, |first| Self { first })
    }

    /// Every date of the month in ascending order.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let month = self.first.month();
        self.first.iter_days().take_while(move |d| d.month() == month)
    }

    /// Number of days in the month.
    pub fn len_days(self) -> usize {
        self.days().count()
    }

    /// True when `date` formatted as `YYYY-MM-DD` starts with this month's `YYYY-MM`.
    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.first.year() && date.month() == self.first.month()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::YearMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !digits(year) || !digits(month) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
