//! Meal record, owner profile, and the derived monthly view.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{MealStatus, OwnerId, YearMonth, now_ms};

/// One persisted deviation from the default meal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealRecord {
    /// Owner the record belongs to.
    pub owner_id: OwnerId,
    /// Calendar date, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Status for the date.
    pub status: MealStatus,
    /// Client-side construction time in milliseconds since epoch.
    pub timestamp: u64,
}

impl MealRecord {
    /// Builds a record stamped with the current time.
    pub fn new(owner_id: &OwnerId, date: NaiveDate, status: MealStatus) -> Self {
        Self {
            owner_id: owner_id.clone(),
            date,
            status,
            timestamp: now_ms(),
        }
    }

    /// Storage key `ownerId_YYYY-MM-DD`; also the upsert idempotency key.
    pub fn id(&self) -> String {
        record_id(&self.owner_id, self.date)
    }
}

/// Derived key for `(owner, date)`.
pub fn record_id(owner_id: &OwnerId, date: NaiveDate) -> String {
    format!("{}_{}", owner_id, date.format("%Y-%m-%d"))
}

/// Account profile stored in the `users` collection, keyed by owner id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Canonical owner id.
    pub id: OwnerId,
    /// Display name.
    pub full_name: String,
    /// Academic department.
    pub department: String,
    /// Human-chosen login alias; never a partition key.
    pub roll_number: String,
}

/// One rendered calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
    /// Date of the cell.
    pub date: NaiveDate,
    /// Effective status (explicit or defaulted).
    pub status: MealStatus,
    /// True when a record backs the status.
    pub explicit: bool,
}

/// Per-status day counts for a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonthStats {
    /// Days with meals on.
    pub meals_on: usize,
    /// Days with meals off.
    pub meals_off: usize,
    /// Days the hall is closed.
    pub hall_closed: usize,
}

/// Every day of the displayed month with its effective status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyView {
    /// Displayed month.
    pub month: YearMonth,
    /// Cells in date order, one per day.
    pub days: Vec<DayCell>,
}

impl MonthlyView {
    /// Empty grid slots before day 1 in a Sunday-first week layout.
    pub fn leading_blanks(&self) -> usize {
        self.month.first_day().weekday().num_days_from_sunday() as usize
    }

    /// Cell for `date`, if it falls in this month.
    pub fn cell(&self, date: NaiveDate) -> Option<&DayCell> {
        self.days.iter().find(|c| c.date == date)
    }

    /// Counts days per status.
    pub fn stats(&self) -> MonthStats {
        self.days
            .iter()
            .fold(MonthStats::default(), |mut acc, cell| {
                match cell.status {
                    MealStatus::MealOn => acc.meals_on += 1,
                    MealStatus::MealOff => acc.meals_off += 1,
                    MealStatus::HallClosed => acc.hall_closed += 1,
                }
                acc
            })
    }
}
