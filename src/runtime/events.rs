//! Runtime event stream payloads.

use chrono::NaiveDate;

use crate::{
    core::batch::SaveOutcome,
    persist::StoreError,
    types::{MealStatus, YearMonth},
};

/// Events emitted from the screen runtime loop, in the order it handled them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MealEvent {
    /// The displayed month changed; the calendar shows defaults until loaded.
    MonthChanged {
        /// Previously displayed month.
        from: YearMonth,
        /// Newly displayed month.
        to: YearMonth,
    },
    /// A month's records were applied.
    MonthLoaded {
        /// Loaded month.
        month: YearMonth,
        /// Records applied.
        records: usize,
    },
    /// Fetch failed; the month is shown with every day defaulted.
    LoadFailed {
        /// Month that failed.
        month: YearMonth,
        /// Store failure.
        error: StoreError,
    },
    /// A day's status was cycled locally.
    StatusChanged {
        /// Cycled date.
        date: NaiveDate,
        /// New status.
        status: MealStatus,
    },
    /// Unsaved edits were dropped.
    UnsavedDiscarded {
        /// Month the edits belonged to.
        month: YearMonth,
        /// Number of edits lost.
        count: usize,
    },
    /// A batch save started; the save control is disabled.
    SaveStarted {
        /// Records in the batch.
        total: usize,
    },
    /// A batch save settled; the save control is enabled again.
    SaveFinished {
        /// Aggregate outcome.
        outcome: SaveOutcome,
    },
}
