use std::time::Duration;

use chrono::NaiveDate;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    core::batch::FailedUpsert,
    meal::{DayCell, MealRecord, MonthlyView},
    persist::{RecordStore, StoreError},
    types::{MealStatus, OwnerId, YearMonth},
};

/// Date-keyed records of one month.
pub type MealMap = HashMap<NaiveDate, MealRecord>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("{date} is outside the displayed month {month}")]
    OutsideMonth { date: NaiveDate, month: YearMonth },
}

/// What happens to unsaved edits when the displayed month changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthSwitchPolicy {
    /// Drop them, reporting how many were lost.
    #[default]
    WarnAndDiscard,
    /// Stash them per month and re-apply when that month is shown again.
    CarryOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSwitch {
    pub from: YearMonth,
    pub to: YearMonth,
    /// Unsaved edits dropped under [`MonthSwitchPolicy::WarnAndDiscard`].
    pub discarded: usize,
    /// Unsaved edits stashed under [`MonthSwitchPolicy::CarryOver`].
    pub carried: usize,
}

/// Identifies one fetch issued by [`MealCalendar::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub month: YearMonth,
    /// Increases with every request; only the latest one may be applied.
    pub seq: u64,
}

/// Result of fetching one month; `records` is empty when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthLoad {
    pub month: YearMonth,
    pub seq: u64,
    pub records: MealMap,
    pub error: Option<StoreError>,
}

/// Fetches `owner_id`'s records for `month` and keys them by date.
///
/// Records from other months or other owners are dropped even if the store
/// returns them. Failures and timeouts degrade to an empty mapping with the
/// error attached; nothing is retried.
pub async fn load_month(
    store: &dyn RecordStore,
    owner_id: &OwnerId,
    request: LoadRequest,
    timeout: Duration,
) -> MonthLoad {
    let LoadRequest { month, seq } = request;
    let fetched =
        match tokio::time::timeout(timeout, store.fetch_by_owner_and_month(owner_id, month)).await
        {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
        };

    match fetched {
        Ok(list) => {
            let fetched_len = list.len();
            let records: MealMap = list
                .into_iter()
                .filter(|r| &r.owner_id == owner_id && month.contains(r.date))
                .map(|r| (r.date, r))
                .collect();
            if records.len() != fetched_len {
                debug!(%month, fetched_len, kept = records.len(), "dropped out-of-month meal records");
            }
            MonthLoad {
                month,
                seq,
                records,
                error: None,
            }
        }
        Err(err) => {
            warn!(%month, error = %err, "meal fetch failed, showing defaults");
            MonthLoad {
                month,
                seq,
                records: MealMap::new(),
                error: Some(err),
            }
        }
    }
}

/// Owns the date-to-status mapping of the displayed month.
///
/// Both reads and writes go through the owner id given at construction, so
/// records are always queried under the id they were written with.
#[derive(Debug)]
pub struct MealCalendar {
    owner: OwnerId,
    month: YearMonth,
    policy: MonthSwitchPolicy,
    records: MealMap,
    dirty: HashSet<NaiveDate>,
    stash: HashMap<YearMonth, Vec<MealRecord>>,
    load_seq: u64,
    /// Month of the batch currently being saved.
    saving: Option<YearMonth>,
}

impl MealCalendar {
    pub fn new(owner: OwnerId, month: YearMonth, policy: MonthSwitchPolicy) -> Self {
        Self {
            owner,
            month,
            policy,
            records: MealMap::new(),
            dirty: HashSet::new(),
            stash: HashMap::new(),
            load_seq: 0,
            saving: None,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn policy(&self) -> MonthSwitchPolicy {
        self.policy
    }

    pub fn records(&self) -> &MealMap {
        &self.records
    }

    /// Dates edited locally since the last load or save.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_dirty(&self, date: NaiveDate) -> bool {
        self.dirty.contains(&date)
    }

    /// Stored status for `date`, or [`MealStatus::DEFAULT`].
    pub fn effective_status(&self, date: NaiveDate) -> MealStatus {
        self.records
            .get(&date)
            .map_or(MealStatus::DEFAULT, |r| r.status)
    }

    /// Advances `date` one step through the status cycle and returns the new status.
    ///
    /// Local only; nothing is written until a save.
    pub fn cycle_status(&mut self, date: NaiveDate) -> Result<MealStatus, CalendarError> {
        if !self.month.contains(date) {
            return Err(CalendarError::OutsideMonth {
                date,
                month: self.month,
            });
        }

        let next = self.effective_status(date).next();
        self.records
            .insert(date, MealRecord::new(&self.owner, date, next));
        self.dirty.insert(date);
        Ok(next)
    }

    /// Moves the displayed month by `delta` and clears the mapping until the
    /// next [`Self::apply_load`].
    pub fn switch_month(&mut self, delta: i32) -> MonthSwitch {
        let from = self.month;
        let to = from.shift(delta);
        let unsaved = self.unsaved_records();

        let (discarded, carried) = match self.policy {
            MonthSwitchPolicy::WarnAndDiscard => (unsaved.len(), 0),
            MonthSwitchPolicy::CarryOver => {
                let n = unsaved.len();
                if n > 0 {
                    self.stash.entry(from).or_default().extend(unsaved);
                }
                (0, n)
            }
        };
        if discarded > 0 {
            warn!(%from, %to, discarded, "discarding unsaved meal edits on month switch");
        }

        self.month = to;
        self.records.clear();
        self.dirty.clear();
        self.load_seq += 1;
        MonthSwitch {
            from,
            to,
            discarded,
            carried,
        }
    }

    /// Starts a fetch of the displayed month and supersedes every earlier one.
    pub fn begin_load(&mut self) -> LoadRequest {
        self.load_seq += 1;
        LoadRequest {
            month: self.month,
            seq: self.load_seq,
        }
    }

    /// Replaces the mapping with a fetched month.
    ///
    /// Returns `None` for a stale load: one for a month no longer displayed,
    /// one superseded by a later [`Self::begin_load`] or month switch, or one
    /// that overlapped a save of the displayed month. Otherwise returns the
    /// number of unsaved edits the load discarded.
    pub fn apply_load(&mut self, load: MonthLoad) -> Option<usize> {
        if load.month != self.month
            || load.seq != self.load_seq
            || self.saving == Some(load.month)
        {
            debug!(
                loaded = %load.month,
                seq = load.seq,
                shown = %self.month,
                latest = self.load_seq,
                "ignoring stale meal load"
            );
            return None;
        }

        let mut carried = self.stash.remove(&load.month).unwrap_or_default();
        let mut discarded = 0;
        match self.policy {
            MonthSwitchPolicy::WarnAndDiscard => discarded = self.dirty.len(),
            MonthSwitchPolicy::CarryOver => carried.extend(self.unsaved_records()),
        }

        self.records = load.records;
        self.dirty.clear();
        for rec in carried {
            self.dirty.insert(rec.date);
            self.records.insert(rec.date, rec);
        }
        Some(discarded)
    }

    /// Every record currently in the mapping, in date order.
    pub fn snapshot(&self) -> Vec<MealRecord> {
        let mut out: Vec<MealRecord> = self.records.values().cloned().collect();
        out.sort_by_key(|r| r.date);
        out
    }

    /// Snapshot to save; fetches of the displayed month in flight until
    /// [`Self::finish_save`] can no longer be applied.
    pub fn begin_save(&mut self) -> Vec<MealRecord> {
        let records = self.snapshot();
        self.fence_save(&records);
        records
    }

    /// Records to re-send for `failed`: the current entry where the displayed
    /// month still holds the date, otherwise the record as it was sent.
    pub fn begin_retry(&mut self, failed: &[FailedUpsert]) -> Vec<MealRecord> {
        let records: Vec<MealRecord> = failed
            .iter()
            .map(|f| match self.records.get(&f.record.date) {
                Some(current) if self.month.contains(f.record.date) => current.clone(),
                _ => f.record.clone(),
            })
            .collect();
        self.fence_save(&records);
        records
    }

    /// Ends the save started by [`Self::begin_save`] or [`Self::begin_retry`]
    /// and clears the dirty mark of every date still holding a saved record.
    pub fn finish_save(&mut self, saved: &[MealRecord]) -> usize {
        if self.saving.take() == Some(self.month) {
            self.load_seq += 1;
        }
        self.mark_saved(saved)
    }

    fn fence_save(&mut self, records: &[MealRecord]) {
        self.saving = records.first().map(|r| YearMonth::of(r.date));
        if self.saving == Some(self.month) {
            self.load_seq += 1;
        }
    }

    /// Clears the dirty mark of dates whose current record equals a saved one.
    pub fn mark_saved(&mut self, saved: &[MealRecord]) -> usize {
        let mut cleared = 0;
        for rec in saved {
            if self.records.get(&rec.date) == Some(rec) && self.dirty.remove(&rec.date) {
                cleared += 1;
            }
        }
        cleared
    }

    /// Effective status of every day in the displayed month.
    pub fn view(&self) -> MonthlyView {
        let days = self
            .month
            .days()
            .map(|date| DayCell {
                date,
                status: self.effective_status(date),
                explicit: self.records.contains_key(&date),
            })
            .collect();
        MonthlyView {
            month: self.month,
            days,
        }
    }

    fn unsaved_records(&self) -> Vec<MealRecord> {
        let mut out: Vec<MealRecord> = self
            .dirty
            .iter()
            .filter_map(|d| self.records.get(d).cloned())
            .collect();
        out.sort_by_key(|r| r.date);
        out
    }
}
