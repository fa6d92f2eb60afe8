use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use proptest::prelude::*;

use halldues::{
    core::calendar::{LoadRequest, MealCalendar, MonthSwitchPolicy, load_month},
    meal::MealRecord,
    persist::{RecordStore, StoreResult},
    types::{MealStatus, OwnerId, YearMonth},
};

/// Ignores the month filter and returns everything it holds.
struct LeakyStore {
    records: Vec<MealRecord>,
}

#[async_trait]
impl RecordStore for LeakyStore {
    async fn fetch_by_owner_and_month(
        &self,
        _owner_id: &OwnerId,
        _month: YearMonth,
    ) -> StoreResult<Vec<MealRecord>> {
        Ok(self.records.clone())
    }

    async fn upsert(&self, record: MealRecord) -> StoreResult<MealRecord> {
        Ok(record)
    }
}

fn status_strategy() -> impl Strategy<Value = MealStatus> {
    prop_oneof![
        Just(MealStatus::MealOn),
        Just(MealStatus::MealOff),
        Just(MealStatus::HallClosed),
    ]
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    // 2024-12-01 .. 2025-02-28 spans the requested month and both neighbours.
    let start = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    (0u64..90).prop_map(move |offset| start + chrono::Days::new(offset))
}

proptest! {
    #[test]
    fn three_cycles_restore_the_original_status(day in 1u32..=31, start in status_strategy()) {
        let owner = OwnerId::new("U1");
        let month = YearMonth::new(2025, 1).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let mut calendar = MealCalendar::new(owner.clone(), month, MonthSwitchPolicy::default());
        if start != MealStatus::MealOn {
            while calendar.effective_status(date) != start {
                calendar.cycle_status(date).unwrap();
            }
        }

        for _ in 0..3 {
            calendar.cycle_status(date).unwrap();
        }
        prop_assert_eq!(calendar.effective_status(date), start);
        prop_assert_eq!(start.next().next().next(), start);
    }

    #[test]
    fn absent_dates_are_meal_on(
        edited in prop::collection::btree_set(1u32..=31, 0..10),
        probe in 1u32..=31,
    ) {
        let month = YearMonth::new(2025, 1).unwrap();
        let mut calendar = MealCalendar::new(OwnerId::new("U1"), month, MonthSwitchPolicy::default());
        for d in &edited {
            calendar.cycle_status(NaiveDate::from_ymd_opt(2025, 1, *d).unwrap()).unwrap();
        }

        let date = NaiveDate::from_ymd_opt(2025, 1, probe).unwrap();
        if !edited.contains(&probe) {
            prop_assert_eq!(calendar.effective_status(date), MealStatus::MealOn);
        }
        prop_assert_eq!(calendar.view().stats().meals_off, edited.len());
    }

    #[test]
    fn load_keeps_only_the_requested_month(
        entries in prop::collection::vec((date_strategy(), status_strategy()), 0..60),
    ) {
        let owner = OwnerId::new("U1");
        let month = YearMonth::new(2025, 1).unwrap();
        let store = LeakyStore {
            records: entries
                .iter()
                .map(|(date, status)| MealRecord::new(&owner, *date, *status))
                .collect(),
        };

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let load = rt.block_on(load_month(
            &store,
            &owner,
            LoadRequest { month, seq: 1 },
            Duration::from_secs(1),
        ));

        prop_assert!(load.error.is_none());
        for (date, record) in &load.records {
            prop_assert!(date.format("%Y-%m-%d").to_string().starts_with(&month.to_string()));
            prop_assert_eq!(*date, record.date);
        }
        let expected: std::collections::BTreeSet<NaiveDate> = entries
            .iter()
            .map(|(date, _)| *date)
            .filter(|date| month.contains(*date))
            .collect();
        let got: std::collections::BTreeSet<NaiveDate> = load.records.keys().copied().collect();
        prop_assert_eq!(got, expected);
    }
}
