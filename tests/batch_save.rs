use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use hashbrown::HashSet;

use halldues::{
    core::batch::{SaveGate, SaveOutcome, retry_failed, save_all},
    meal::MealRecord,
    persist::{RecordStore, StoreError, StoreResult, memory::MemoryStore},
    types::{MealStatus, OwnerId, YearMonth},
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

fn record(d: u32, status: MealStatus) -> MealRecord {
    MealRecord::new(&OwnerId::new("U1"), day(d), status)
}

/// Fails upserts for chosen dates and hangs on others.
struct FlakyStore {
    inner: MemoryStore,
    failing: HashSet<NaiveDate>,
    hanging: HashSet<NaiveDate>,
    calls: AtomicUsize,
}

impl FlakyStore {
    fn new(failing: &[u32], hanging: &[u32]) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: failing.iter().map(|d| day(*d)).collect(),
            hanging: hanging.iter().map(|d| day(*d)).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn fetch_by_owner_and_month(
        &self,
        owner_id: &OwnerId,
        month: YearMonth,
    ) -> StoreResult<Vec<MealRecord>> {
        self.inner.fetch_by_owner_and_month(owner_id, month).await
    }

    async fn upsert(&self, record: MealRecord) -> StoreResult<MealRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(&record.date) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&record.date) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        self.inner.upsert(record).await
    }
}

#[tokio::test]
async fn two_of_three_succeeding_is_a_partial_failure() {
    let store = FlakyStore::new(&[3], &[]);
    let records = vec![
        record(1, MealStatus::MealOff),
        record(2, MealStatus::HallClosed),
        record(3, MealStatus::MealOff),
    ];

    let outcome = save_all(&store, records, Duration::from_secs(1)).await;

    assert_eq!(outcome.total(), 3);
    assert_eq!(outcome.failure_count(), 1);
    assert!(!outcome.is_fully_synced());
    assert_eq!(outcome.failed()[0].record.date, day(3));
    assert_eq!(store.inner.meal_count().await, 2);
}

#[tokio::test]
async fn empty_batch_is_a_no_op_not_success() {
    let store = MemoryStore::new();
    let outcome = save_all(&store, Vec::new(), Duration::from_secs(1)).await;
    assert_eq!(outcome, SaveOutcome::NoOp);
    assert!(!outcome.is_fully_synced());
    assert_eq!(outcome.total(), 0);
}

#[tokio::test]
async fn all_upserts_succeeding_is_success() {
    let store = MemoryStore::new();
    let records = vec![record(1, MealStatus::MealOff), record(2, MealStatus::MealOn)];
    let outcome = save_all(&store, records, Duration::from_secs(1)).await;
    assert!(outcome.is_fully_synced());
    assert_eq!(outcome.saved().len(), 2);
}

#[tokio::test]
async fn hung_upsert_times_out_as_a_failure() {
    let store = FlakyStore::new(&[], &[2]);
    let records = vec![record(1, MealStatus::MealOff), record(2, MealStatus::MealOff)];

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        save_all(&store, records, Duration::from_millis(50)),
    )
    .await
    .expect("batch must settle despite a hung upsert");

    assert_eq!(outcome.failure_count(), 1);
    assert_eq!(
        outcome.failed()[0].error,
        StoreError::Timeout { after_ms: 50 }
    );
}

#[tokio::test]
async fn repeated_upsert_keeps_one_record_with_latest_fields() {
    let store = MemoryStore::new();
    let first = record(5, MealStatus::MealOff);
    let second = MealRecord {
        status: MealStatus::HallClosed,
        timestamp: first.timestamp + 1,
        ..first.clone()
    };

    store.upsert(first.clone()).await.unwrap();
    store.upsert(second.clone()).await.unwrap();

    assert_eq!(store.meal_count().await, 1);
    assert_eq!(store.meal(&first.id()).await, Some(second));
}

#[tokio::test]
async fn retry_failed_resends_only_failures() {
    let store = FlakyStore::new(&[2], &[]);
    let records = vec![record(1, MealStatus::MealOff), record(2, MealStatus::MealOff)];
    let first = save_all(&store, records, Duration::from_secs(1)).await;
    assert_eq!(first.failure_count(), 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);

    let healed = MemoryStore::new();
    let retried = retry_failed(&healed, &first, Duration::from_secs(1)).await;
    assert!(retried.is_fully_synced());
    assert_eq!(retried.saved().len(), 1);
    assert_eq!(retried.saved()[0].date, day(2));

    let nothing = retry_failed(&healed, &retried, Duration::from_secs(1)).await;
    assert_eq!(nothing, SaveOutcome::NoOp);
}

#[test]
fn gate_admits_one_batch_at_a_time() {
    let gate = SaveGate::new();
    let ticket = gate.try_begin().expect("first claim");
    assert!(gate.is_busy());
    assert!(gate.try_begin().is_none());

    drop(ticket);
    assert!(!gate.is_busy());
    assert!(gate.try_begin().is_some());
}

#[tokio::test]
async fn concurrent_upserts_all_complete_before_outcome() {
    let store = Arc::new(MemoryStore::new());
    let records: Vec<MealRecord> = (1..=31).map(|d| record(d, MealStatus::MealOff)).collect();
    let outcome = save_all(store.as_ref(), records, Duration::from_secs(1)).await;
    assert_eq!(outcome.saved().len(), 31);
    assert_eq!(store.meal_count().await, 31);
}
