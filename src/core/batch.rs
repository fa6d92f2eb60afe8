use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    meal::MealRecord,
    persist::{RecordStore, StoreError},
};

/// One upsert that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpsert {
    /// Record as it was sent.
    pub record: MealRecord,
    /// Why it failed.
    pub error: StoreError,
}

/// Aggregate classification of a batch save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing to persist; not the same as fully synced.
    NoOp,
    /// Every upsert succeeded.
    Saved { saved: Vec<MealRecord> },
    /// At least one upsert failed.
    Partial {
        saved: Vec<MealRecord>,
        failed: Vec<FailedUpsert>,
    },
}

impl SaveOutcome {
    fn classify(saved: Vec<MealRecord>, failed: Vec<FailedUpsert>) -> Self {
        match (saved.is_empty(), failed.is_empty()) {
            (true, true) => Self::NoOp,
            (_, true) => Self::Saved { saved },
            _ => Self::Partial { saved, failed },
        }
    }

    /// Records attempted.
    pub fn total(&self) -> usize {
        self.saved().len() + self.failed().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().len()
    }

    /// True only for [`SaveOutcome::Saved`].
    pub fn is_fully_synced(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }

    pub fn saved(&self) -> &[MealRecord] {
        match self {
            Self::NoOp => &[],
            Self::Saved { saved } | Self::Partial { saved, .. } => saved,
        }
    }

    pub fn failed(&self) -> &[FailedUpsert] {
        match self {
            Self::Partial { failed, .. } => failed,
            _ => &[],
        }
    }
}

/// Upserts every record independently and waits for all of them.
///
/// No ordering between upserts and no atomicity across the batch. Each call
/// is bounded by `per_call`; an expired call counts as a failure, so the
/// outcome is always produced once every record has settled.
pub async fn save_all(
    store: &dyn RecordStore,
    records: Vec<MealRecord>,
    per_call: Duration,
) -> SaveOutcome {
    if records.is_empty() {
        debug!("meal batch empty, nothing to save");
        return SaveOutcome::NoOp;
    }

    let total = records.len();
    let results = join_all(
        records
            .into_iter()
            .map(|record| upsert_one(store, record, per_call)),
    )
    .await;

    let mut saved = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for res in results {
        match res {
            Ok(rec) => saved.push(rec),
            Err(fail) => failed.push(fail),
        }
    }

    let outcome = SaveOutcome::classify(saved, failed);
    if outcome.failure_count() > 0 {
        warn!(total, failed = outcome.failure_count(), "meal batch saved with errors");
    } else {
        info!(total, "meal batch saved");
    }
    outcome
}

/// Re-sends only the failed records of `outcome`.
///
/// Safe to repeat: upserts overwrite by the derived `ownerId_date` key.
pub async fn retry_failed(
    store: &dyn RecordStore,
    outcome: &SaveOutcome,
    per_call: Duration,
) -> SaveOutcome {
    let records: Vec<MealRecord> = outcome.failed().iter().map(|f| f.record.clone()).collect();
    debug!(count = records.len(), "retrying failed meal upserts");
    save_all(store, records, per_call).await
}

async fn upsert_one(
    store: &dyn RecordStore,
    record: MealRecord,
    per_call: Duration,
) -> Result<MealRecord, FailedUpsert> {
    match tokio::time::timeout(per_call, store.upsert(record.clone())).await {
        Ok(Ok(stored)) => Ok(stored),
        Ok(Err(error)) => Err(FailedUpsert { record, error }),
        Err(_) => {
            warn!(id = %record.id(), "meal upsert timed out");
            Err(FailedUpsert {
                record,
                error: StoreError::Timeout {
                    after_ms: per_call.as_millis() as u64,
                },
            })
        }
    }
}

/// Single-flight guard for batch saves; the save control stays disabled
/// while a [`SaveTicket`] is alive.
#[derive(Debug, Clone, Default)]
pub struct SaveGate {
    busy: Arc<AtomicBool>,
}

impl SaveGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate, or `None` while another batch holds it.
    pub fn try_begin(&self) -> Option<SaveTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SaveTicket {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases its [`SaveGate`] on drop.
#[derive(Debug)]
pub struct SaveTicket {
    busy: Arc<AtomicBool>,
}

impl Drop for SaveTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
