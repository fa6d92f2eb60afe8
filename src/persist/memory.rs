//! In-process store for previews and tests.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::Mutex;

use crate::{
    meal::{MealRecord, UserProfile},
    types::{OwnerId, YearMonth},
};

use super::{RecordStore, StoreError, StoreResult, UserDirectory};

/// Map-backed implementation of [`RecordStore`] and [`UserDirectory`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<OwnerId, UserProfile>>,
    meals: Mutex<HashMap<String, MealRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored meal records across all owners.
    pub async fn meal_count(&self) -> usize {
        self.meals.lock().await.len()
    }

    /// Record stored under `id`, if any.
    pub async fn meal(&self, id: &str) -> Option<MealRecord> {
        self.meals.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_by_owner_and_month(
        &self,
        owner_id: &OwnerId,
        month: YearMonth,
    ) -> StoreResult<Vec<MealRecord>> {
        let meals = self.meals.lock().await;
        let mut out: Vec<MealRecord> = meals
            .values()
            .filter(|r| &r.owner_id == owner_id && month.contains(r.date))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.date);
        Ok(out)
    }

    async fn upsert(&self, record: MealRecord) -> StoreResult<MealRecord> {
        self.meals.lock().await.insert(record.id(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, owner_id: &OwnerId) -> StoreResult<UserProfile> {
        self.users
            .lock()
            .await
            .get(owner_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {owner_id}")))
    }

    async fn put_user(&self, profile: UserProfile) -> StoreResult<()> {
        self.users.lock().await.insert(profile.id.clone(), profile);
        Ok(())
    }
}
