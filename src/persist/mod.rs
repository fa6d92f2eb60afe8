pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::{
    meal::{MealRecord, UserProfile},
    types::{OwnerId, YearMonth},
};

/// Failure reported by a record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network or authorization failure talking to the backend.
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),
    /// Stored payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// The call did not complete within its deadline.
    #[error("timed out after {after_ms} ms")]
    Timeout {
        /// Deadline that elapsed.
        after_ms: u64,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<crate::types::ParseError> for StoreError {
    fn from(value: crate::types::ParseError) -> Self {
        Self::Decode(value.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The `meals` collection: records keyed by `ownerId_date`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record of `owner_id` whose date starts with `month`.
    ///
    /// An owner without records yields an empty list, not an error.
    async fn fetch_by_owner_and_month(
        &self,
        owner_id: &OwnerId,
        month: YearMonth,
    ) -> StoreResult<Vec<MealRecord>>;

    /// Create-or-replace by [`MealRecord::id`]; returns the stored record.
    async fn upsert(&self, record: MealRecord) -> StoreResult<MealRecord>;
}

/// The `users` collection keyed by owner id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with [`StoreError::NotFound`] when no profile exists.
    async fn get_user(&self, owner_id: &OwnerId) -> StoreResult<UserProfile>;

    /// Create-or-replace the profile under its own id.
    async fn put_user(&self, profile: UserProfile) -> StoreResult<()>;
}
