//! SQLite-backed `users` / `meals` collections.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::{
    meal::{MealRecord, UserProfile},
    types::{MealStatus, OwnerId, YearMonth},
};

use super::{RecordStore, StoreError, StoreResult, UserDirectory};

const DATE_FORMAT: &str = "%Y-%m-%d";

type MealRow = (String, String, String, i64);

/// SQLite implementation of [`RecordStore`] and [`UserDirectory`].
///
/// The connection is shared behind an async mutex; every statement runs on
/// the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates a database at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of rows in the `meals` table.
    pub async fn meal_count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM meals", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn fetch_by_owner_and_month(
        &self,
        owner_id: &OwnerId,
        month: YearMonth,
    ) -> StoreResult<Vec<MealRecord>> {
        let owner = owner_id.as_str().to_string();
        let prefix = format!("{month}%");
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT owner_id, date, status, ts_ms FROM meals \
                     WHERE owner_id = ?1 AND date LIKE ?2 ORDER BY date ASC",
                )?;
                let rows = stmt.query_map(params![owner, prefix], |row| -> rusqlite::Result<MealRow> {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;

                let mut out = Vec::<MealRow>::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        rows.into_iter().map(decode_meal_row).collect()
    }

    async fn upsert(&self, record: MealRecord) -> StoreResult<MealRecord> {
        let stored = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO meals(id, owner_id, date, status, ts_ms) VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, date = excluded.date, \
                 status = excluded.status, ts_ms = excluded.ts_ms",
                params![
                    record.id(),
                    record.owner_id.as_str(),
                    record.date.format(DATE_FORMAT).to_string(),
                    record.status.as_str(),
                    record.timestamp as i64,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(stored)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn get_user(&self, owner_id: &OwnerId) -> StoreResult<UserProfile> {
        let owner = owner_id.clone();
        self.with_conn(move |conn| {
            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT full_name, department, roll_number FROM users WHERE id = ?1",
                    params![owner.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((full_name, department, roll_number)) = row else {
                return Err(StoreError::NotFound(format!("user {owner}")));
            };
            Ok(UserProfile {
                id: owner,
                full_name,
                department,
                roll_number,
            })
        })
        .await
    }

    async fn put_user(&self, profile: UserProfile) -> StoreResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users(id, full_name, department, roll_number) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name, \
                 department = excluded.department, roll_number = excluded.roll_number",
                params![
                    profile.id.as_str(),
                    profile.full_name,
                    profile.department,
                    profile.roll_number,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

fn decode_meal_row((owner, date, status, ts_ms): MealRow) -> StoreResult<MealRecord> {
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| StoreError::Decode(format!("meal date `{date}`: {e}")))?;
    Ok(MealRecord {
        owner_id: OwnerId::new(owner),
        date,
        status: status.parse::<MealStatus>()?,
        timestamp: ts_ms.max(0) as u64,
    })
}
