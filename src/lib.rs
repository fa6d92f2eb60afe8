//! Hostel meal calendar: per-day meal status for one owner, synchronized
//! with a sparse remote record store.
//!
//! Days without a stored record are `MEAL_ON`; only deviations are persisted,
//! one record per `(owner, date)` under the derived key `ownerId_YYYY-MM-DD`.
//!
//! # Examples
//!
//! Local calendar edits with [`core::calendar::MealCalendar`]:
//! ```
//! use chrono::NaiveDate;
//! use halldues::{
//!     core::calendar::{MealCalendar, MonthSwitchPolicy},
//!     types::{MealStatus, OwnerId, YearMonth},
//! };
//!
//! let month = YearMonth::new(2025, 1).expect("month");
//! let mut calendar = MealCalendar::new(OwnerId::new("uid-1"), month, MonthSwitchPolicy::default());
//! let day = NaiveDate::from_ymd_opt(2025, 1, 5).expect("date");
//!
//! assert_eq!(calendar.effective_status(day), MealStatus::MealOn);
//! assert_eq!(calendar.cycle_status(day).expect("cycle"), MealStatus::MealOff);
//! assert_eq!(calendar.view().stats().meals_off, 1);
//! ```
//!
//! Screen runtime with a SQLite store:
//! ```no_run
//! use std::sync::Arc;
//!
//! use halldues::{
//!     persist::sqlite::SqliteStore,
//!     runtime::handle::{open_meal_screen, RuntimeConfig},
//!     session::StaticIdentity,
//!     types::OwnerId,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(SqliteStore::open("halldues.db").expect("open sqlite"));
//! let identity = Arc::new(StaticIdentity::signed_in(OwnerId::new("uid-1")));
//! let screen = open_meal_screen(store.clone(), store, identity, RuntimeConfig::default())
//!     .await
//!     .expect("open");
//! let view = screen.view().await.expect("view");
//! screen.cycle_status(view.days[0].date).await.expect("cycle");
//! let outcome = screen.save_all().await.expect("save");
//! assert!(outcome.is_fully_synced());
//! screen.shutdown().await.expect("shutdown");
//! # }
//! ```
#![warn(missing_docs)]

/// Meal calendar model and batch save coordinator.
pub mod core;
/// Meal records, profiles, and the derived monthly view.
pub mod meal;
/// Record store abstraction with in-memory and SQLite implementations.
pub mod persist;
/// Single-consumer screen runtime and events.
pub mod runtime;
/// Identity provider port.
pub mod session;
/// Shared primitive types and enums.
pub mod types;
