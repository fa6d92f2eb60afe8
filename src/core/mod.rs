//! Meal calendar model and batch persistence.

/// Fan-out/fan-in batch save and its single-flight gate.
pub mod batch;
/// Date-to-status mapping for the displayed month.
pub mod calendar;
