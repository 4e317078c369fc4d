//! The materialized nag and the pieces it is built from.

pub mod nag;
pub mod nag_id;
pub mod recurrence;

pub use nag::{
    DEFAULT_BUCKET, DEFAULT_BUCKETS, DEFAULT_LATENESS_DAYS, DEFAULT_PROJECT_NAME, DEFAULT_WEIGHT,
    MAX_COMPLETED_OCCURRENCES, Nag, PROJECT_BUCKET, PushState, Status, UnknownStatus,
};
pub use nag_id::{InvalidNagId, NagId};
pub use recurrence::{
    CalendarPattern, CalendarRule, DAY_MS, HOUR_MS, MINUTE_MS, Recurrence, RecurrenceRule,
    SECOND_MS, WEEK_MS,
};
