//! nagme-core library.
//!
//! Everything here is pure: the gateway seam ([`source::Gateway`]) is the only
//! place that talks to the outside world, and it is implemented elsewhere.
//!
//! # Conventions
//!
//! - **Errors**: domain failures are [`error::NagError`]; config loading uses `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Time**: every timestamp is epoch milliseconds (`i64`); "now" is always passed in.

pub mod classify;
pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod model;
pub mod replay;
pub mod schedule;
pub mod source;
pub mod timefmt;
pub mod view;
pub mod visual;

pub use error::{ErrorCode, NagError};
pub use event::{EventData, EventKind, NagEvent, NagPatch};
pub use model::{Nag, NagId, Recurrence, RecurrenceRule, Status};
pub use replay::{MalformedEvent, Reconstruction, reconstruct};
