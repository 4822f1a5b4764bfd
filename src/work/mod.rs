//! Background work execution.
//!
//! A small job runner on top of tokio, shaped after mobile work schedulers:
//!
//! - [`WorkEngine`] - unique named work, constraint gating, retry backoff,
//!   expedited quota and cancellation, with a live status channel per name
//! - [`request`] types describe *when* and *how often* work runs
//! - [`Worker`] is the unit of work itself; the engine maps panics to failure
//! - [`DeviceConditions`] answers the constraint questions (network, battery)
//!
//! The engine is an ordinary value passed to whoever needs it; there is no
//! process-wide instance.

mod conditions;
mod engine;
mod info;
pub mod request;

pub use conditions::{DeviceConditions, HostConditions};
pub use engine::{EngineSettings, WorkEngine};
pub use info::{WorkId, WorkInfo, WorkOutcome, WorkState, Worker};
pub use request::{
    BackoffKind, BackoffPolicy, Constraints, ExistingWorkPolicy, OneTimeWorkRequest,
    OutOfQuotaPolicy, PeriodicWorkRequest, MAX_BACKOFF, MIN_BACKOFF,
};
