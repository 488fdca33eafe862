//! Silt worker - turns raw events into normalized records in the background
//!
//! - [`ParseWorker`]: claim, normalize, track fields, persist, complete
//! - [`Scheduler`]: independent loops with cooperative stop and a bounded
//!   force-terminate fallback
//! - [`tasks`]: the built-in parse, cleanup, retention and promotion tasks
//!
//! Several workers, in one process or many, can share a store: the claim
//! primitive guarantees no event is handed to two of them.

mod error;
mod parse;
mod scheduler;
pub mod tasks;

pub use error::{Result, SchedulerError, WorkerError};
pub use parse::{ParseReport, ParseWorker};
pub use scheduler::{
    Cadence, DailyGate, ScheduledTask, Scheduler, SchedulerState, StopReport, TaskStats,
};
pub use tasks::standard_scheduler;
