//! The reordering buffer and the state reconciler it feeds.

mod reconciler;
mod scheduler;

pub use reconciler::{ApplyOutcome, Reconciler};
pub use scheduler::{FlushReport, Scheduler, SchedulerSettings};
