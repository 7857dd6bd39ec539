//! Worker tasks that back the orchestrator.
//!
//! The unlock worker runs scheduled unlock checks off the caller's task so
//! contributions never unlock synchronously.

mod unlock;

pub(crate) use unlock::{UnlockScheduler, UnlockWorker};
