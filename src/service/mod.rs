//! The query control service: registry of controlled queries and the single
//! orchestration point for pause, resume, hot-swap and terminate.

mod control;
mod entry;
mod outcome;


pub use control::QueryControlService;
pub use outcome::{PauseOutcome, PruneOutcome, ResumeOutcome, TerminateOutcome};
