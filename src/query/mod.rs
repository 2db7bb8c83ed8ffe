//! Query identity, lifecycle state machine, and the registry record.

mod record;
mod state;

pub(crate) use record::millis_to_iso;
pub use record::{Query, QueryId, QuerySummary};
pub use state::{IllegalTransition, QueryEvent, QueryState};
