//! Query Control core
//!
//! Lifecycle control for long-running AI queries: pause with a checkpoint,
//! resume from a checkpoint, hot-swap the model or permission mode, and
//! terminate.
//!
//! # Design Principles
//!
//! - **Single writer per query**: every mutating call on one query id is
//!   serialized, including the nested checkpoint-store call.
//! - **Independent queries**: calls on different ids never share a lock.
//! - **Explicit ownership**: [`QueryControlService`] is a constructed handle
//!   with a shutdown lifecycle. There is no global instance.
//! - **Control plane only**: pausing records a checkpoint and a state change.
//!   Suspending the executing work is the caller's job.
//!
//! # Example
//!
//! ```no_run
//! use query_control::{Model, PermissionMode, QueryControlService};
//!
//! # async fn demo() -> Result<(), query_control::ControlError> {
//! let service = QueryControlService::in_memory();
//! service.register_query("q1", Model::Sonnet, PermissionMode::Default)?;
//! let paused = service.pause_query("q1").await?;
//! let resumed = service.resume_query("q1", None).await?;
//! assert_eq!(resumed.resumed_from, paused.checkpoint_id);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod permissions;
pub mod protocol;
pub mod query;
pub mod service;
pub mod shutdown;
pub mod telemetry;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointStore, ExecutionContext, FileCheckpointStore,
    InMemoryCheckpointStore, StorageError,
};
pub use config::{ControlConfig, StoreBackend};
pub use error::{ControlError, ErrorClass};
pub use models::{Model, ModelConfig, ModelSwitch};
pub use permissions::{ModeSwitch, PermissionMode};
pub use query::{QueryId, QueryState, QuerySummary};
pub use service::{PauseOutcome, PruneOutcome, QueryControlService, ResumeOutcome, TerminateOutcome};
pub use shutdown::ShutdownResult;
