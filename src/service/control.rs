//! Query control orchestration.
//!
//! Mutating calls for one query are serialized by that query's transition
//! lock, held across the checkpoint-store call. Calls for different queries
//! never share a lock. Registry reads take only short record locks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn, Instrument, Span};

use super::entry::QueryEntry;
use super::outcome::{PauseOutcome, PruneOutcome, ResumeOutcome, TerminateOutcome};
use crate::checkpoint::{
    self, Checkpoint, CheckpointDraft, CheckpointId, CheckpointStore, ExecutionContext,
    FileCheckpointStore, InMemoryCheckpointStore,
};
use crate::config::{ControlConfig, StoreBackend};
use crate::error::ControlError;
use crate::models::{Model, ModelConfig, ModelSwitch, ModelSwitcher};
use crate::permissions::{ModeSwitch, PermissionMode, PermissionModeManager};
use crate::query::{IllegalTransition, Query, QueryEvent, QueryId, QueryState, QuerySummary};
use crate::shutdown::{OperationGuard, ShutdownCoordinator, ShutdownResult};
use crate::telemetry::{
    record_active_queries, record_operation, ControlSpan, MetricsSnapshot, MetricsStore,
    Operation, Outcome, SpanExt,
};

/// Owns the registry of controlled queries and sequences every operation
/// against the checkpoint store, model switcher and permission manager.
///
/// There is no global instance: construct one and share it behind an `Arc`.
pub struct QueryControlService {
    registry: DashMap<QueryId, Arc<QueryEntry>>,
    next_seq: AtomicU64,
    active: AtomicUsize,
    store: Arc<dyn CheckpointStore>,
    models: ModelSwitcher,
    permissions: PermissionModeManager,
    lifecycle: ShutdownCoordinator,
    metrics: MetricsStore,
}

impl QueryControlService {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            registry: DashMap::new(),
            next_seq: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            store,
            models: ModelSwitcher::new(),
            permissions: PermissionModeManager::new(),
            lifecycle: ShutdownCoordinator::new(),
            metrics: MetricsStore::new(),
        }
    }

    /// Service backed by a fresh in-memory checkpoint store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCheckpointStore::new()))
    }

    /// Build the service with the checkpoint backend selected by `config`.
    pub async fn from_config(config: &ControlConfig) -> Result<Self, ControlError> {
        let store: Arc<dyn CheckpointStore> = match config.store {
            StoreBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
            StoreBackend::File => Arc::new(
                FileCheckpointStore::open(&config.store_dir)
                    .await
                    .map_err(|e| ControlError::StorageUnavailable(e.to_string()))?,
            ),
        };
        info!(backend = store.backend(), "query control service created");
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_accepting(&self) -> bool {
        self.lifecycle.is_accepting()
    }

    /// Stop admitting mutating operations and wait for in-flight ones.
    /// Reads stay available afterwards.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        info!(in_flight = self.lifecycle.in_flight_count(), "query control shutting down");
        let result = self.lifecycle.initiate(timeout).await;
        match &result {
            ShutdownResult::Complete => info!("query control drained"),
            ShutdownResult::Timeout { remaining } => {
                warn!(remaining, "query control shutdown timed out with operations in flight")
            }
        }
        result
    }

    /// Register a new query in state Running.
    pub fn register_query(
        &self,
        query_id: impl Into<QueryId>,
        model: Model,
        permission_mode: PermissionMode,
    ) -> Result<QuerySummary, ControlError> {
        let query_id = query_id.into();
        let span = ControlSpan::new(Operation::Register, Some(&query_id));
        let start = Instant::now();
        let result = span.in_scope(|| self.register_inner(query_id, model, permission_mode));
        self.finish(Operation::Register, &span, start, &result);
        result
    }

    fn register_inner(
        &self,
        query_id: QueryId,
        model: Model,
        permission_mode: PermissionMode,
    ) -> Result<QuerySummary, ControlError> {
        let _op = self.admit()?;
        match self.registry.entry(query_id.clone()) {
            Entry::Occupied(_) => Err(ControlError::DuplicateQuery(query_id)),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                let query = Query::new(
                    query_id,
                    ModelConfig::new(model),
                    permission_mode,
                    checkpoint::now_ms(),
                );
                let summary = query.summary();
                slot.insert(Arc::new(QueryEntry::new(seq, query)));
                self.publish_active(self.active.fetch_add(1, Ordering::SeqCst) + 1);
                Ok(summary)
            }
        }
    }

    /// Pause a Running query, capturing a checkpoint with an empty
    /// execution context.
    pub async fn pause_query(&self, query_id: &str) -> Result<PauseOutcome, ControlError> {
        self.pause_query_with_context(query_id, ExecutionContext::empty())
            .await
    }

    /// Pause a Running query, capturing `execution_context` verbatim.
    pub async fn pause_query_with_context(
        &self,
        query_id: &str,
        execution_context: ExecutionContext,
    ) -> Result<PauseOutcome, ControlError> {
        self.observe(
            Operation::Pause,
            query_id,
            self.pause_inner(query_id, execution_context),
        )
        .await
    }

    async fn pause_inner(
        &self,
        query_id: &str,
        execution_context: ExecutionContext,
    ) -> Result<PauseOutcome, ControlError> {
        let _op = self.admit()?;
        let start = Instant::now();
        let entry = self.entry(query_id)?;
        let _transition = entry.lock_transition().await;

        let query = entry.snapshot();
        let paused = query
            .state
            .apply(QueryEvent::Pause)
            .map_err(|t| invalid_state(&query, t))?;

        let draft = CheckpointDraft {
            query_id: query.query_id.clone(),
            state: query.state,
            model_config: query.model_config.clone(),
            permission_mode: query.permission_mode,
            execution_context,
        };
        let checkpoint = self
            .store
            .create_checkpoint(draft)
            .await
            .map_err(|e| ControlError::from_storage(e, &query.query_id, None))?;

        entry.update(|q| {
            q.state = paused;
            q.last_checkpoint_id = Some(checkpoint.id.clone());
        });
        debug!(checkpoint_id = %checkpoint.id, timestamp = checkpoint.timestamp, "checkpoint captured");

        Ok(PauseOutcome {
            checkpoint_id: checkpoint.id,
            state: paused,
            pause_time_ms: elapsed_ms(start),
        })
    }

    /// Resume a Paused query from `checkpoint_id`, or from its newest
    /// checkpoint when none is given. Restores model and permission mode
    /// from the checkpoint.
    pub async fn resume_query(
        &self,
        query_id: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<ResumeOutcome, ControlError> {
        let checkpoint_id = checkpoint_id.map(CheckpointId::from);
        self.observe(
            Operation::Resume,
            query_id,
            self.resume_inner(query_id, checkpoint_id),
        )
        .await
    }

    async fn resume_inner(
        &self,
        query_id: &str,
        checkpoint_id: Option<CheckpointId>,
    ) -> Result<ResumeOutcome, ControlError> {
        let _op = self.admit()?;
        let start = Instant::now();
        let entry = self.entry(query_id)?;
        let _transition = entry.lock_transition().await;

        let query = entry.snapshot();
        let resuming = query
            .state
            .apply(QueryEvent::Resume)
            .map_err(|t| invalid_state(&query, t))?;
        let running = resuming
            .apply(QueryEvent::ResumeComplete)
            .map_err(|t| invalid_state(&query, t))?;

        entry.update(|q| q.state = resuming);
        let rollback = ResumeRollback::arm(&entry);

        let checkpoint = self
            .resolve_checkpoint(&query.query_id, checkpoint_id.as_ref())
            .await?;

        rollback.disarm();
        entry.update(|q| {
            q.model_config = checkpoint.model_config.clone();
            q.permission_mode = checkpoint.permission_mode;
            q.state = running;
        });
        debug!(
            checkpoint_id = %checkpoint.id,
            model = %checkpoint.model_config.model,
            permission_mode = %checkpoint.permission_mode,
            "resumed from checkpoint"
        );

        Ok(ResumeOutcome {
            resumed_from: checkpoint.id.clone(),
            state: running,
            resume_time_ms: elapsed_ms(start),
            checkpoint,
        })
    }

    async fn resolve_checkpoint(
        &self,
        query_id: &QueryId,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Result<Checkpoint, ControlError> {
        if let Some(id) = checkpoint_id {
            return self
                .store
                .get_checkpoint(query_id, id)
                .await
                .map_err(|e| ControlError::from_storage(e, query_id, Some(id)));
        }

        let checkpoints = self
            .store
            .get_checkpoints(query_id)
            .await
            .map_err(|e| ControlError::from_storage(e, query_id, None))?;
        checkpoint::latest(&checkpoints)
            .cloned()
            .ok_or_else(|| ControlError::CheckpointNotFound {
                query_id: query_id.clone(),
                checkpoint_id: None,
            })
    }

    /// Hot-swap the model. Allowed while Running or Paused.
    pub async fn switch_model(
        &self,
        query_id: &str,
        requested_model: &str,
    ) -> Result<ModelSwitch, ControlError> {
        self.observe(Operation::SwitchModel, query_id, async {
            let _op = self.admit()?;
            self.models.resolve(requested_model)?;
            let entry = self.entry(query_id)?;
            let _transition = entry.lock_transition().await;
            entry.update(|q| self.models.switch_model(q, requested_model))
        })
        .await
    }

    /// Switch the permission mode. Allowed while Running or Paused.
    pub async fn switch_permission_mode(
        &self,
        query_id: &str,
        requested_mode: &str,
    ) -> Result<ModeSwitch, ControlError> {
        self.observe(Operation::SwitchPermissionMode, query_id, async {
            let _op = self.admit()?;
            requested_mode.parse::<PermissionMode>()?;
            let entry = self.entry(query_id)?;
            let _transition = entry.lock_transition().await;
            entry.update(|q| self.permissions.switch_mode(q, requested_mode))
        })
        .await
    }

    /// Terminate a query. It stays listed for audit but rejects every
    /// further mutating call.
    pub async fn terminate_query(&self, query_id: &str) -> Result<TerminateOutcome, ControlError> {
        self.observe(Operation::Terminate, query_id, async {
            let _op = self.admit()?;
            let start = Instant::now();
            let entry = self.entry(query_id)?;
            let _transition = entry.lock_transition().await;

            entry.update(|q| {
                let next = q
                    .state
                    .apply(QueryEvent::Terminate)
                    .map_err(|t| invalid_state(q, t))?;
                q.state = next;
                Ok::<_, ControlError>(())
            })?;
            self.publish_active(self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1));

            Ok(TerminateOutcome {
                final_state: QueryState::Terminated,
                terminate_time_ms: elapsed_ms(start),
            })
        })
        .await
    }

    /// Delete all but the `keep_latest` newest checkpoints of a query.
    pub async fn prune_checkpoints(
        &self,
        query_id: &str,
        keep_latest: usize,
    ) -> Result<PruneOutcome, ControlError> {
        self.observe(Operation::Prune, query_id, async {
            let _op = self.admit()?;
            let query_id = QueryId::from(query_id);
            let entry = self.registry.get(&query_id).map(|e| Arc::clone(e.value()));
            let _transition = match &entry {
                Some(entry) => Some(entry.lock_transition().await),
                None => None,
            };

            let removed = self
                .store
                .prune(&query_id, keep_latest)
                .await
                .map_err(|e| ControlError::from_storage(e, &query_id, None))?;
            let retained = self
                .store
                .get_checkpoints(&query_id)
                .await
                .map_err(|e| ControlError::from_storage(e, &query_id, None))?
                .len();
            Ok(PruneOutcome { removed, retained })
        })
        .await
    }

    /// Snapshot of every registered query, in registration order.
    pub fn list_queries(&self) -> Vec<QuerySummary> {
        let mut entries: Vec<(u64, QuerySummary)> = self
            .registry
            .iter()
            .map(|e| (e.value().seq, e.value().summary()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, summary)| summary).collect()
    }

    pub fn get_query(&self, query_id: &str) -> Result<QuerySummary, ControlError> {
        self.entry(query_id).map(|e| e.summary())
    }

    /// All checkpoints of a query, unordered. Unknown queries yield an empty
    /// list.
    pub async fn get_checkpoints(&self, query_id: &str) -> Result<Vec<Checkpoint>, ControlError> {
        let query_id = QueryId::from(query_id);
        self.store
            .get_checkpoints(&query_id)
            .await
            .map_err(|e| ControlError::from_storage(e, &query_id, None))
    }

    pub async fn get_checkpoint(
        &self,
        query_id: &str,
        checkpoint_id: &str,
    ) -> Result<Checkpoint, ControlError> {
        let query_id = QueryId::from(query_id);
        let checkpoint_id = CheckpointId::from(checkpoint_id);
        self.store
            .get_checkpoint(&query_id, &checkpoint_id)
            .await
            .map_err(|e| ControlError::from_storage(e, &query_id, Some(&checkpoint_id)))
    }

    /// Number of registered queries that are not Terminated.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Result<OperationGuard, ControlError> {
        self.lifecycle.track().ok_or(ControlError::ShuttingDown)
    }

    fn entry(&self, query_id: &str) -> Result<Arc<QueryEntry>, ControlError> {
        self.registry
            .get(query_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ControlError::QueryNotFound(QueryId::from(query_id)))
    }

    fn publish_active(&self, count: usize) {
        record_active_queries(count);
        self.metrics.set_gauge("active_queries", count as f64);
    }

    async fn observe<T, F>(&self, operation: Operation, query_id: &str, fut: F) -> Result<T, ControlError>
    where
        F: Future<Output = Result<T, ControlError>>,
    {
        let span = ControlSpan::new(operation, Some(&QueryId::from(query_id)));
        let start = Instant::now();
        let result = fut.instrument(span.clone()).await;
        self.finish(operation, &span, start, &result);
        result
    }

    fn finish<T>(&self, operation: Operation, span: &Span, start: Instant, result: &Result<T, ControlError>) {
        let latency_ms = elapsed_ms(start);
        span.record_result(result);
        span.record_latency(latency_ms);

        let outcome = Outcome::of(result);
        record_operation(operation, outcome, latency_ms);
        self.metrics.record_operation(operation, outcome, latency_ms);

        match result {
            Ok(_) => info!(parent: span, latency_ms, "{} completed", operation.as_str()),
            Err(e) if outcome == Outcome::Failed => {
                warn!(parent: span, error = %e, retryable = e.is_retryable(), "{} failed", operation.as_str())
            }
            Err(e) => debug!(parent: span, error = %e, "{} rejected", operation.as_str()),
        }
    }
}

/// Puts a query back to Paused if a resume exits before committing,
/// including when the resume future is dropped mid-await.
struct ResumeRollback<'a> {
    entry: &'a QueryEntry,
    armed: bool,
}

impl<'a> ResumeRollback<'a> {
    fn arm(entry: &'a QueryEntry) -> Self {
        Self { entry, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResumeRollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.entry.update(|q| {
            if let Ok(paused) = q.state.apply(QueryEvent::ResumeAborted) {
                q.state = paused;
            }
        });
    }
}

fn invalid_state(query: &Query, transition: IllegalTransition) -> ControlError {
    ControlError::InvalidState {
        query_id: query.query_id.clone(),
        current: transition.from,
        operation: transition.event.operation(),
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
