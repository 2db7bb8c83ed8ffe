//! Checkpoint store backends, exercised through the `CheckpointStore` trait.

use std::sync::Arc;

use query_control::checkpoint::CheckpointDraft;
use query_control::{
    CheckpointStore, ControlConfig, ExecutionContext, FileCheckpointStore,
    InMemoryCheckpointStore, Model, ModelConfig, PermissionMode, QueryControlService, QueryId,
    QueryState, StorageError, StoreBackend,
};
use serde_json::json;
use tempfile::TempDir;

fn draft(query: &str, model: Model, context: ExecutionContext) -> CheckpointDraft {
    CheckpointDraft {
        query_id: QueryId::from(query),
        state: QueryState::Running,
        model_config: ModelConfig::new(model),
        permission_mode: PermissionMode::AcceptEdits,
        execution_context: context,
    }
}

async fn exercise_store(store: &dyn CheckpointStore) {
    let q1 = QueryId::from("q1");
    let context = ExecutionContext::from_json(&json!({"cursor": 12})).unwrap();

    let a = store
        .create_checkpoint(draft("q1", Model::Opus, context.clone()))
        .await
        .unwrap();
    let b = store
        .create_checkpoint(draft("q1", Model::Haiku, ExecutionContext::empty()))
        .await
        .unwrap();
    store
        .create_checkpoint(draft("q2", Model::Sonnet, ExecutionContext::empty()))
        .await
        .unwrap();

    assert!(b.timestamp > a.timestamp);
    assert_ne!(a.id, b.id);

    let fetched = store.get_checkpoint(&q1, &a.id).await.unwrap();
    assert_eq!(fetched, a);
    assert_eq!(fetched.execution_context, context);
    assert_eq!(fetched.permission_mode, PermissionMode::AcceptEdits);

    let all = store.get_checkpoints(&q1).await.unwrap();
    assert_eq!(all.len(), 2);

    // Ids are scoped by query.
    let err = store
        .get_checkpoint(&QueryId::from("q2"), &a.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(store
        .get_checkpoints(&QueryId::from("nobody"))
        .await
        .unwrap()
        .is_empty());

    assert_eq!(store.prune(&q1, 1).await.unwrap(), 1);
    let remaining = store.get_checkpoints(&q1).await.unwrap();
    assert_eq!(remaining, vec![b]);
    assert_eq!(store.prune(&q1, 5).await.unwrap(), 0);
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = InMemoryCheckpointStore::new();
    exercise_store(&store).await;
    assert_eq!(store.backend(), "memory");
}

#[tokio::test]
async fn test_file_store_contract() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::open(dir.path()).await.unwrap();
    exercise_store(&store).await;
    assert_eq!(store.backend(), "file");
    assert_eq!(store.root(), dir.path());
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let q1 = QueryId::from("q1");

    let first = {
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        store
            .create_checkpoint(draft("q1", Model::Opus, ExecutionContext::new(vec![1, 2, 3])))
            .await
            .unwrap()
    };

    let store = FileCheckpointStore::open(dir.path()).await.unwrap();
    let loaded = store.get_checkpoints(&q1).await.unwrap();
    assert_eq!(loaded, vec![first.clone()]);
    assert_eq!(loaded[0].execution_context.clone().into_bytes(), vec![1, 2, 3]);

    let second = store
        .create_checkpoint(draft("q1", Model::Haiku, ExecutionContext::empty()))
        .await
        .unwrap();
    assert!(second.timestamp > first.timestamp);
}

#[tokio::test]
async fn test_file_store_detects_tampered_context() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::open(dir.path()).await.unwrap();
    let checkpoint = store
        .create_checkpoint(draft("q1", Model::Opus, ExecutionContext::new(b"abc".to_vec())))
        .await
        .unwrap();

    let query_dir = store.query_dir(&QueryId::from("q1"));
    let mut entries = std::fs::read_dir(&query_dir).unwrap();
    let path = entries.next().unwrap().unwrap().path();
    let original = std::fs::read_to_string(&path).unwrap();
    // "abc" is stored as hex "616263"; flip it to "616264".
    let tampered = original.replacen("616263", "616264", 1);
    assert_ne!(original, tampered);
    std::fs::write(&path, tampered).unwrap();

    let err = store
        .get_checkpoint(&QueryId::from("q1"), &checkpoint.id)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
}

#[tokio::test]
async fn test_file_store_accepts_any_query_id() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::open(dir.path()).await.unwrap();

    for id in ["../escape", "user/42", "user 42", ".hidden", "日本語"] {
        let created = store
            .create_checkpoint(draft(id, Model::Opus, ExecutionContext::empty()))
            .await
            .unwrap();
        let query_dir = store.query_dir(&QueryId::from(id));
        assert!(query_dir.starts_with(dir.path()));
        assert_eq!(
            store.get_checkpoints(&QueryId::from(id)).await.unwrap(),
            vec![created]
        );
    }
    assert!(!dir.path().parent().unwrap().join("escape").exists());
    // Ids that differ only in characters a path would mangle stay apart.
    assert_ne!(
        store.query_dir(&QueryId::from("user/42")),
        store.query_dir(&QueryId::from("user_42"))
    );
}

#[tokio::test]
async fn test_service_over_file_store_from_config() {
    let dir = TempDir::new().unwrap();
    let config = ControlConfig {
        store: StoreBackend::File,
        store_dir: dir.path().join("cp"),
        ..ControlConfig::default()
    };
    let service = QueryControlService::from_config(&config).await.unwrap();
    assert_eq!(service.store().backend(), "file");

    service
        .register_query("q1", Model::Sonnet, PermissionMode::Default)
        .unwrap();
    service.switch_model("q1", "opus").await.unwrap();
    let paused = service.pause_query("q1").await.unwrap();
    service.switch_model("q1", "haiku").await.unwrap();

    let resumed = service.resume_query("q1", None).await.unwrap();
    assert_eq!(resumed.resumed_from, paused.checkpoint_id);
    assert_eq!(
        service.get_query("q1").unwrap().model_config.model,
        Model::Opus
    );
    let query_dirs: Vec<_> = std::fs::read_dir(dir.path().join("cp"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(query_dirs.len(), 1);
    assert!(query_dirs[0].is_dir());
}

#[tokio::test]
async fn test_ids_with_path_characters_pause_and_resume() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpointStore::open(dir.path()).await.unwrap());
    let service = QueryControlService::new(store);

    // Unknown ids list as empty, whatever they contain.
    assert!(service.get_checkpoints("user/42").await.unwrap().is_empty());

    for id in ["a/b", "user 42"] {
        service
            .register_query(id, Model::Sonnet, PermissionMode::Default)
            .unwrap();
        let paused = service.pause_query(id).await.unwrap();
        assert_eq!(service.get_query(id).unwrap().state, QueryState::Paused);

        let resumed = service.resume_query(id, None).await.unwrap();
        assert_eq!(resumed.resumed_from, paused.checkpoint_id);
        assert_eq!(service.get_checkpoints(id).await.unwrap().len(), 1);
    }
}
