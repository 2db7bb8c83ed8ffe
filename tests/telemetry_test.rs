//! Structured logging and metrics emitted by service operations.

use query_control::telemetry::{init_logging, LogConfig, LogError, LogFormat, Operation, Outcome};
use query_control::{Model, PermissionMode, QueryControlService};

#[tokio::test]
async fn test_operations_log_json_and_count_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("control.log");
    let config = LogConfig {
        format: LogFormat::Json,
        level: "query_control=debug".to_string(),
        output_path: Some(log_path.clone()),
    };
    init_logging(&config).unwrap();
    assert!(matches!(init_logging(&config), Err(LogError::AlreadyInitialized)));

    let service = QueryControlService::in_memory();
    service
        .register_query("q1", Model::Sonnet, PermissionMode::Default)
        .unwrap();
    service.pause_query("q1").await.unwrap();
    let _ = service.resume_query("missing", None).await;

    let log = std::fs::read_to_string(&log_path).unwrap();
    let events: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(events
        .iter()
        .any(|e| e["fields"]["message"] == "pause completed"));
    assert!(events
        .iter()
        .any(|e| e["fields"]["message"] == "resume rejected"));
    assert!(events.iter().all(|e| e["level"].is_string()));

    let snapshot = service.metrics();
    assert_eq!(snapshot.counter(Operation::Pause, Outcome::Ok), 1);
    assert_eq!(snapshot.counter(Operation::Resume, Outcome::Rejected), 1);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["counters"]["register.ok"], 1);
}
