//! Integration Tests for batch generation over persistent tiers
//!
//! Runs the orchestrator against hybrid stores backed by the disk tier.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use artifact_cache::cache::{CacheStore, DiskBackend, EvictionStrategy};
use artifact_cache::config::{BackendKind, Config, RemoteTarget};
use artifact_cache::generation::{
    builtin_registry, BatchGenerationOrchestrator, GenerationRequest, GeneratorRegistry,
    OrchestratorConfig, DATASET_SUMMARY,
};
use artifact_cache::GenerationError;
use serde_json::{json, Value};
use tempfile::TempDir;

// == Helper Functions ==

fn hybrid_config(dir: &TempDir) -> Config {
    Config {
        backend: BackendKind::Hybrid,
        eviction_strategy: EvictionStrategy::Hybrid,
        remote: Some(RemoteTarget::Disk(dir.path().to_path_buf())),
        ..Config::default()
    }
}

fn orchestrator(store: Arc<CacheStore>, registry: GeneratorRegistry) -> BatchGenerationOrchestrator {
    BatchGenerationOrchestrator::new(store, registry, OrchestratorConfig::default()).unwrap()
}

fn summary(id: &str, values: Value) -> GenerationRequest {
    GenerationRequest::new(id, DATASET_SUMMARY, json!({"values": values}), Value::Null)
}

// == Persistence ==

#[tokio::test]
async fn test_artifacts_survive_restart_via_disk_tier() {
    let dir = TempDir::new().unwrap();
    let batch = vec![summary("a", json!([1, 2])), summary("b", json!([10]))];

    {
        let store = Arc::new(CacheStore::open(&hybrid_config(&dir)).unwrap());
        let orch = orchestrator(store.clone(), builtin_registry());
        let results = orch.generate_batch(batch.clone()).await;
        assert!(results.iter().all(|r| r.is_success() && !r.from_cache));
        store.close().await;
    }

    // Fresh process: empty memory tier, same directory
    let store = Arc::new(CacheStore::open(&hybrid_config(&dir)).unwrap());
    assert!(store.is_empty());

    let orch = orchestrator(store.clone(), builtin_registry());
    let results = orch.generate_batch(batch).await;

    assert!(results.iter().all(|r| r.from_cache));
    assert_eq!(results[0].output.as_ref().unwrap()["mean"], 1.5);
    // Remote hits were copied back into memory
    assert_eq!(store.len(), 2);
    store.close().await;
}

#[tokio::test]
async fn test_remote_only_disk_store() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        backend: BackendKind::Remote,
        remote: Some(RemoteTarget::Disk(dir.path().to_path_buf())),
        ..Config::default()
    };
    let store = Arc::new(CacheStore::open(&config).unwrap());
    let orch = orchestrator(store.clone(), builtin_registry());

    orch.generate_batch(vec![summary("a", json!([3]))]).await;
    let results = orch.generate_batch(vec![summary("again", json!([3]))]).await;

    assert!(results[0].from_cache);
    assert_eq!(results[0].id, "again");

    let disk = DiskBackend::open(dir.path()).unwrap();
    let files = std::fs::read_dir(disk.dir()).unwrap().count();
    assert_eq!(files, 1);
}

// == Failure Isolation ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failures_do_not_poison_cache_or_batch() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(&hybrid_config(&dir)).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let registry = builtin_registry().with("flaky", move |req: &GenerationRequest| {
        counter.fetch_add(1, Ordering::SeqCst);
        if req.payload["fail"].as_bool().unwrap_or(false) {
            Err(GenerationError::failed("asked to fail"))
        } else {
            Ok(json!({"ok": req.payload["n"].clone()}))
        }
    });
    let orch = orchestrator(store.clone(), registry);

    let batch = vec![
        GenerationRequest::new("1", "flaky", json!({"n": 1}), Value::Null),
        GenerationRequest::new("2", "flaky", json!({"fail": true}), Value::Null),
        summary("3", json!([7, 8, 9])),
    ];

    let first = orch.generate_batch(batch.clone()).await;
    assert!(first[0].is_success());
    assert!(matches!(first[1].error, Some(GenerationError::Failed(_))));
    assert!(first[2].is_success());

    let second = orch.generate_batch(batch).await;
    assert!(second[0].from_cache);
    assert!(!second[1].from_cache, "failures are retried, never cached");
    assert!(second[2].from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let snapshot = store.tracker().snapshot();
    assert_eq!(snapshot.batches, 2);
    assert_eq!(snapshot.failed_items, 2);
    store.close().await;
}
