//! Sync engine tests against a scripted transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use civicsync_common::{Error, ErrorKind, Result};
use civicsync_storage::{FileStore, KeyValueStore, MemoryStore};
use civicsync_sync::{OfflineQueue, SyncConfig, SyncEngine, SyncPhase};
use civicsync_transport::{Method, Transport, UploadPart};

type Responder = Box<dyn Fn(Method, &str, Option<&Value>) -> Result<Value> + Send + Sync>;

/// Transport that records every call and answers from a script.
struct ScriptedTransport {
    calls: Mutex<Vec<(Method, String, Option<Value>)>>,
    respond: Responder,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedTransport {
    fn new<F>(respond: F) -> Self
    where
        F: Fn(Method, &str, Option<&Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
            gate: None,
        }
    }

    fn ok() -> Self {
        Self::new(|_, _, _| Ok(json!({ "ok": true })))
    }

    /// Block every call until `release` is notified; `entered` fires on entry.
    fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Self::ok()
        }
    }

    fn calls(&self) -> Vec<(Method, String, Option<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method, path.to_string(), body.clone()));
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        (self.respond)(method, path, body.as_ref())
    }

    async fn upload(&self, _path: &str, _part: UploadPart) -> Result<Value> {
        Err(Error::Unreachable("uploads not scripted".to_string()))
    }
}

fn engine_over(store: Arc<dyn KeyValueStore>, transport: Arc<ScriptedTransport>) -> SyncEngine {
    SyncEngine::new(OfflineQueue::new(store), transport, SyncConfig::default())
}

#[tokio::test]
async fn test_replays_in_fifo_order() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    queue
        .enqueue(Method::Post, "/issues", Some(json!({ "title": "first" })))
        .await
        .unwrap();
    queue.enqueue(Method::Post, "/issues/7/upvote", None).await.unwrap();
    queue
        .enqueue(Method::Post, "/issues", Some(json!({ "title": "third" })))
        .await
        .unwrap();

    let transport = Arc::new(ScriptedTransport::ok());
    let engine = engine_over(store, transport.clone());

    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.succeeded, 3);
    assert!(report.failed.is_empty());
    assert!(!report.skipped);

    let calls = transport.calls();
    assert_eq!(
        calls,
        vec![
            (Method::Post, "/issues".to_string(), Some(json!({ "title": "first" }))),
            (Method::Post, "/issues/7/upvote".to_string(), None),
            (Method::Post, "/issues".to_string(), Some(json!({ "title": "third" }))),
        ]
    );
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_partial_failure_keeps_only_failed_entry() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    for n in 1..=3 {
        queue
            .enqueue(Method::Post, "/issues", Some(json!({ "n": n })))
            .await
            .unwrap();
    }
    let second = queue.drain().await.unwrap()[1].clone();

    let transport = Arc::new(ScriptedTransport::new(|_, _, body| {
        match body.and_then(|b| b["n"].as_i64()) {
            Some(2) => Err(Error::Rejected {
                status: 500,
                message: "database unavailable".to_string(),
            }),
            _ => Ok(json!({})),
        }
    }));
    let engine = engine_over(store, transport.clone());

    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entry, second);
    assert_eq!(report.failed[0].kind, ErrorKind::Rejected);
    assert!(report.failed[0].reason.contains("database unavailable"));

    // Every entry was attempted, the failure did not stop the pass.
    assert_eq!(transport.calls().len(), 3);

    let remaining = queue.drain().await.unwrap();
    assert_eq!(remaining, vec![second]);
}

#[tokio::test]
async fn test_unreachable_entries_stay_queued() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();

    let transport = Arc::new(ScriptedTransport::new(|_, _, _| {
        Err(Error::Unreachable("connection refused".to_string()))
    }));
    let engine = engine_over(store, transport);

    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(queue.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_passes_run_once() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let transport = Arc::new(ScriptedTransport::gated(entered.clone(), release.clone()));
    let engine = Arc::new(engine_over(store, transport.clone()));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_sync_pass().await })
    };
    entered.notified().await;
    assert_eq!(engine.state().phase(), SyncPhase::Running);

    let second = engine.run_sync_pass().await.unwrap();
    assert!(second.skipped);
    assert_eq!(second.succeeded, 0);
    assert!(second.failed.is_empty());

    release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.succeeded, 1);

    assert_eq!(transport.calls().len(), 1);
    assert_eq!(engine.state().phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn test_cancelled_pass_returns_to_idle() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();

    let transport = Arc::new(ScriptedTransport::gated(
        Arc::new(Notify::new()),
        Arc::new(Notify::new()),
    ));
    let engine = engine_over(store, transport);

    let timed_out = tokio::time::timeout(Duration::from_millis(50), engine.run_sync_pass()).await;
    assert!(timed_out.is_err());

    assert_eq!(engine.state().phase(), SyncPhase::Idle);
    assert_eq!(queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_storage_failure_aborts_pass() {
    let memory = MemoryStore::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(memory.clone());
    let queue = OfflineQueue::new(store.clone());
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();

    let transport = Arc::new(ScriptedTransport::ok());
    let engine = engine_over(store, transport.clone());

    memory.fail_writes(true);
    let err = engine.run_sync_pass().await.unwrap_err();
    assert!(err.is_storage());

    // Stopped after the first removal failed.
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(engine.state().phase(), SyncPhase::Idle);
    assert!(engine.state().stats().last_error.is_some());

    memory.fail_writes(false);
    assert_eq!(queue.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_empty_queue_pass() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::ok());
    let engine = engine_over(store, transport.clone());

    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.succeeded, 0);
    assert!(report.failed.is_empty());
    assert!(transport.calls().is_empty());

    let status = engine.status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.stats.total_passes, 1);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("store.json");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).unwrap());
        let queue = OfflineQueue::new(store);
        queue
            .enqueue(Method::Post, "/issues", Some(json!({ "title": "offline" })))
            .await
            .unwrap();
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).unwrap());
    let transport = Arc::new(ScriptedTransport::ok());
    let engine = engine_over(store.clone(), transport.clone());

    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(transport.calls()[0].2, Some(json!({ "title": "offline" })));

    let reopened: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).unwrap());
    assert!(OfflineQueue::new(reopened).is_empty().await.unwrap());
}

#[tokio::test]
async fn test_retries_unreachable_when_configured() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    queue.enqueue(Method::Post, "/issues", Some(json!({}))).await.unwrap();

    let attempts = Arc::new(Mutex::new(0u32));
    let counter = attempts.clone();
    let transport = Arc::new(ScriptedTransport::new(move |_, _, _| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        if *n < 3 {
            Err(Error::Unreachable("timed out".to_string()))
        } else {
            Ok(json!({}))
        }
    }));

    let config = SyncConfig {
        max_retries: 2,
        retry_initial_delay_ms: 1,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::new(queue.clone(), transport, config);

    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(*attempts.lock().unwrap(), 3);
    assert!(queue.is_empty().await.unwrap());
}
