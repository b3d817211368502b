use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use cadence_catalog::{CatalogError, TopicSource};
use cadence_core::{CadenceError, Directory, Frequency, RecipientId};
use cadence_notify::{EmailTransport, TransportError};
use cadence_store::{StateStore, StoreError};

use crate::engine::Engine;

/// Mock transport counting attempts; fails for configured addresses.
#[derive(Default)]
struct MockTransport {
    attempts: AtomicUsize,
    fail_addresses: Vec<String>,
    delay_ms: u64,
    log: StdMutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailTransport for MockTransport {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), TransportError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(StdDuration::from_millis(self.delay_ms)).await;
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        if self.fail_addresses.iter().any(|a| a == to) {
            return Err(TransportError::Smtp("mock failure".to_string()));
        }
        Ok(())
    }
}

impl MockTransport {
    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Mock store holding the last saved snapshot in memory.
#[derive(Default)]
struct MockStore {
    saved: StdMutex<Option<Directory>>,
    fail_save: AtomicBool,
    fail_load: bool,
    save_count: AtomicUsize,
}

#[async_trait]
impl StateStore for MockStore {
    async fn load(&self) -> Result<Option<Directory>, StoreError> {
        if self.fail_load {
            return Err(StoreError::Serialize("mock load failure".to_string()));
        }
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, directory: &Directory) -> Result<(), StoreError> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock save failure",
            )));
        }
        *self.saved.lock().unwrap() = Some(directory.clone());
        Ok(())
    }
}

struct FixedSource(Vec<String>);

#[async_trait]
impl TopicSource for FixedSource {
    async fn fetch(&self, _locator: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait]
impl TopicSource for BrokenSource {
    async fn fetch(&self, _locator: &str) -> Result<Vec<String>, CatalogError> {
        Err(CatalogError::SourceUnavailable("connection refused".to_string()))
    }
}

fn catalog_directory() -> Directory {
    let mut dir = Directory::default();
    dir.set_topics(vec!["billing".to_string(), "security".to_string()]);
    dir
}

fn engine_with(
    directory: Directory,
    transport: MockTransport,
) -> (Arc<Engine>, Arc<MockTransport>, Arc<MockStore>) {
    let transport = Arc::new(transport);
    let store = Arc::new(MockStore::default());
    let engine = Arc::new(Engine::new(directory, store.clone(), transport.clone()));
    (engine, transport, store)
}

async fn last_sent(engine: &Engine, id: RecipientId, topic: &str) -> Option<chrono::DateTime<Utc>> {
    engine
        .list_recipients()
        .await
        .into_iter()
        .find(|(rid, _)| *rid == id)
        .and_then(|(_, r)| r.notification(topic).and_then(|n| n.last_sent))
}

// ── Directory operations ────────────────────────────────────────────

#[tokio::test]
async fn duplicate_add_fails_and_directory_is_unchanged() {
    let (engine, _, _) = engine_with(Directory::default(), MockTransport::default());
    engine.add_recipient("a@x.com").await.unwrap();
    let err = engine.add_recipient("a@x.com").await.unwrap_err();
    assert!(matches!(err, CadenceError::DuplicateRecipient(_)));
    assert_eq!(engine.list_recipients().await.len(), 1);
}

#[tokio::test]
async fn remove_drops_recipient_and_records_atomically() {
    let (engine, _, store) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("a@x.com").await.unwrap();
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();

    engine.remove_recipient(id).await.unwrap();
    assert!(engine.list_recipients().await.is_empty());

    let persisted = store.saved.lock().unwrap().clone().unwrap();
    assert!(persisted.recipients.is_empty());
}

#[tokio::test]
async fn remove_unknown_id_is_not_found() {
    let (engine, _, _) = engine_with(Directory::default(), MockTransport::default());
    let err = engine.remove_recipient(RecipientId(42)).await.unwrap_err();
    assert!(matches!(err, CadenceError::NotFound(RecipientId(42))));
}

// ── Rehydration ─────────────────────────────────────────────────────

#[tokio::test]
async fn rehydrate_restores_the_persisted_directory() {
    let store = Arc::new(MockStore::default());
    let mut dir = catalog_directory();
    dir.add("a@x.com").unwrap();
    *store.saved.lock().unwrap() = Some(dir);

    let engine = Engine::rehydrate(store, Arc::new(MockTransport::default())).await;
    assert_eq!(engine.list_recipients().await.len(), 1);
    assert_eq!(engine.topics().await, vec!["billing", "security"]);
}

#[tokio::test]
async fn rehydrate_degrades_to_empty_on_store_failure() {
    let store = Arc::new(MockStore {
        fail_load: true,
        ..MockStore::default()
    });
    let engine = Engine::rehydrate(store, Arc::new(MockTransport::default())).await;
    assert!(engine.list_recipients().await.is_empty());
}

// ── Topic catalog ───────────────────────────────────────────────────

#[tokio::test]
async fn refresh_replaces_the_topic_snapshot() {
    let (engine, _, store) = engine_with(Directory::default(), MockTransport::default());
    let topics = engine
        .refresh_topics(&FixedSource(vec!["billing".to_string()]), "sheet-id")
        .await
        .unwrap();
    assert_eq!(topics, vec!["billing"]);
    assert_eq!(engine.topics().await, vec!["billing"]);

    let persisted = store.saved.lock().unwrap().clone().unwrap();
    assert_eq!(persisted.topics, vec!["billing"]);
}

#[tokio::test]
async fn failed_refresh_keeps_the_existing_snapshot() {
    let (engine, _, _) = engine_with(catalog_directory(), MockTransport::default());
    let err = engine.refresh_topics(&BrokenSource, "sheet-id").await.unwrap_err();
    assert!(matches!(err, CadenceError::SourceUnavailable(_)));
    assert_eq!(engine.topics().await, vec!["billing", "security"]);
}

// ── Selection merge ─────────────────────────────────────────────────

#[tokio::test]
async fn selection_is_persisted_as_one_step() {
    let (engine, _, store) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();

    let persisted = store.saved.lock().unwrap().clone().unwrap();
    let recipient = &persisted.recipients[&id];
    assert_eq!(recipient.topics, vec!["billing"]);
    assert_eq!(recipient.notification("billing").unwrap().frequency, Frequency::Daily);
}

#[tokio::test]
async fn unknown_topic_selection_is_rejected() {
    let (engine, _, _) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();
    let err = engine
        .apply_selection(id, &["gossip".to_string()], Frequency::Daily)
        .await
        .unwrap_err();
    assert!(matches!(err, CadenceError::UnknownTopic(_)));

    let (_, recipient) = engine.list_recipients().await.into_iter().next().unwrap();
    assert!(recipient.notifications.is_empty());
}

// ── Instant cadence ─────────────────────────────────────────────────

#[tokio::test]
async fn instant_selection_sends_once_at_merge_time() {
    let (engine, transport, _) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();

    let results = engine
        .apply_selection(id, &["security".to_string()], Frequency::Instant)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(transport.attempts(), 1);
    assert!(last_sent(&engine, id, "security").await.is_some());

    // The periodic scan never re-evaluates an instant record.
    let report = engine.run_scan(Utc::now() + Duration::days(90)).await;
    assert_eq!(report.sent, 0);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn instant_failure_is_reported_to_the_caller() {
    let transport = MockTransport {
        fail_addresses: vec!["r@x.com".to_string()],
        ..MockTransport::default()
    };
    let (engine, transport, _) = engine_with(catalog_directory(), transport);
    let id = engine.add_recipient("r@x.com").await.unwrap();

    let results = engine
        .apply_selection(id, &["security".to_string()], Frequency::Instant)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(transport.attempts(), 1);
}

// ── Periodic dispatch ───────────────────────────────────────────────

#[tokio::test]
async fn daily_cycle_end_to_end() {
    let (engine, transport, _) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();

    // No history: due immediately.
    let t0 = Utc::now();
    let report = engine.run_scan(t0).await;
    assert_eq!(report.sent, 1);
    assert_eq!(transport.attempts(), 1);
    assert_eq!(last_sent(&engine, id, "billing").await, Some(t0));

    // One hour later: inside the window.
    let report = engine.run_scan(t0 + Duration::hours(1)).await;
    assert_eq!(report.sent, 0);
    assert_eq!(transport.attempts(), 1);

    // Past 24h: due again.
    let report = engine.run_scan(t0 + Duration::hours(25)).await;
    assert_eq!(report.sent, 1);
    assert_eq!(transport.attempts(), 2);
    assert_eq!(last_sent(&engine, id, "billing").await, Some(t0 + Duration::hours(25)));
}

#[tokio::test]
async fn one_failing_recipient_never_blocks_the_rest() {
    let transport = MockTransport {
        fail_addresses: vec!["broken@x.com".to_string()],
        ..MockTransport::default()
    };
    let (engine, transport, _) = engine_with(catalog_directory(), transport);
    let broken = engine.add_recipient("broken@x.com").await.unwrap();
    let healthy = engine.add_recipient("healthy@x.com").await.unwrap();
    for id in [broken, healthy] {
        engine
            .apply_selection(id, &["billing".to_string()], Frequency::Daily)
            .await
            .unwrap();
    }

    let now = Utc::now();
    let report = engine.run_scan(now).await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(transport.attempts(), 2);

    // Failure leaves last_sent unset so the next scan retries.
    assert_eq!(last_sent(&engine, broken, "billing").await, None);
    assert_eq!(last_sent(&engine, healthy, "billing").await, Some(now));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_deliver_at_most_once() {
    let transport = MockTransport {
        delay_ms: 20,
        ..MockTransport::default()
    };
    let (engine, transport, _) = engine_with(catalog_directory(), transport);
    let id = engine.add_recipient("r@x.com").await.unwrap();
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();

    let now = Utc::now();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.run_scan(now).await }));
    }

    let mut total_sent = 0;
    for handle in handles {
        total_sent += handle.await.unwrap().sent;
    }

    assert_eq!(total_sent, 1);
    assert_eq!(transport.attempts(), 1);
    assert_eq!(last_sent(&engine, id, "billing").await, Some(now));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_keep_every_pair_in_the_snapshot() {
    let transport = MockTransport {
        delay_ms: 20,
        ..MockTransport::default()
    };
    let (engine, _, store) = engine_with(catalog_directory(), transport);
    let a = engine.add_recipient("a@x.com").await.unwrap();
    let b = engine.add_recipient("b@x.com").await.unwrap();
    engine
        .apply_selection(a, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();
    engine
        .apply_selection(b, &["security".to_string()], Frequency::Daily)
        .await
        .unwrap();

    let now = Utc::now();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.run_scan(now).await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Commits for distinct pairs overlap; neither may persist a
    // snapshot that drops the other's last_sent.
    let persisted = store.saved.lock().unwrap().clone().unwrap();
    assert_eq!(
        persisted.recipients[&a].notification("billing").unwrap().last_sent,
        Some(now)
    );
    assert_eq!(
        persisted.recipients[&b].notification("security").unwrap().last_sent,
        Some(now)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_during_a_scan_stops_at_the_next_checkpoint() {
    let transport = MockTransport {
        delay_ms: 100,
        ..MockTransport::default()
    };
    let (engine, transport, _) = engine_with(catalog_directory(), transport);
    for email in ["a@x.com", "b@x.com", "c@x.com"] {
        let id = engine.add_recipient(email).await.unwrap();
        engine
            .apply_selection(id, &["billing".to_string()], Frequency::Daily)
            .await
            .unwrap();
    }

    let handle = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_scan(Utc::now()).await }
    });
    tokio::time::sleep(StdDuration::from_millis(30)).await;
    engine.request_cancel();
    let report = handle.await.unwrap();

    // The in-flight delivery completes; later recipients are skipped.
    assert!(report.evaluated >= 1);
    assert!(report.evaluated < 3);
    assert_eq!(transport.attempts(), report.evaluated);
}

#[tokio::test]
async fn save_failure_after_send_is_accepted() {
    let (engine, transport, store) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();

    store.fail_save.store(true, Ordering::SeqCst);
    let now = Utc::now();
    let report = engine.run_scan(now).await;

    // The send happened and the in-memory record advanced; only the
    // persisted snapshot is stale.
    assert_eq!(report.sent, 1);
    assert_eq!(transport.attempts(), 1);
    assert_eq!(last_sent(&engine, id, "billing").await, Some(now));
}

#[tokio::test]
async fn pair_locks_are_pruned_with_their_records() {
    let (engine, _, _) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();
    engine
        .apply_selection(
            id,
            &["billing".to_string(), "security".to_string()],
            Frequency::Daily,
        )
        .await
        .unwrap();

    // The scan takes a dispatch lock per record.
    engine.run_scan(Utc::now()).await;
    assert_eq!(engine.pair_lock_count(), 2);

    // Deselection drops the topic's lock with its record.
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();
    assert_eq!(engine.pair_lock_count(), 1);

    engine.remove_recipient(id).await.unwrap();
    assert_eq!(engine.pair_lock_count(), 0);
}

#[tokio::test]
async fn cancelled_scan_stops_before_any_recipient() {
    let (engine, transport, _) = engine_with(catalog_directory(), MockTransport::default());
    let id = engine.add_recipient("r@x.com").await.unwrap();
    engine
        .apply_selection(id, &["billing".to_string()], Frequency::Daily)
        .await
        .unwrap();

    engine.request_cancel();
    let report = engine.run_scan(Utc::now()).await;
    assert_eq!(report.evaluated, 0);
    assert_eq!(transport.attempts(), 0);
}
