use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use cadence_catalog::{CatalogError, TopicSource};
use cadence_core::{CadenceError, Directory, Frequency, Recipient, RecipientId};
use cadence_notify::EmailTransport;
use cadence_store::StateStore;

use crate::dispatch::DeliveryResult;
use crate::merge::merge_selection;

/// The scheduling engine.
///
/// Owns the in-memory directory and funnels every mutation path
/// (add/remove, selection merge, dispatch commit) through
/// load-modify-save against the state store. The store is the single
/// source of truth across restarts; the in-memory copy only serves the
/// running process.
pub struct Engine {
    pub(crate) state: RwLock<Directory>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) transport: Arc<dyn EmailTransport>,
    /// Per-(recipient, topic) exclusion around read-evaluate-send-commit.
    pair_locks: StdMutex<HashMap<(RecipientId, String), Arc<tokio::sync::Mutex<()>>>>,
    /// Cooperative cancellation, checked between recipients during a scan.
    cancel: AtomicBool,
}

impl Engine {
    pub fn new(
        directory: Directory,
        store: Arc<dyn StateStore>,
        transport: Arc<dyn EmailTransport>,
    ) -> Self {
        Self {
            state: RwLock::new(directory),
            store,
            transport,
            pair_locks: StdMutex::new(HashMap::new()),
            cancel: AtomicBool::new(false),
        }
    }

    /// Load the persisted directory and build the engine around it.
    /// A store failure degrades to an empty directory instead of
    /// refusing to start.
    pub async fn rehydrate(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn EmailTransport>,
    ) -> Self {
        let directory = match store.load().await {
            Ok(Some(directory)) => directory,
            Ok(None) => {
                info!("no persisted directory, starting empty");
                Directory::default()
            }
            Err(e) => {
                warn!(error = %e, "state store load failed, starting with an empty directory");
                Directory::default()
            }
        };
        Self::new(directory, store, transport)
    }

    // ── Recipient directory ───────────────────────────────────

    pub async fn add_recipient(&self, email: &str) -> Result<RecipientId, CadenceError> {
        let mut dir = self.state.write().await;
        let id = dir.add(email)?;
        self.save(&dir).await?;
        info!(%id, email, "recipient added");
        Ok(id)
    }

    /// Remove a recipient and all its notification records. The write
    /// lock is held across the save so no partial state is observable.
    pub async fn remove_recipient(&self, id: RecipientId) -> Result<(), CadenceError> {
        let mut dir = self.state.write().await;
        let removed = dir.remove(id)?;
        self.save(&dir).await?;
        self.pair_locks.lock().unwrap().retain(|(rid, _), _| *rid != id);
        info!(%id, email = removed.email, "recipient removed");
        Ok(())
    }

    /// Fresh snapshot of all recipients in insertion order.
    pub async fn list_recipients(&self) -> Vec<(RecipientId, Recipient)> {
        let dir = self.state.read().await;
        dir.list().into_iter().map(|(id, r)| (id, r.clone())).collect()
    }

    // ── Topic catalog ─────────────────────────────────────────

    pub async fn topics(&self) -> Vec<String> {
        self.state.read().await.topics.clone()
    }

    /// Fetch a fresh topic snapshot and persist it. A failed fetch
    /// aborts the refresh and leaves the existing snapshot intact.
    pub async fn refresh_topics(
        &self,
        source: &dyn TopicSource,
        locator: &str,
    ) -> Result<Vec<String>, CadenceError> {
        let topics = source.fetch(locator).await.map_err(|e| match e {
            CatalogError::SourceUnavailable(s) => CadenceError::SourceUnavailable(s),
            CatalogError::MalformedSource(s) => CadenceError::MalformedSource(s),
        })?;

        let mut dir = self.state.write().await;
        dir.set_topics(topics.clone());
        self.save(&dir).await?;
        info!(count = topics.len(), "topic catalog refreshed");
        Ok(topics)
    }

    // ── Subscription merge ────────────────────────────────────

    /// Apply a recipient's selection: the desired topic set with one
    /// frequency for the whole batch. The merge is committed as a
    /// single step; instant topics are then delivered synchronously,
    /// out of band from the periodic scan, and their per-topic results
    /// are returned to the caller.
    pub async fn apply_selection(
        &self,
        id: RecipientId,
        desired: &[String],
        frequency: Frequency,
    ) -> Result<Vec<DeliveryResult>, CadenceError> {
        let now = Utc::now();

        let instant_topics = {
            let mut dir = self.state.write().await;
            let catalog = dir.topics.clone();
            let recipient = dir
                .recipients
                .get_mut(&id)
                .ok_or(CadenceError::NotFound(id))?;
            let outcome = merge_selection(recipient, &catalog, desired, frequency, now)?;
            let kept: Vec<String> =
                recipient.notifications.iter().map(|n| n.topic.clone()).collect();
            self.save(&dir).await?;
            // Deselected topics also lose their dispatch locks; the
            // registry tracks live records only.
            self.pair_locks
                .lock()
                .unwrap()
                .retain(|(rid, topic), _| *rid != id || kept.iter().any(|t| t == topic));
            outcome.instant_topics
        };

        let mut results = Vec::with_capacity(instant_topics.len());
        for topic in &instant_topics {
            results.push(self.send_instant(id, topic, now).await);
        }
        Ok(results)
    }

    // ── Cancellation ──────────────────────────────────────────

    /// Request cooperative cancellation of an in-progress scan. The
    /// scan stops at the next between-recipients checkpoint; committed
    /// state is retained.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    // ── Internals ─────────────────────────────────────────────

    pub(crate) fn pair_lock(
        &self,
        id: RecipientId,
        topic: &str,
    ) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.pair_locks.lock().unwrap();
        locks.entry((id, topic.to_string())).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) fn pair_lock_count(&self) -> usize {
        self.pair_locks.lock().unwrap().len()
    }

    pub(crate) async fn save(&self, directory: &Directory) -> Result<(), CadenceError> {
        self.store
            .save(directory)
            .await
            .map_err(|e| CadenceError::Store(e.to_string()))
    }
}
