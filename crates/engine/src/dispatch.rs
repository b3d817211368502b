use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use cadence_core::RecipientId;
use cadence_notify::compose;

use crate::due::{due_status, DueStatus};
use crate::engine::Engine;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub recipient: RecipientId,
    pub email: String,
    pub topic: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Summary of one periodic scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Notification records examined.
    pub evaluated: usize,
    pub sent: usize,
    pub failed: usize,
    /// One entry per delivery attempt; due-nothing records produce none.
    pub deliveries: Vec<DeliveryResult>,
}

impl Engine {
    /// Periodic scan: evaluate every recipient × record at `now` and
    /// deliver what is due. A failure for one pair is reported in the
    /// scan summary and never blocks delivery to the rest.
    pub async fn run_scan(&self, now: DateTime<Utc>) -> ScanReport {
        let ids: Vec<RecipientId> = {
            let dir = self.state.read().await;
            dir.recipients.keys().copied().collect()
        };

        let mut report = ScanReport::default();
        for id in ids {
            if self.cancelled() {
                info!("scan cancelled, stopping between recipients");
                break;
            }
            // Removed mid-scan: nothing left to evaluate for this id.
            let Some((email, topics)) = self.recipient_snapshot(id).await else {
                continue;
            };
            for topic in topics {
                report.evaluated += 1;
                if let Some(result) = self.deliver_due(id, &email, &topic, now).await {
                    if result.success {
                        report.sent += 1;
                    } else {
                        report.failed += 1;
                    }
                    report.deliveries.push(result);
                }
            }
        }

        info!(
            evaluated = report.evaluated,
            sent = report.sent,
            failed = report.failed,
            "scan complete"
        );
        report
    }

    /// One-shot instant delivery, invoked synchronously from the
    /// selection action. The record's `last_sent` was already stamped
    /// by the merge; success or failure is returned to the caller and
    /// the periodic scan never retries it.
    pub(crate) async fn send_instant(
        &self,
        id: RecipientId,
        topic: &str,
        now: DateTime<Utc>,
    ) -> DeliveryResult {
        let lock = self.pair_lock(id, topic);
        let _guard = lock.lock().await;

        let email = {
            let dir = self.state.read().await;
            dir.recipients.get(&id).map(|r| r.email.clone())
        };
        let Some(email) = email else {
            return DeliveryResult {
                recipient: id,
                email: String::new(),
                topic: topic.to_string(),
                success: false,
                error: Some("recipient removed".to_string()),
            };
        };

        self.attempt(id, &email, topic, now).await
    }

    /// Evaluate one record under its pair lock and deliver if due.
    ///
    /// The record is re-read under the lock: a concurrent evaluator may
    /// have committed a send since the scan snapshot was taken, which
    /// is what makes delivery at-most-once per due cycle.
    async fn deliver_due(
        &self,
        id: RecipientId,
        email: &str,
        topic: &str,
        now: DateTime<Utc>,
    ) -> Option<DeliveryResult> {
        let lock = self.pair_lock(id, topic);
        let _guard = lock.lock().await;

        let record = {
            let dir = self.state.read().await;
            dir.recipients
                .get(&id)
                .and_then(|r| r.notification(topic))
                .cloned()
        }?;

        if due_status(&record, now) == DueStatus::NotDue {
            return None;
        }

        let result = self.attempt(id, email, topic, now).await;
        if result.success {
            // The send and the last_sent update are one commit. The
            // write lock stays held across the save, like every other
            // mutation path: a commit for another pair can neither
            // interleave its save nor persist a snapshot missing this
            // one. A save failure here is accepted: the next scan may
            // deliver again.
            let mut dir = self.state.write().await;
            if let Some(n) = dir
                .recipients
                .get_mut(&id)
                .and_then(|r| r.notification_mut(topic))
            {
                n.mark_sent(now);
            }
            if let Err(e) = self.save(&dir).await {
                warn!(
                    error = %e,
                    %id,
                    topic,
                    "state save failed after send; duplicate delivery possible on next scan"
                );
            }
        }
        Some(result)
    }

    /// Single transport attempt; failure leaves `last_sent` untouched
    /// so the next scan retries.
    async fn attempt(
        &self,
        id: RecipientId,
        email: &str,
        topic: &str,
        now: DateTime<Utc>,
    ) -> DeliveryResult {
        let (subject, body) = compose(topic, now);
        match self.transport.send(email, &subject, &body).await {
            Ok(()) => {
                info!(recipient = email, topic, "notification delivered");
                DeliveryResult {
                    recipient: id,
                    email: email.to_string(),
                    topic: topic.to_string(),
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(recipient = email, topic, error = %e, "notification delivery failed");
                DeliveryResult {
                    recipient: id,
                    email: email.to_string(),
                    topic: topic.to_string(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn recipient_snapshot(&self, id: RecipientId) -> Option<(String, Vec<String>)> {
        let dir = self.state.read().await;
        dir.recipients.get(&id).map(|r| {
            (
                r.email.clone(),
                r.notifications.iter().map(|n| n.topic.clone()).collect(),
            )
        })
    }
}
