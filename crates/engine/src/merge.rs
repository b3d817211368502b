use chrono::{DateTime, Utc};

use cadence_core::{CadenceError, Frequency, Notification, Recipient};

/// Outcome of merging one selection into a recipient.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Topics whose one-shot instant send must be issued now.
    pub instant_topics: Vec<String>,
}

/// Reconcile a recipient's desired topic set and cadence into its
/// notification records.
///
/// One frequency applies to the whole selected batch. Existing records
/// keep their `last_sent` on a cadence change; for `instant`, the merge
/// itself stamps `last_sent` — that update is the send trigger.
/// Records for topics dropped from the selection are deleted, keeping
/// `topics` and `notifications` consistent.
///
/// Every desired topic must exist in the catalog snapshot; otherwise
/// the merge fails with `UnknownTopic` before touching the recipient.
pub fn merge_selection(
    recipient: &mut Recipient,
    catalog: &[String],
    desired: &[String],
    frequency: Frequency,
    now: DateTime<Utc>,
) -> Result<MergeOutcome, CadenceError> {
    // Validate the whole batch before mutating anything.
    for topic in desired {
        if !catalog.iter().any(|t| t == topic) {
            return Err(CadenceError::UnknownTopic(topic.clone()));
        }
    }

    // De-duplicate while keeping selection order; one record per topic.
    let mut topics: Vec<String> = Vec::with_capacity(desired.len());
    for topic in desired {
        if !topics.contains(topic) {
            topics.push(topic.clone());
        }
    }

    let mut outcome = MergeOutcome::default();
    for topic in &topics {
        match recipient.notification_mut(topic) {
            Some(record) => {
                record.frequency = frequency;
                if frequency == Frequency::Instant {
                    record.mark_sent(now);
                }
            }
            None => recipient
                .notifications
                .push(Notification::new(topic.clone(), frequency, now)),
        }
        if frequency == Frequency::Instant {
            outcome.instant_topics.push(topic.clone());
        }
    }

    // Deselected topics lose their record.
    recipient.notifications.retain(|n| topics.contains(&n.topic));
    recipient.topics = topics;

    Ok(outcome)
}
