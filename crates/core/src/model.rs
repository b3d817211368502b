use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

// ── Frequency ─────────────────────────────────────────────────

/// Delivery cadence for one notification record.
///
/// `Instant` is a one-shot cadence triggered at selection time; the
/// periodic cadences gate deliveries on the elapsed time since the
/// last successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Instant,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Instant => "instant",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Minimum gap between deliveries, `None` for the one-shot cadence.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Frequency::Instant => None,
            Frequency::Daily => Some(Duration::hours(24)),
            Frequency::Weekly => Some(Duration::hours(7 * 24)),
            Frequency::Monthly => Some(Duration::hours(30 * 24)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CadenceError;

    /// Unrecognized cadences are rejected here, at construction time,
    /// never during due evaluation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instant" => Ok(Frequency::Instant),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(CadenceError::InvalidFrequency(other.to_string())),
        }
    }
}

// ── RecipientId ───────────────────────────────────────────────

/// Stable recipient identity, assigned from the directory's persisted
/// counter. Never positional and never reused after removal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecipientId(pub u64);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Notification ──────────────────────────────────────────────

/// Delivery state for one `(recipient, topic)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: String,
    pub frequency: Frequency,
    #[serde(default)]
    pub last_sent: Option<DateTime<Utc>>,
}

impl Notification {
    /// A fresh record. Instant selections count as sent immediately;
    /// periodic cadences start with no delivery history.
    pub fn new(topic: impl Into<String>, frequency: Frequency, now: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            frequency,
            last_sent: (frequency == Frequency::Instant).then_some(now),
        }
    }

    /// Record a successful delivery. `last_sent` never moves backwards.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.last_sent = Some(match self.last_sent {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }
}

// ── Recipient ─────────────────────────────────────────────────

/// An address subscribed to zero or more topics, with at most one
/// notification record per topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            topics: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn notification(&self, topic: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.topic == topic)
    }

    pub fn notification_mut(&mut self, topic: &str) -> Option<&mut Notification> {
        self.notifications.iter_mut().find(|n| n.topic == topic)
    }
}

// ── Directory ─────────────────────────────────────────────────

/// The persisted whole document: every recipient with their records,
/// plus the latest topic catalog snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    /// Next id to assign; persisted so ids stay stable across restarts.
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub recipients: IndexMap<RecipientId, Recipient>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Directory {
    /// Add a recipient. The address is the unique key, compared
    /// case-insensitively; insertion order is preserved for listing.
    pub fn add(&mut self, email: impl Into<String>) -> Result<RecipientId, CadenceError> {
        let email = email.into();
        if self
            .recipients
            .values()
            .any(|r| r.email.eq_ignore_ascii_case(&email))
        {
            return Err(CadenceError::DuplicateRecipient(email));
        }
        let id = RecipientId(self.next_id);
        self.next_id += 1;
        self.recipients.insert(id, Recipient::new(email));
        Ok(id)
    }

    /// Remove a recipient and all its notification records.
    /// `shift_remove` keeps the remaining entries in insertion order.
    pub fn remove(&mut self, id: RecipientId) -> Result<Recipient, CadenceError> {
        self.recipients
            .shift_remove(&id)
            .ok_or(CadenceError::NotFound(id))
    }

    /// Snapshot of all recipients in insertion order.
    pub fn list(&self) -> Vec<(RecipientId, &Recipient)> {
        self.recipients.iter().map(|(id, r)| (*id, r)).collect()
    }

    /// Replace the topic catalog snapshot.
    pub fn set_topics(&mut self, topics: Vec<String>) {
        self.topics = topics;
    }
}
