use chrono::{DateTime, Utc};

use cadence_core::Notification;

/// Delivery-due status of one record at an evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    Due,
    NotDue,
}

/// Decide whether a record is eligible for delivery at `now`.
///
/// Instant records are one-shot at selection time and are never due
/// for the periodic scan. Periodic records are due when they have no
/// delivery history, or when the cadence interval has fully elapsed;
/// equality at the exact threshold counts as due.
pub fn due_status(notification: &Notification, now: DateTime<Utc>) -> DueStatus {
    let Some(interval) = notification.frequency.interval() else {
        return DueStatus::NotDue;
    };

    match notification.last_sent {
        None => DueStatus::Due,
        Some(last_sent) if now.signed_duration_since(last_sent) >= interval => DueStatus::Due,
        Some(_) => DueStatus::NotDue,
    }
}
