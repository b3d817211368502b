use chrono::{DateTime, Utc};

/// Build the subject and plain-text body for a topic-update email.
pub fn compose(topic: &str, now: DateTime<Utc>) -> (String, String) {
    let subject = format!("Notification Update: {topic}");
    let body = format!(
        "Dear Subscriber,\n\n\
         This is a notification update for the topic: {topic}.\n\n\
         Time sent: {}\n\n\
         Best regards,\n\
         Notification System\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    (subject, body)
}
