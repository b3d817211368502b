//! SMTP email transport via `lettre` with TLS support.
//!
//! Delivers topic notifications through an SMTP server. Supports
//! STARTTLS and implicit TLS connections, and bounds every send
//! attempt with the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use cadence_core::config::SmtpConfig;

use crate::traits::{EmailTransport, TransportError};

/// Sends topic-update emails via SMTP.
pub struct SmtpTransport {
    /// Async SMTP transport for sending emails.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Sender mailbox.
    from: Mailbox,
    /// Upper bound on a single send attempt.
    timeout: Duration,
}

impl SmtpTransport {
    /// Build a transport from SMTP configuration.
    ///
    /// Port 465 always uses implicit TLS; otherwise `tls` selects
    /// STARTTLS or a plain connection. SMTP credentials are resolved
    /// from the `SMTP_USERNAME` and `SMTP_PASSWORD` environment
    /// variables; if both are set they are passed to the transport,
    /// otherwise the connection is unauthenticated.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| TransportError::Config(e.to_string()))?;

        let mut builder = if config.port == 465 || config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Config(e.to_string()))?
                .port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        // Attach credentials from environment if available.
        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    /// Send one message to one recipient, bounded by the configured
    /// timeout. A timeout counts as a failed attempt, never a hang.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| TransportError::Config(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        let attempt = tokio::time::timeout(self.timeout, self.transport.send(email));
        match attempt.await {
            Ok(Ok(_)) => {
                tracing::info!(to, subject, "notification delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Smtp(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.timeout.as_secs())),
        }
    }
}
