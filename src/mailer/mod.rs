//! The mailer facade.
//!
//! Orchestrates composition, the suppression check, delivery, and outcome
//! recording. Every send invocation terminates in exactly one persisted
//! record; delivery failures are swallowed into `failed` records so a relay
//! outage can never abort the caller's larger operation. Configuration
//! errors are the exception: they propagate before any record is created.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::config::MailConfig;
use crate::directory::UserDirectory;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::mime::{ComposedMail, MimeEncoder};
use crate::store::EmailStore;
use crate::transport::TcpTransport;
use crate::types::{Address, DeliveryState, EmailRecord, Message};

/// The mailer capability set.
///
/// Alternate implementations are substituted by injection; the host wires
/// whichever implementation it wants and callers depend only on this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a message to its recipient list. Returns the record created
    /// for the attempt; delivery failures surface as a `failed` record,
    /// not as an error.
    async fn mail_recipients(&self, message: Message) -> MailResult<EmailRecord>;

    /// Sends a message to a user resolved by id or name. The message's
    /// recipient list is replaced by the user's address.
    async fn mail_user(&self, user: &str, message: Message) -> MailResult<EmailRecord>;

    /// Opens and closes a channel to the relay, verifying connectivity,
    /// TLS negotiation, and authentication.
    async fn test_connection(&self) -> MailResult<()>;
}

/// Default mailer implementation.
pub struct DefaultMailer {
    config: Arc<MailConfig>,
    store: Arc<dyn EmailStore>,
    directory: Arc<dyn UserDirectory>,
    encoder: MimeEncoder,
}

impl DefaultMailer {
    /// Creates a mailer from its configuration and collaborators.
    pub fn new(
        config: Arc<MailConfig>,
        store: Arc<dyn EmailStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let encoder = MimeEncoder::from_config(&config);
        Self {
            config,
            store,
            directory,
            encoder,
        }
    }

    /// Returns the mailer configuration.
    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Creates and persists the record for one send attempt.
    fn record(
        &self,
        message: &Message,
        composed: &ComposedMail,
        state: DeliveryState,
    ) -> MailResult<EmailRecord> {
        let record = EmailRecord::new(
            message.subject.clone(),
            self.config.mail_from.clone(),
            message.joined_recipients(),
            message.body_html.clone(),
            state,
            composed.headers.clone(),
        );
        self.store.save(&record)?;
        Ok(record)
    }

    /// Opens a channel and transmits the composed message.
    async fn deliver(&self, message: &Message, composed: &ComposedMail) -> MailResult<()> {
        let envelope_from = Address::new(self.config.mail_from.as_str())?;
        let payload = MimeEncoder::prepare_data_content(&composed.raw);

        let channel = Channel::<TcpTransport>::open(&self.config).await?;
        channel
            .deliver(&envelope_from, &message.recipients, &payload)
            .await
    }
}

#[async_trait]
impl Mailer for DefaultMailer {
    async fn mail_recipients(&self, message: Message) -> MailResult<EmailRecord> {
        if message.recipients.is_empty() {
            return Err(MailError::new(
                MailErrorKind::MissingEmailAddress,
                "At least one recipient is required",
            ));
        }

        let composed = self.encoder.compose(&message)?;

        if self.config.stop_outgoing {
            tracing::debug!(
                recipients = %message.joined_recipients(),
                "outgoing mail is suppressed, recording without transmitting"
            );
            return self.record(&message, &composed, DeliveryState::Stopped);
        }

        match self.deliver(&message, &composed).await {
            Ok(()) => {
                tracing::info!(recipients = %message.joined_recipients(), "sent email");
                self.record(&message, &composed, DeliveryState::Success)
            }
            Err(err) if err.kind().is_delivery() => {
                tracing::error!(error = %err, "email delivery failed");
                self.record(&message, &composed, DeliveryState::Failed)
            }
            Err(err) => Err(err),
        }
    }

    async fn mail_user(&self, user: &str, message: Message) -> MailResult<EmailRecord> {
        let user = self
            .directory
            .lookup(user)
            .await?
            .ok_or_else(|| MailError::user_not_found("User doesn't exist"))?;

        let email = user.email.as_deref().ok_or_else(|| {
            MailError::new(
                MailErrorKind::MissingEmailAddress,
                "User doesn't have an email address",
            )
        })?;

        let mut message = message;
        message.recipients = vec![Address::new(email)?];

        self.mail_recipients(message).await
    }

    async fn test_connection(&self) -> MailResult<()> {
        let channel = Channel::<TcpTransport>::open(&self.config).await?;
        channel.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{StaticDirectory, User};
    use crate::mocks::test_message;
    use crate::store::MemoryStore;
    use crate::types::Attachment;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct Fixture {
        mailer: DefaultMailer,
        store: Arc<MemoryStore>,
    }

    async fn unused_port() -> u16 {
        // Bind then drop to obtain a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn fixture(config: MailConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        directory.insert(User::new("u1", "alice", "alice@example.com"));
        directory.insert(User::without_email("u2", "bob"));

        Fixture {
            mailer: DefaultMailer::new(Arc::new(config), store.clone(), directory),
            store,
        }
    }

    fn config(port: u16) -> MailConfig {
        MailConfig::builder()
            .smtp_host("127.0.0.1")
            .smtp_port(port)
            .mail_from("noreply@example.com")
            .site_title("Example Site")
            .conn_timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_suppression_records_stopped_without_transmitting() {
        let port = unused_port().await;
        let mut cfg = config(port);
        cfg.stop_outgoing = true;

        let fx = fixture(cfg);
        let record = fx.mailer.mail_recipients(test_message()).await.unwrap();

        assert_eq!(record.state, DeliveryState::Stopped);
        assert_eq!(record.recipient, "recipient@example.com");

        let records = fx.store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, DeliveryState::Stopped);
    }

    #[tokio::test]
    async fn test_refused_connection_records_failed_without_error() {
        let port = unused_port().await;
        let fx = fixture(config(port));

        let record = fx.mailer.mail_recipients(test_message()).await.unwrap();

        assert_eq!(record.state, DeliveryState::Failed);
        assert_eq!(fx.store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_recipients_rejected_without_record() {
        let port = unused_port().await;
        let fx = fixture(config(port));

        let mut message = test_message();
        message.recipients.clear();

        let err = fx.mailer.mail_recipients(message).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::MissingEmailAddress);
        assert!(fx.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compose_error_propagates_without_record() {
        let port = unused_port().await;
        let mut cfg = config(port);
        cfg.stop_outgoing = true;

        let fx = fixture(cfg);
        let mut message = test_message();
        message.attachments.push(Attachment::new("", vec![1]));

        let err = fx.mailer.mail_recipients(message).await.unwrap_err();
        assert!(err.kind().is_configuration());
        assert!(fx.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mail_user_unknown_user() {
        let port = unused_port().await;
        let fx = fixture(config(port));

        let err = fx
            .mailer
            .mail_user("nobody", test_message())
            .await
            .unwrap_err();
        assert!(err.kind().is_not_found());
        assert!(fx.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mail_user_without_email() {
        let port = unused_port().await;
        let fx = fixture(config(port));

        let err = fx.mailer.mail_user("bob", test_message()).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::MissingEmailAddress);
        assert!(fx.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mail_user_replaces_recipients() {
        let port = unused_port().await;
        let mut cfg = config(port);
        cfg.stop_outgoing = true;

        let fx = fixture(cfg);
        let record = fx.mailer.mail_user("alice", test_message()).await.unwrap();

        assert_eq!(record.recipient, "alice@example.com");
        assert_eq!(record.state, DeliveryState::Stopped);
    }

    #[tokio::test]
    async fn test_test_connection_fails_against_dead_relay() {
        let port = unused_port().await;
        let fx = fixture(config(port));

        let err = fx.mailer.test_connection().await.unwrap_err();
        assert!(err.kind().is_delivery());
        assert!(fx.store.list().unwrap().is_empty());
    }
}
