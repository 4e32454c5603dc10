//! # Mailcraft
//!
//! Outbound email dispatch with a persisted audit trail:
//! - MIME composition (plain + HTML alternative bodies, attachments)
//! - SMTP delivery with STARTTLS and CRAM-MD5/PLAIN/LOGIN authentication
//! - One persisted record per send attempt (`success`, `failed`, `stopped`)
//! - Administrative suppression for staging environments
//!
//! A send never raises on a relay failure: the outcome lands in the record
//! store instead, where a dashboard can browse it. Configuration mistakes,
//! by contrast, surface immediately.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mailcraft::{DefaultMailer, MailConfig, Mailer, MemoryStore, Message, StaticDirectory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MailConfig::builder()
//!         .smtp_host("smtp.example.com")
//!         .smtp_port(587)
//!         .starttls(true)
//!         .credentials("relay-user", "relay-password")
//!         .mail_from("noreply@example.com")
//!         .site_title("Example Site")
//!         .build()?;
//!
//!     let mailer = DefaultMailer::new(
//!         Arc::new(config),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(StaticDirectory::new()),
//!     );
//!
//!     let message = Message::builder()
//!         .to("user@example.com")?
//!         .subject("Hello from Mailcraft")
//!         .body("This is the plain-text part.")
//!         .body_html("<p>This is the <b>HTML</b> part.</p>")
//!         .build()?;
//!
//!     let record = mailer.mail_recipients(message).await?;
//!     println!("send attempt recorded with state: {}", record.state);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Protocol layer
pub mod protocol;

// Transport layer
pub mod transport;

// Authentication
pub mod auth;

// MIME composition
pub mod mime;

// Delivery channel
pub mod channel;

// Record store
pub mod store;

// User directory
pub mod directory;

// Mailer facade
pub mod mailer;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{AuthMethod, Authenticator, Credentials};
pub use channel::Channel;
pub use config::{MailConfig, MailConfigBuilder};
pub use directory::{StaticDirectory, User, UserDirectory};
pub use errors::{MailError, MailErrorKind, MailResult};
pub use mailer::{DefaultMailer, Mailer};
pub use mime::{ComposedMail, MimeEncoder};
pub use protocol::{EsmtpCapabilities, SmtpCommand, SmtpResponse};
pub use store::{EmailStore, MemoryStore, SqliteStore};
pub use transport::{SmtpTransport, TcpTransport};
pub use types::{
    Address, Attachment, DeliveryState, EmailRecord, HeaderMap, Message, MessageBuilder,
};
