//! Error types for the mailer.
//!
//! Provides a single error type classified by kind, with SMTP status codes
//! attached where the server produced them. Kinds group into three families
//! that drive the facade's behavior: configuration errors propagate to the
//! caller, delivery errors become `failed` records, and not-found errors
//! surface from user resolution.

use std::fmt;
use thiserror::Error;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Mail error kinds categorizing different failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailErrorKind {
    // Configuration errors
    /// Configuration is invalid.
    ConfigurationInvalid,
    /// An address failed validation.
    InvalidAddress,
    /// An attachment violates the caller contract.
    AttachmentInvalid,
    /// A caller-supplied header is malformed.
    InvalidHeader,
    /// A required email address is missing.
    MissingEmailAddress,

    // User resolution
    /// The user identifier resolved to no user.
    UserNotFound,

    // Connection errors
    /// Connection was refused.
    ConnectionRefused,
    /// Connection was reset.
    ConnectionReset,
    /// Connect timed out.
    ConnectTimeout,
    /// Read timed out.
    ReadTimeout,
    /// Write timed out.
    WriteTimeout,

    // TLS errors
    /// TLS handshake failed.
    TlsHandshakeFailed,
    /// STARTTLS not supported by the server.
    StarttlsNotSupported,

    // Authentication errors
    /// Authentication was rejected.
    AuthenticationFailed,
    /// No mutually supported authentication mechanism.
    AuthMethodNotSupported,

    // Protocol errors
    /// Response from the server could not be parsed.
    InvalidResponse,
    /// The server answered with an unexpected status.
    UnexpectedResponse,
    /// The server rejected the message or a recipient.
    TransmitFailed,

    // Persistence
    /// The record store failed.
    StoreFailed,
}

impl MailErrorKind {
    /// Returns true for deployment/caller contract violations that must
    /// surface to the immediate caller.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MailErrorKind::ConfigurationInvalid
                | MailErrorKind::InvalidAddress
                | MailErrorKind::AttachmentInvalid
                | MailErrorKind::InvalidHeader
                | MailErrorKind::MissingEmailAddress
        )
    }

    /// Returns true for transport/protocol failures. The facade converts
    /// these into a persisted `failed` record instead of re-raising them.
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            MailErrorKind::ConnectionRefused
                | MailErrorKind::ConnectionReset
                | MailErrorKind::ConnectTimeout
                | MailErrorKind::ReadTimeout
                | MailErrorKind::WriteTimeout
                | MailErrorKind::TlsHandshakeFailed
                | MailErrorKind::StarttlsNotSupported
                | MailErrorKind::AuthenticationFailed
                | MailErrorKind::AuthMethodNotSupported
                | MailErrorKind::InvalidResponse
                | MailErrorKind::UnexpectedResponse
                | MailErrorKind::TransmitFailed
        )
    }

    /// Returns true when a user identifier resolved to nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MailErrorKind::UserNotFound)
    }
}

impl fmt::Display for MailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailErrorKind::ConfigurationInvalid => write!(f, "Invalid configuration"),
            MailErrorKind::InvalidAddress => write!(f, "Invalid email address"),
            MailErrorKind::AttachmentInvalid => write!(f, "Invalid attachment"),
            MailErrorKind::InvalidHeader => write!(f, "Invalid header"),
            MailErrorKind::MissingEmailAddress => write!(f, "Missing email address"),
            MailErrorKind::UserNotFound => write!(f, "User not found"),
            MailErrorKind::ConnectionRefused => write!(f, "Connection refused"),
            MailErrorKind::ConnectionReset => write!(f, "Connection reset"),
            MailErrorKind::ConnectTimeout => write!(f, "Connect timed out"),
            MailErrorKind::ReadTimeout => write!(f, "Read timed out"),
            MailErrorKind::WriteTimeout => write!(f, "Write timed out"),
            MailErrorKind::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            MailErrorKind::StarttlsNotSupported => write!(f, "STARTTLS not supported"),
            MailErrorKind::AuthenticationFailed => write!(f, "Authentication failed"),
            MailErrorKind::AuthMethodNotSupported => write!(f, "Auth method not supported"),
            MailErrorKind::InvalidResponse => write!(f, "Invalid server response"),
            MailErrorKind::UnexpectedResponse => write!(f, "Unexpected response"),
            MailErrorKind::TransmitFailed => write!(f, "Transmission rejected"),
            MailErrorKind::StoreFailed => write!(f, "Record store failed"),
        }
    }
}

/// Enhanced SMTP status code (RFC 2034).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedStatusCode {
    /// Class (2=success, 4=temporary, 5=permanent).
    pub class: u8,
    /// Subject (e.g., 1=addressing, 2=mailbox, 3=mail system).
    pub subject: u16,
    /// Detail code.
    pub detail: u16,
}

impl EnhancedStatusCode {
    /// Parses an enhanced status code from a string (e.g., "5.1.1").
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return None;
        }
        Some(Self {
            class: parts[0].parse().ok()?,
            subject: parts[1].parse().ok()?,
            detail: parts[2].parse().ok()?,
        })
    }

    /// Returns true if this is a permanent failure.
    pub fn is_permanent(&self) -> bool {
        self.class == 5
    }
}

impl fmt::Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// Mail error with detailed information.
#[derive(Error, Debug)]
pub struct MailError {
    /// Error kind.
    kind: MailErrorKind,
    /// Human-readable message.
    message: String,
    /// SMTP status code if available.
    smtp_code: Option<u16>,
    /// Enhanced status code if available.
    enhanced_code: Option<EnhancedStatusCode>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailError {
    /// Creates a new mail error.
    pub fn new(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            enhanced_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP status code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the enhanced status code.
    pub fn with_enhanced_code(mut self, code: EnhancedStatusCode) -> Self {
        self.enhanced_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> MailErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP status code if available.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns the enhanced status code if available.
    pub fn enhanced_code(&self) -> Option<&EnhancedStatusCode> {
        self.enhanced_code.as_ref()
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConfigurationInvalid, message)
    }

    /// Creates an attachment contract error.
    pub fn attachment(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::AttachmentInvalid, message)
    }

    /// Creates an address validation error.
    pub fn address(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidAddress, message)
    }

    /// Creates a user-not-found error.
    pub fn user_not_found(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::UserNotFound, message)
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConnectionRefused, message)
    }

    /// Creates a timeout error.
    pub fn timeout(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }

    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::TlsHandshakeFailed, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::AuthenticationFailed, message)
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidResponse, message)
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::StoreFailed, message)
    }

    /// Creates an error from an SMTP response status.
    pub fn from_smtp_response(code: u16, message: impl Into<String>) -> Self {
        let msg = message.into();
        let kind = match code {
            530 | 535 => MailErrorKind::AuthenticationFailed,
            538 => MailErrorKind::AuthMethodNotSupported,
            454 => MailErrorKind::TlsHandshakeFailed,
            550 | 551 | 552 | 553 | 554 => MailErrorKind::TransmitFailed,
            500 | 501 | 502 | 503 => MailErrorKind::InvalidResponse,
            _ => MailErrorKind::UnexpectedResponse,
        };
        Self::new(kind, msg).with_smtp_code(code)
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.smtp_code {
            write!(f, " (SMTP {})", code)?;
        }
        if let Some(enhanced) = &self.enhanced_code {
            write!(f, " [{}]", enhanced)?;
        }
        Ok(())
    }
}
