//! Core types for the mailer.
//!
//! This module provides:
//! - Address types with validation
//! - Header mapping with case-insensitive replace semantics
//! - Attachment handling with media-type inference
//! - The outgoing message and its builder
//! - Delivery states and the persisted email record

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{MailError, MailResult};

/// Email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com").
    pub email: String,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> MailResult<Self> {
        let email = email.into();
        Self::validate_email(&email)?;
        Ok(Self { name: None, email })
    }

    /// Creates a new address with display name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> MailResult<Self> {
        let email = email.into();
        Self::validate_email(&email)?;
        Ok(Self {
            name: Some(name.into()),
            email,
        })
    }

    /// Parses an address from a string (e.g., "John Doe <john@example.com>").
    pub fn parse(s: &str) -> MailResult<Self> {
        let s = s.trim();

        // Check for "Name <email>" format
        if let Some(start) = s.find('<') {
            if let Some(end) = s.find('>') {
                let name = s[..start].trim().trim_matches('"');
                let email = s[start + 1..end].trim();
                return Self::with_name(name, email);
            }
        }

        // Plain email address
        Self::new(s)
    }

    /// Validates an email address according to RFC 5321/5322.
    fn validate_email(email: &str) -> MailResult<()> {
        if email.is_empty() {
            return Err(MailError::address("Email address cannot be empty"));
        }

        if email.len() > 254 {
            return Err(MailError::address(
                "Email address too long (max 254 characters)",
            ));
        }

        // Must have exactly one @
        let at_count = email.chars().filter(|c| *c == '@').count();
        if at_count != 1 {
            return Err(MailError::address(
                "Email address must contain exactly one @",
            ));
        }

        let parts: Vec<&str> = email.split('@').collect();
        let local = parts[0];
        let domain = parts[1];

        if local.is_empty() || local.len() > 64 {
            return Err(MailError::address("Local part must be 1-64 characters"));
        }

        if domain.is_empty() {
            return Err(MailError::address("Domain cannot be empty"));
        }

        if email.chars().any(|c| c.is_control()) {
            return Err(MailError::address(
                "Email address cannot contain control characters",
            ));
        }

        Ok(())
    }

    /// Returns the email part only.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name if present.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Formats the address for SMTP MAIL FROM/RCPT TO commands.
    pub fn to_smtp(&self) -> String {
        format!("<{}>", self.email)
    }

    /// Formats the address for email headers.
    pub fn to_header(&self) -> String {
        match &self.name {
            Some(name) => {
                // Quote name if it contains special characters
                if name.contains(|c: char| !c.is_alphanumeric() && c != ' ') {
                    format!("\"{}\" <{}>", name, self.email)
                } else {
                    format!("{} <{}>", name, self.email)
                }
            }
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header())
    }
}

impl TryFrom<&str> for Address {
    type Error = MailError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = MailError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Address::parse(&s)
    }
}

/// Ordered header mapping with case-insensitive replace-on-set semantics.
///
/// Setting a header whose name already exists replaces the value in place;
/// a header is never duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing an existing entry with the same
    /// case-insensitive name or appending a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Returns a header value by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if a header with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the map, yielding the entries in insertion order.
    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }
}

/// File attachment with an explicit or inferred media type.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename.
    pub filename: String,
    /// Explicit media type; inferred from the filename extension when absent.
    pub media_type: Option<String>,
    /// Binary content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment whose media type is inferred from the filename.
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            media_type: None,
            data,
        }
    }

    /// Creates an attachment with an explicit media type.
    pub fn with_media_type(
        filename: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            media_type: Some(media_type.into()),
            data,
        }
    }

    /// Resolves the effective media type: the explicit one when given,
    /// otherwise a guess from the filename extension, falling back to
    /// `application/octet-stream`. Malformed attachments fail fast.
    pub fn resolved_media_type(&self) -> MailResult<mime::Mime> {
        if self.filename.is_empty() {
            return Err(MailError::attachment("Attachment filename cannot be empty"));
        }

        match &self.media_type {
            Some(explicit) => explicit.parse::<mime::Mime>().map_err(|_| {
                MailError::attachment(format!(
                    "Attachment '{}' has invalid media type '{}'",
                    self.filename, explicit
                ))
            }),
            None => Ok(mime_guess::from_path(&self.filename).first_or_octet_stream()),
        }
    }
}

/// An outgoing email message as supplied by the caller.
///
/// The configured sender identity is not part of the message; the builder
/// injects it at composition time. Both bodies are mandatory: the plain and
/// HTML parts together form the multipart alternative.
#[derive(Debug, Clone)]
pub struct Message {
    /// Subject line.
    pub subject: String,
    /// Recipient list (blind-copied as a group on the wire).
    pub recipients: Vec<Address>,
    /// Plain-text body.
    pub body: String,
    /// HTML body.
    pub body_html: String,
    /// Caller-supplied headers, merged over the generated ones.
    pub headers: HeaderMap,
    /// Caller-set Reply-To; the configured fallback applies when absent.
    pub reply_to: Option<Address>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a new message builder.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Returns the recipient addresses joined for the To/Bcc headers and
    /// the persisted record.
    pub fn joined_recipients(&self) -> String {
        self.recipients
            .iter()
            .map(|a| a.email.clone())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builder for outgoing messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    subject: String,
    recipients: Vec<Address>,
    body: Option<String>,
    body_html: Option<String>,
    headers: HeaderMap,
    reply_to: Option<Address>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Adds a recipient.
    pub fn to(mut self, address: impl TryInto<Address, Error = MailError>) -> MailResult<Self> {
        self.recipients.push(address.try_into()?);
        Ok(self)
    }

    /// Adds multiple recipients.
    pub fn to_many<I, A>(mut self, addresses: I) -> MailResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: TryInto<Address, Error = MailError>,
    {
        for addr in addresses {
            self.recipients.push(addr.try_into()?);
        }
        Ok(self)
    }

    /// Sets the plain-text body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the HTML body.
    pub fn body_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    /// Sets a custom header (replaces an existing one of the same name).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the Reply-To address.
    pub fn reply_to(
        mut self,
        address: impl TryInto<Address, Error = MailError>,
    ) -> MailResult<Self> {
        self.reply_to = Some(address.try_into()?);
        Ok(self)
    }

    /// Adds an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Builds the message. Both bodies are required; the pairing is what
    /// makes the composed message multipart.
    pub fn build(self) -> MailResult<Message> {
        let body = self
            .body
            .ok_or_else(|| MailError::configuration("Plain-text body is required"))?;
        let body_html = self
            .body_html
            .ok_or_else(|| MailError::configuration("HTML body is required"))?;

        Ok(Message {
            subject: self.subject,
            recipients: self.recipients,
            body,
            body_html,
            headers: self.headers,
            reply_to: self.reply_to,
            attachments: self.attachments,
        })
    }
}

/// Terminal state of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// The message was transmitted to the relay.
    Success,
    /// Transmission raised a transport error.
    Failed,
    /// Sending was administratively suppressed; no transport attempt made.
    Stopped,
}

impl DeliveryState {
    /// Returns the state tag as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Success => "success",
            DeliveryState::Failed => "failed",
            DeliveryState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryState {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(DeliveryState::Success),
            "failed" => Ok(DeliveryState::Failed),
            "stopped" => Ok(DeliveryState::Stopped),
            other => Err(MailError::store(format!(
                "Unknown delivery state '{}'",
                other
            ))),
        }
    }
}

/// Persisted record of one send attempt.
///
/// Created exactly once per send invocation, immediately after the outcome
/// is known, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Record id.
    pub id: String,
    /// Subject line as sent.
    pub subject: String,
    /// Configured sender address.
    pub sender: String,
    /// Recipient list joined to one text field.
    pub recipient: String,
    /// Rendered HTML body.
    pub body_html: String,
    /// Terminal state of the attempt.
    pub state: DeliveryState,
    /// Header snapshot in composed order.
    pub headers: Vec<(String, String)>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl EmailRecord {
    /// Creates a record with a fresh id and the current timestamp.
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        body_html: impl Into<String>,
        state: DeliveryState,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            body_html: body_html.into(),
            state,
            headers,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("test@example.com").unwrap();
        assert_eq!(addr.email, "test@example.com");
        assert!(addr.name.is_none());

        let addr = Address::parse("John Doe <john@example.com>").unwrap();
        assert_eq!(addr.email, "john@example.com");
        assert_eq!(addr.name, Some("John Doe".to_string()));

        let addr = Address::parse("\"John, Doe\" <john@example.com>").unwrap();
        assert_eq!(addr.email, "john@example.com");
        assert_eq!(addr.name, Some("John, Doe".to_string()));
    }

    #[test]
    fn test_address_validation() {
        assert!(Address::new("test@example.com").is_ok());
        assert!(Address::new("test.name@sub.example.com").is_ok());

        assert!(Address::new("").is_err());
        assert!(Address::new("no-at-sign").is_err());
        assert!(Address::new("two@@signs.com").is_err());
        assert!(Address::new("@no-local.com").is_err());
        assert!(Address::new("no-domain@").is_err());
    }

    #[test]
    fn test_header_map_replaces_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.set("X-Custom", "first");
        headers.set("x-custom", "second");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-CUSTOM"), Some("second"));
    }

    #[test]
    fn test_header_map_preserves_order() {
        let mut headers = HeaderMap::new();
        headers.set("A", "1");
        headers.set("B", "2");
        headers.set("a", "3");

        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(entries, vec![("A", "3"), ("B", "2")]);
    }

    #[rstest::rstest]
    #[case("notes.txt", Some("text/plain"), "text/plain")]
    #[case("report.pdf", None, "application/pdf")]
    #[case("photo.jpg", None, "image/jpeg")]
    #[case("blob.unknownext", None, "application/octet-stream")]
    fn test_attachment_media_types(
        #[case] filename: &str,
        #[case] explicit: Option<&str>,
        #[case] expected: &str,
    ) {
        let attachment = match explicit {
            Some(media_type) => Attachment::with_media_type(filename, media_type, vec![1, 2, 3]),
            None => Attachment::new(filename, vec![1, 2, 3]),
        };
        let mime = attachment.resolved_media_type().unwrap();
        assert_eq!(mime.essence_str(), expected);
    }

    #[test]
    fn test_attachment_contract_violations() {
        let attachment = Attachment::new("", vec![1]);
        let err = attachment.resolved_media_type().unwrap_err();
        assert!(err.kind().is_configuration());

        let attachment = Attachment::with_media_type("x.bin", "not a type", vec![1]);
        assert!(attachment.resolved_media_type().is_err());
    }

    #[test]
    fn test_message_builder_requires_both_bodies() {
        let result = Message::builder()
            .to("user@example.com")
            .unwrap()
            .subject("Test")
            .body("plain only")
            .build();
        assert!(result.is_err());

        let result = Message::builder()
            .to("user@example.com")
            .unwrap()
            .subject("Test")
            .body_html("<p>html only</p>")
            .build();
        assert!(result.is_err());

        let message = Message::builder()
            .to("user@example.com")
            .unwrap()
            .subject("Test")
            .body("plain")
            .body_html("<p>html</p>")
            .build()
            .unwrap();
        assert_eq!(message.recipients.len(), 1);
    }

    #[test]
    fn test_joined_recipients() {
        let message = Message::builder()
            .to_many(["a@example.com", "b@example.com"])
            .unwrap()
            .body("plain")
            .body_html("<p>html</p>")
            .build()
            .unwrap();
        assert_eq!(message.joined_recipients(), "a@example.com, b@example.com");
    }

    #[test]
    fn test_delivery_state_round_trip() {
        for state in [
            DeliveryState::Success,
            DeliveryState::Failed,
            DeliveryState::Stopped,
        ] {
            assert_eq!(state.as_str().parse::<DeliveryState>().unwrap(), state);
        }
        assert!("unknown".parse::<DeliveryState>().is_err());
    }
}
