//! MIME composition for outgoing messages.
//!
//! Produces RFC 5322 compliant messages with:
//! - Header encoding (RFC 2047) and folding
//! - The configured sender identity and combined To/Bcc recipient headers
//! - Caller-header merging and the Reply-To fallback
//! - Base64 `multipart/alternative` bodies (plain + HTML)
//! - Base64 attachment parts under `multipart/mixed`

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use uuid::Uuid;

use crate::config::MailConfig;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::types::{Address, Attachment, Message};

/// A fully composed message: the ordered header snapshot plus the raw
/// RFC 5322 bytes. The snapshot is what the email record persists.
#[derive(Debug, Clone)]
pub struct ComposedMail {
    /// Headers in composed order, values as written on the wire.
    pub headers: Vec<(String, String)>,
    /// Raw message bytes (headers + body, CRLF line endings).
    pub raw: Vec<u8>,
}

impl ComposedMail {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Composes outgoing messages from caller fields plus configured identity.
#[derive(Debug, Clone)]
pub struct MimeEncoder {
    /// From display name.
    site_title: String,
    /// From and envelope sender address.
    mail_from: String,
    /// Reply-To applied when the caller did not set one.
    reply_to: Option<String>,
    /// X-Mailer marker, absent when version-hiding is configured.
    mailer_tag: Option<String>,
}

impl MimeEncoder {
    /// Creates an encoder from the mailer configuration.
    pub fn from_config(config: &MailConfig) -> Self {
        let mailer_tag = if config.hide_version {
            None
        } else {
            Some(format!("mailcraft {}", env!("CARGO_PKG_VERSION")))
        };

        Self {
            site_title: config.site_title.clone(),
            mail_from: config.mail_from.clone(),
            reply_to: config.reply_to.clone(),
            mailer_tag,
        }
    }

    /// Composes a message into its header snapshot and raw bytes.
    pub fn compose(&self, message: &Message) -> MailResult<ComposedMail> {
        let mut headers: Vec<(String, String)> = Vec::new();

        let from = if self.site_title.is_empty() {
            self.mail_from.clone()
        } else {
            Address::with_name(self.site_title.as_str(), self.mail_from.as_str())?.to_header()
        };
        headers.push(("From".to_string(), from));

        // Recipients are blind-copied as a group: To and Bcc carry the same
        // joined list so no recipient is individually addressed.
        let recipients = message.joined_recipients();
        headers.push(("To".to_string(), recipients.clone()));
        headers.push(("Bcc".to_string(), recipients));

        headers.push(("Subject".to_string(), encode_header(&message.subject)));
        headers.push(("Date".to_string(), format_date()));

        if let Some(tag) = &self.mailer_tag {
            headers.push(("X-Mailer".to_string(), tag.clone()));
        }

        // Caller headers replace same-named entries or are appended.
        for (name, value) in message.headers.iter() {
            validate_header_name(name)?;
            set_header(&mut headers, name, encode_header(value));
        }

        if let Some(reply_to) = &message.reply_to {
            set_header(&mut headers, "Reply-To", reply_to.to_header());
        } else if let Some(reply_to) = &self.reply_to {
            // Configured fallback applies only when the caller set nothing.
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("Reply-To")) {
                headers.push(("Reply-To".to_string(), reply_to.clone()));
            }
        }

        headers.push(("MIME-Version".to_string(), "1.0".to_string()));

        let alt_boundary = generate_boundary();
        let mixed_boundary = if message.attachments.is_empty() {
            None
        } else {
            Some(generate_boundary())
        };

        let content_type = match &mixed_boundary {
            Some(boundary) => format!("multipart/mixed; boundary=\"{}\"", boundary),
            None => format!("multipart/alternative; boundary=\"{}\"", alt_boundary),
        };
        headers.push(("Content-Type".to_string(), content_type));

        // Render headers
        let mut raw = Vec::new();
        for (name, value) in &headers {
            write_header(&mut raw, name, value);
        }
        raw.extend_from_slice(b"\r\n");

        // Render body
        match &mixed_boundary {
            Some(mixed) => {
                raw.extend_from_slice(format!("--{}\r\n", mixed).as_bytes());
                write_header(
                    &mut raw,
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{}\"", alt_boundary),
                );
                raw.extend_from_slice(b"\r\n");
                write_alternative_body(&mut raw, message, &alt_boundary);

                for attachment in &message.attachments {
                    raw.extend_from_slice(format!("--{}\r\n", mixed).as_bytes());
                    write_attachment(&mut raw, attachment)?;
                }

                raw.extend_from_slice(format!("--{}--\r\n", mixed).as_bytes());
            }
            None => {
                write_alternative_body(&mut raw, message, &alt_boundary);
            }
        }

        Ok(ComposedMail { headers, raw })
    }

    /// Prepares the DATA payload with dot-stuffing and the terminating
    /// `<CRLF>.<CRLF>`.
    pub fn prepare_data_content(encoded: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(encoded.len() + 100);
        let mut at_line_start = true;

        for &byte in encoded {
            if at_line_start && byte == b'.' {
                // Dot-stuffing: double dots at start of line
                output.push(b'.');
            }

            output.push(byte);
            at_line_start = byte == b'\n';
        }

        if !output.ends_with(b"\r\n") {
            if output.ends_with(b"\n") {
                output.pop();
            }
            output.extend_from_slice(b"\r\n");
        }

        output.extend_from_slice(b".\r\n");
        output
    }
}

/// Replaces a header with the same case-insensitive name, or appends.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
    {
        Some(entry) => entry.1 = value,
        None => headers.push((name.to_string(), value)),
    }
}

/// Rejects header names that would corrupt the wire format.
fn validate_header_name(name: &str) -> MailResult<()> {
    if name.is_empty() || name.chars().any(|c| c.is_control() || c == ':') {
        return Err(MailError::new(
            MailErrorKind::InvalidHeader,
            format!("Invalid header name: {:?}", name),
        ));
    }
    Ok(())
}

/// Writes a folded header line.
fn write_header(output: &mut Vec<u8>, name: &str, value: &str) {
    let header = format!("{}: {}", name, value);
    let folded = fold_header(&header);
    output.extend_from_slice(folded.as_bytes());
    output.extend_from_slice(b"\r\n");
}

/// Folds a header line at 78 characters.
fn fold_header(header: &str) -> String {
    if header.len() <= 78 {
        return header.to_string();
    }

    let mut result = String::new();
    let mut current_line = String::new();

    for word in header.split(' ') {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= 76 {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push_str(&current_line);
            result.push_str("\r\n ");
            current_line = word.to_string();
        }
    }

    result.push_str(&current_line);
    result
}

/// Encodes a header value using RFC 2047 when it is not plain ASCII.
fn encode_header(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii() && !c.is_control()) {
        return value.to_string();
    }

    let encoded = BASE64.encode(value.as_bytes());
    format!("=?UTF-8?B?{}?=", encoded)
}

/// Formats the current time for the Date header.
fn format_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

/// Generates a unique boundary.
fn generate_boundary() -> String {
    format!("----=_Part_{}", Uuid::new_v4().simple())
}

/// Writes the multipart/alternative body: plain part first, HTML as the
/// alternative, both base64 transfer-encoded.
fn write_alternative_body(output: &mut Vec<u8>, message: &Message, boundary: &str) {
    output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    write_header(output, "Content-Type", "text/plain; charset=utf-8");
    write_header(output, "Content-Transfer-Encoding", "base64");
    output.extend_from_slice(b"\r\n");
    write_base64(output, message.body.as_bytes());

    output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    write_header(output, "Content-Type", "text/html; charset=utf-8");
    write_header(output, "Content-Transfer-Encoding", "base64");
    output.extend_from_slice(b"\r\n");
    write_base64(output, message.body_html.as_bytes());

    output.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
}

/// Writes an attachment part with its explicit or inferred media type.
fn write_attachment(output: &mut Vec<u8>, attachment: &Attachment) -> MailResult<()> {
    let media_type = attachment.resolved_media_type()?;

    write_header(
        output,
        "Content-Type",
        &format!(
            "{}/{}; name=\"{}\"",
            media_type.type_(),
            media_type.subtype(),
            attachment.filename
        ),
    );
    write_header(output, "Content-Transfer-Encoding", "base64");
    write_header(
        output,
        "Content-Disposition",
        &format!("attachment; filename=\"{}\"", attachment.filename),
    );
    output.extend_from_slice(b"\r\n");
    write_base64(output, &attachment.data);

    Ok(())
}

/// Base64-encodes content with 76-column line wrapping.
fn write_base64(output: &mut Vec<u8>, data: &[u8]) {
    let encoded = BASE64.encode(data);
    for chunk in encoded.as_bytes().chunks(76) {
        output.extend_from_slice(chunk);
        output.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeaderMap;

    fn encoder() -> MimeEncoder {
        let config = MailConfig::builder()
            .smtp_host("smtp.example.com")
            .mail_from("noreply@example.com")
            .site_title("Example Site")
            .reply_to("replies@example.com")
            .build()
            .unwrap();
        MimeEncoder::from_config(&config)
    }

    fn message() -> Message {
        Message::builder()
            .to_many(["a@example.com", "b@example.com"])
            .unwrap()
            .subject("Hello world")
            .body("plain body")
            .body_html("<p>html body</p>")
            .build()
            .unwrap()
    }

    #[test]
    fn test_compose_identity_and_recipients() {
        let composed = encoder().compose(&message()).unwrap();

        assert_eq!(
            composed.header("From"),
            Some("Example Site <noreply@example.com>")
        );
        assert_eq!(composed.header("To"), Some("a@example.com, b@example.com"));
        assert_eq!(composed.header("Bcc"), composed.header("To"));
        assert_eq!(composed.header("Subject"), Some("Hello world"));
        assert!(composed.header("Date").is_some());
        assert!(composed.header("X-Mailer").unwrap().starts_with("mailcraft"));
    }

    #[test]
    fn test_compose_hides_version_when_configured() {
        let config = MailConfig::builder()
            .smtp_host("smtp.example.com")
            .mail_from("noreply@example.com")
            .hide_version(true)
            .build()
            .unwrap();
        let composed = MimeEncoder::from_config(&config).compose(&message()).unwrap();
        assert!(composed.header("X-Mailer").is_none());
    }

    #[test]
    fn test_caller_header_replaces_generated_one() {
        let mut msg = message();
        msg.headers.set("X-Mailer", "custom agent");
        msg.headers.set("X-Trace", "abc");

        let composed = encoder().compose(&msg).unwrap();
        assert_eq!(composed.header("X-Mailer"), Some("custom agent"));
        assert_eq!(composed.header("X-Trace"), Some("abc"));

        let mailer_headers = composed
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("X-Mailer"))
            .count();
        assert_eq!(mailer_headers, 1);
    }

    #[test]
    fn test_header_merge_last_value_wins() {
        let mut headers = HeaderMap::new();
        headers.set("X-Campaign", "first");
        headers.set("x-campaign", "second");

        let mut msg = message();
        msg.headers = headers;

        let composed = encoder().compose(&msg).unwrap();
        assert_eq!(composed.header("X-Campaign"), Some("second"));
    }

    #[test]
    fn test_reply_to_fallback() {
        // No caller Reply-To: the configured fallback applies.
        let composed = encoder().compose(&message()).unwrap();
        assert_eq!(composed.header("Reply-To"), Some("replies@example.com"));

        // Caller-set Reply-To wins.
        let msg = Message::builder()
            .to("a@example.com")
            .unwrap()
            .reply_to("me@example.com")
            .unwrap()
            .body("plain")
            .body_html("<p>html</p>")
            .build()
            .unwrap();
        let composed = encoder().compose(&msg).unwrap();
        assert_eq!(composed.header("Reply-To"), Some("me@example.com"));

        // Reply-To supplied as a plain header also wins.
        let mut msg = message();
        msg.headers.set("Reply-to", "other@example.com");
        let composed = encoder().compose(&msg).unwrap();
        assert_eq!(composed.header("Reply-To"), Some("other@example.com"));
    }

    #[test]
    fn test_bodies_are_base64_alternative() {
        let composed = encoder().compose(&message()).unwrap();
        let raw = String::from_utf8_lossy(&composed.raw);

        assert!(composed
            .header("Content-Type")
            .unwrap()
            .starts_with("multipart/alternative"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
        assert!(raw.contains(&BASE64.encode("plain body")));
        assert!(raw.contains(&BASE64.encode("<p>html body</p>")));

        // Plain part comes first.
        let plain_pos = raw.find("text/plain").unwrap();
        let html_pos = raw.find("text/html").unwrap();
        assert!(plain_pos < html_pos);
    }

    #[test]
    fn test_attachments_nest_under_mixed() {
        let mut msg = message();
        msg.attachments.push(Attachment::new("report.pdf", vec![1, 2, 3]));
        msg.attachments.push(Attachment::with_media_type(
            "notes.txt",
            "text/plain",
            b"notes".to_vec(),
        ));

        let composed = encoder().compose(&msg).unwrap();
        let raw = String::from_utf8_lossy(&composed.raw);

        assert!(composed
            .header("Content-Type")
            .unwrap()
            .starts_with("multipart/mixed"));
        assert!(raw.contains("application/pdf; name=\"report.pdf\""));
        assert!(raw.contains("text/plain; name=\"notes.txt\""));
        assert!(raw.contains("Content-Disposition: attachment; filename=\"report.pdf\""));
    }

    #[test]
    fn test_malformed_attachment_fails_compose() {
        let mut msg = message();
        msg.attachments.push(Attachment::new("", vec![1]));

        let err = encoder().compose(&msg).unwrap_err();
        assert!(err.kind().is_configuration());
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let mut msg = message();
        msg.subject = "Héllo".to_string();

        let composed = encoder().compose(&msg).unwrap();
        assert!(composed.header("Subject").unwrap().starts_with("=?UTF-8?B?"));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut msg = message();
        msg.headers.set("Bad:Name", "value");

        let err = encoder().compose(&msg).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::InvalidHeader);
    }

    #[test]
    fn test_dot_stuffing() {
        let input = b"Hello\r\n.World\r\n..Test\r\n";
        let output = MimeEncoder::prepare_data_content(input);
        let output_str = String::from_utf8_lossy(&output);
        assert!(output_str.contains("\r\n..World"));
        assert!(output_str.contains("\r\n...Test"));
        assert!(output_str.ends_with("\r\n.\r\n"));
    }

    #[test]
    fn test_long_header_folding() {
        let folded = fold_header(&format!("X-Long: {}", "word ".repeat(30)));
        for line in folded.split("\r\n") {
            assert!(line.len() <= 78);
        }
    }
}
