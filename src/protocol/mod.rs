//! SMTP protocol model.
//!
//! RFC 5321 commands and responses as used by the delivery channel,
//! including the ESMTP capability set parsed from EHLO.

use std::collections::HashSet;
use std::fmt;

use crate::auth::AuthMethod;
use crate::errors::{EnhancedStatusCode, MailError, MailResult};

/// SMTP commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// Extended HELLO with client identity.
    Ehlo(String),
    /// Basic HELLO.
    Helo(String),
    /// Start TLS negotiation.
    StartTls,
    /// Authenticate.
    Auth {
        /// Authentication mechanism.
        mechanism: String,
        /// Initial response (optional).
        initial_response: Option<String>,
    },
    /// MAIL FROM command.
    MailFrom {
        /// Envelope sender address.
        address: String,
        /// SIZE parameter, sent when the server advertises SIZE.
        size: Option<usize>,
    },
    /// RCPT TO command.
    RcptTo {
        /// Recipient address.
        address: String,
    },
    /// DATA command.
    Data,
    /// No operation (keepalive).
    Noop,
    /// Quit connection.
    Quit,
}

impl SmtpCommand {
    /// Formats the command for sending.
    pub fn to_smtp_string(&self) -> String {
        match self {
            SmtpCommand::Ehlo(domain) => format!("EHLO {}", domain),
            SmtpCommand::Helo(domain) => format!("HELO {}", domain),
            SmtpCommand::StartTls => "STARTTLS".to_string(),
            SmtpCommand::Auth {
                mechanism,
                initial_response,
            } => {
                if let Some(response) = initial_response {
                    format!("AUTH {} {}", mechanism, response)
                } else {
                    format!("AUTH {}", mechanism)
                }
            }
            SmtpCommand::MailFrom { address, size } => {
                let mut cmd = format!("MAIL FROM:{}", address);
                if let Some(s) = size {
                    cmd.push_str(&format!(" SIZE={}", s));
                }
                cmd
            }
            SmtpCommand::RcptTo { address } => format!("RCPT TO:{}", address),
            SmtpCommand::Data => "DATA".to_string(),
            SmtpCommand::Noop => "NOOP".to_string(),
            SmtpCommand::Quit => "QUIT".to_string(),
        }
    }
}

impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_smtp_string())
    }
}

/// SMTP response from the server.
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// Status code (e.g., 250, 354, 550).
    pub code: u16,
    /// Enhanced status code (optional).
    pub enhanced_code: Option<EnhancedStatusCode>,
    /// Response message lines.
    pub message: Vec<String>,
    /// Whether this is a multiline response.
    pub is_multiline: bool,
}

impl SmtpResponse {
    /// Creates a new single-line response.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            enhanced_code: None,
            message: vec![message.into()],
            is_multiline: false,
        }
    }

    /// Parses a response from raw lines.
    pub fn parse(lines: &[String]) -> MailResult<Self> {
        if lines.is_empty() {
            return Err(MailError::protocol("Empty response"));
        }

        let mut messages = Vec::new();
        let mut code = 0u16;
        let mut enhanced_code = None;

        for (i, line) in lines.iter().enumerate() {
            if line.len() < 3 {
                return Err(MailError::protocol(format!("Response too short: {}", line)));
            }

            let parsed_code: u16 = line[..3]
                .parse()
                .map_err(|_| MailError::protocol(format!("Invalid status code: {}", line)))?;

            if i == 0 {
                code = parsed_code;
            } else if parsed_code != code {
                return Err(MailError::protocol(
                    "Inconsistent status codes in multiline response",
                ));
            }

            // Parse message (after code and separator)
            let message = if line.len() > 4 {
                let msg = &line[4..];
                if i == 0 {
                    if let Some((esc, rest)) = Self::parse_enhanced_code(msg) {
                        enhanced_code = Some(esc);
                        rest.trim().to_string()
                    } else {
                        msg.to_string()
                    }
                } else {
                    msg.to_string()
                }
            } else {
                String::new()
            };

            messages.push(message);
        }

        Ok(Self {
            code,
            enhanced_code,
            message: messages,
            is_multiline: lines.len() > 1,
        })
    }

    /// Parses an enhanced status code from the message start.
    fn parse_enhanced_code(msg: &str) -> Option<(EnhancedStatusCode, &str)> {
        // Format: X.Y.Z rest
        let parts: Vec<&str> = msg.splitn(2, ' ').collect();
        if parts.is_empty() {
            return None;
        }

        let code = EnhancedStatusCode::parse(parts[0])?;
        let rest = parts.get(1).copied().unwrap_or("");
        Some((code, rest))
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns true if this is a positive intermediate response (3xx).
    pub fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Returns the first message line.
    pub fn first_message(&self) -> &str {
        self.message.first().map(|s| s.as_str()).unwrap_or("")
    }

    /// Returns all message lines joined.
    pub fn full_message(&self) -> String {
        self.message.join("\n")
    }

    /// Converts to an error if not successful.
    pub fn to_error(&self) -> MailError {
        let mut err = MailError::from_smtp_response(self.code, self.full_message());
        if let Some(enhanced) = &self.enhanced_code {
            err = err.with_enhanced_code(enhanced.clone());
        }
        err
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.first_message())
    }
}

/// ESMTP server capabilities.
#[derive(Debug, Clone, Default)]
pub struct EsmtpCapabilities {
    /// Maximum message size.
    pub size: Option<usize>,
    /// Supported authentication mechanisms.
    pub auth_mechanisms: HashSet<AuthMethod>,
    /// STARTTLS supported.
    pub starttls: bool,
    /// 8BITMIME supported.
    pub eight_bit_mime: bool,
    /// Raw capability strings.
    pub raw: Vec<String>,
}

impl EsmtpCapabilities {
    /// Parses capabilities from an EHLO response.
    pub fn from_ehlo_response(response: &SmtpResponse) -> Self {
        let mut caps = Self::default();

        for line in &response.message {
            let line = line.trim().to_uppercase();
            caps.raw.push(line.clone());

            let parts: Vec<&str> = line.splitn(2, ' ').collect();
            let capability = parts[0];
            let params = parts.get(1).copied().unwrap_or("");

            match capability {
                "SIZE" => {
                    caps.size = params.parse().ok();
                }
                "AUTH" => {
                    for mech in params.split_whitespace() {
                        if let Some(method) = AuthMethod::from_capability(mech) {
                            caps.auth_mechanisms.insert(method);
                        }
                    }
                }
                "STARTTLS" => {
                    caps.starttls = true;
                }
                "8BITMIME" => {
                    caps.eight_bit_mime = true;
                }
                _ => {}
            }
        }

        caps
    }

    /// Returns true if authentication is available.
    pub fn has_auth(&self) -> bool {
        !self.auth_mechanisms.is_empty()
    }
}

/// Response codes for common SMTP operations.
pub mod codes {
    /// Service ready.
    pub const SERVICE_READY: u16 = 220;
    /// Service closing.
    pub const SERVICE_CLOSING: u16 = 221;
    /// Authentication successful.
    pub const AUTH_SUCCESS: u16 = 235;
    /// OK.
    pub const OK: u16 = 250;
    /// Continue (AUTH).
    pub const AUTH_CONTINUE: u16 = 334;
    /// Start mail input.
    pub const START_MAIL_INPUT: u16 = 354;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_formatting() {
        assert_eq!(
            SmtpCommand::Ehlo("localhost".to_string()).to_smtp_string(),
            "EHLO localhost"
        );
        assert_eq!(SmtpCommand::StartTls.to_smtp_string(), "STARTTLS");
        assert_eq!(
            SmtpCommand::MailFrom {
                address: "<test@example.com>".to_string(),
                size: Some(1024),
            }
            .to_smtp_string(),
            "MAIL FROM:<test@example.com> SIZE=1024"
        );
        assert_eq!(
            SmtpCommand::RcptTo {
                address: "<dest@example.com>".to_string(),
            }
            .to_smtp_string(),
            "RCPT TO:<dest@example.com>"
        );
    }

    #[test]
    fn test_response_parse() {
        let lines = vec!["250 OK".to_string()];
        let response = SmtpResponse::parse(&lines).unwrap();
        assert_eq!(response.code, 250);
        assert!(response.is_success());
        assert_eq!(response.first_message(), "OK");

        // Multiline
        let lines = vec![
            "250-smtp.example.com Hello".to_string(),
            "250-SIZE 10485760".to_string(),
            "250 STARTTLS".to_string(),
        ];
        let response = SmtpResponse::parse(&lines).unwrap();
        assert_eq!(response.code, 250);
        assert!(response.is_multiline);
        assert_eq!(response.message.len(), 3);
    }

    #[test]
    fn test_response_with_enhanced_code() {
        let lines = vec!["550 5.1.1 User unknown".to_string()];
        let response = SmtpResponse::parse(&lines).unwrap();
        assert_eq!(response.code, 550);
        let esc = response.enhanced_code.clone().unwrap();
        assert_eq!(esc.class, 5);
        assert_eq!(esc.subject, 1);
        assert_eq!(esc.detail, 1);
    }

    #[test]
    fn test_inconsistent_multiline_rejected() {
        let lines = vec!["250-hello".to_string(), "500 oops".to_string()];
        assert!(SmtpResponse::parse(&lines).is_err());
    }

    #[test]
    fn test_capabilities_parse() {
        let response = SmtpResponse {
            code: 250,
            enhanced_code: None,
            message: vec![
                "smtp.example.com".to_string(),
                "SIZE 10485760".to_string(),
                "AUTH PLAIN LOGIN CRAM-MD5".to_string(),
                "STARTTLS".to_string(),
                "8BITMIME".to_string(),
            ],
            is_multiline: true,
        };

        let caps = EsmtpCapabilities::from_ehlo_response(&response);
        assert_eq!(caps.size, Some(10485760));
        assert!(caps.auth_mechanisms.contains(&AuthMethod::Plain));
        assert!(caps.auth_mechanisms.contains(&AuthMethod::Login));
        assert!(caps.auth_mechanisms.contains(&AuthMethod::CramMd5));
        assert!(caps.starttls);
        assert!(caps.eight_bit_mime);
        assert!(caps.has_auth());
    }
}
