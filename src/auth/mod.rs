//! Authentication mechanisms for the delivery channel.
//!
//! Supports the password mechanisms a relay negotiates for a configured
//! username/password pair:
//! - CRAM-MD5 (RFC 2195)
//! - PLAIN (RFC 4616)
//! - LOGIN (obsolete but widely used)

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::{MailError, MailErrorKind, MailResult};

/// Authentication methods supported by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// CRAM-MD5 challenge-response.
    CramMd5,
    /// PLAIN authentication (RFC 4616).
    Plain,
    /// LOGIN authentication (obsolete).
    Login,
}

impl AuthMethod {
    /// Returns the SMTP AUTH mechanism name.
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            AuthMethod::CramMd5 => "CRAM-MD5",
            AuthMethod::Plain => "PLAIN",
            AuthMethod::Login => "LOGIN",
        }
    }

    /// Returns the priority for auto-selection (higher is better).
    pub fn priority(&self) -> u8 {
        match self {
            AuthMethod::CramMd5 => 3,
            AuthMethod::Plain => 2,
            AuthMethod::Login => 1,
        }
    }

    /// Parses from an SMTP capability string.
    pub fn from_capability(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CRAM-MD5" => Some(AuthMethod::CramMd5),
            "PLAIN" => Some(AuthMethod::Plain),
            "LOGIN" => Some(AuthMethod::Login),
            _ => None,
        }
    }

    /// Returns true if this method sends the password in the clear and so
    /// requires TLS.
    pub fn requires_tls(&self) -> bool {
        matches!(self, AuthMethod::Plain | AuthMethod::Login)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mechanism_name())
    }
}

/// Username/password credentials.
#[derive(Clone)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password (protected).
    pub password: SecretString,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Authentication mechanism implementation.
pub struct Authenticator;

impl Authenticator {
    /// Generates the initial response for PLAIN authentication.
    pub fn plain_initial_response(credentials: &Credentials) -> String {
        // Format: \0username\0password
        let response = format!(
            "\0{}\0{}",
            credentials.username,
            credentials.password.expose_secret()
        );
        BASE64.encode(response)
    }

    /// Generates the LOGIN username response.
    pub fn login_username(credentials: &Credentials) -> String {
        BASE64.encode(&credentials.username)
    }

    /// Generates the LOGIN password response.
    pub fn login_password(credentials: &Credentials) -> String {
        BASE64.encode(credentials.password.expose_secret())
    }

    /// Generates the CRAM-MD5 challenge response.
    pub fn cram_md5_response(challenge: &str, credentials: &Credentials) -> MailResult<String> {
        let challenge_bytes = BASE64.decode(challenge).map_err(|e| {
            MailError::authentication(format!("Invalid CRAM-MD5 challenge: {}", e))
        })?;

        type HmacMd5 = Hmac<Md5>;
        let mut mac = HmacMd5::new_from_slice(credentials.password.expose_secret().as_bytes())
            .map_err(|e| MailError::authentication(format!("HMAC error: {}", e)))?;
        mac.update(&challenge_bytes);
        let digest = mac.finalize().into_bytes();

        // Format: username space hex-digest
        let hex_digest: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        let response = format!("{} {}", credentials.username, hex_digest);
        Ok(BASE64.encode(response))
    }

    /// Selects the strongest mutually supported method. PLAIN and LOGIN are
    /// only eligible over TLS.
    pub fn select_best_method(
        available: &[AuthMethod],
        tls_enabled: bool,
    ) -> MailResult<AuthMethod> {
        let mut candidates: Vec<_> = available
            .iter()
            .filter(|m| !m.requires_tls() || tls_enabled)
            .copied()
            .collect();

        if candidates.is_empty() {
            return Err(MailError::new(
                MailErrorKind::AuthMethodNotSupported,
                "No compatible authentication method available",
            ));
        }

        candidates.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Ok(candidates[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_from_capability() {
        assert_eq!(AuthMethod::from_capability("PLAIN"), Some(AuthMethod::Plain));
        assert_eq!(AuthMethod::from_capability("login"), Some(AuthMethod::Login));
        assert_eq!(
            AuthMethod::from_capability("CRAM-MD5"),
            Some(AuthMethod::CramMd5)
        );
        assert_eq!(AuthMethod::from_capability("XOAUTH2"), None);
    }

    #[test]
    fn test_plain_initial_response() {
        let creds = Credentials::new("user", "password");
        let response = Authenticator::plain_initial_response(&creds);
        let decoded = BASE64.decode(&response).unwrap();
        assert_eq!(decoded, b"\0user\0password");
    }

    #[test]
    fn test_login_responses() {
        let creds = Credentials::new("user", "password");
        assert_eq!(
            BASE64.decode(Authenticator::login_username(&creds)).unwrap(),
            b"user"
        );
        assert_eq!(
            BASE64.decode(Authenticator::login_password(&creds)).unwrap(),
            b"password"
        );
    }

    #[test]
    fn test_cram_md5_response_shape() {
        let creds = Credentials::new("user", "secret");
        let challenge = BASE64.encode("<12345@relay.example.com>");
        let response = Authenticator::cram_md5_response(&challenge, &creds).unwrap();

        let decoded = String::from_utf8(BASE64.decode(&response).unwrap()).unwrap();
        let (username, digest) = decoded.split_once(' ').unwrap();
        assert_eq!(username, "user");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_invalid_challenge_rejected() {
        let creds = Credentials::new("user", "secret");
        assert!(Authenticator::cram_md5_response("not base64!!", &creds).is_err());
    }

    #[test]
    fn test_select_best_method() {
        let available = vec![AuthMethod::Plain, AuthMethod::Login, AuthMethod::CramMd5];

        // CRAM-MD5 wins regardless of TLS.
        let method = Authenticator::select_best_method(&available, true).unwrap();
        assert_eq!(method, AuthMethod::CramMd5);
        let method = Authenticator::select_best_method(&available, false).unwrap();
        assert_eq!(method, AuthMethod::CramMd5);

        // Without TLS, cleartext mechanisms are not eligible.
        let available = vec![AuthMethod::Plain, AuthMethod::Login];
        assert!(Authenticator::select_best_method(&available, false).is_err());
        let method = Authenticator::select_best_method(&available, true).unwrap();
        assert_eq!(method, AuthMethod::Plain);
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = Credentials::new("user", "secret_password");
        let debug_str = format!("{:?}", creds);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret_password"));
    }
}
