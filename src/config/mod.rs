//! Mailer configuration.
//!
//! All host-framework settings the mailer consumes, gathered into one
//! structure built once at startup and passed by reference into the facade:
//! relay connection settings, sender identity, the suppression switch, and
//! the dashboard page size.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{MailError, MailResult};

/// Default SMTP relay port.
pub const DEFAULT_PORT: u16 = 25;

/// Default timeout for connecting to and talking to the relay.
pub const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default page size for external dashboards listing email records.
pub const DEFAULT_MAIL_PER_PAGE: usize = 20;

/// Mailer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay hostname.
    pub smtp_host: String,
    /// SMTP relay port.
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    /// Upgrade the connection with STARTTLS before authenticating.
    #[serde(default)]
    pub starttls: bool,
    /// Authentication username.
    pub username: Option<String>,
    /// Authentication password (serialization skipped for security).
    #[serde(skip)]
    pub password: Option<SecretString>,
    /// Sender address, used for the From header and the envelope sender.
    pub mail_from: String,
    /// Site title, used as the From display name.
    pub site_title: String,
    /// Site URL, exposed to templates rendering HTML bodies.
    #[serde(default)]
    pub site_url: String,
    /// Reply-To applied when the caller did not set one.
    pub reply_to: Option<String>,
    /// Timeout for connect and for each relay read/write.
    #[serde(default = "default_conn_timeout", with = "humantime_serde")]
    pub conn_timeout: Duration,
    /// Record outgoing mail without transmitting it (staging environments).
    #[serde(default)]
    pub stop_outgoing: bool,
    /// Omit the X-Mailer version marker.
    #[serde(default)]
    pub hide_version: bool,
    /// Page size consumed by external dashboards.
    #[serde(default = "default_mail_per_page")]
    pub mail_per_page: usize,
    /// Client identifier for EHLO.
    pub client_id: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_conn_timeout() -> Duration {
    DEFAULT_CONN_TIMEOUT
}
fn default_mail_per_page() -> usize {
    DEFAULT_MAIL_PER_PAGE
}

impl MailConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> MailConfigBuilder {
        MailConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MailResult<()> {
        if self.smtp_host.is_empty() {
            return Err(MailError::configuration("smtp_host is required"));
        }

        if self.smtp_port == 0 {
            return Err(MailError::configuration("smtp_port must be non-zero"));
        }

        if self.mail_from.is_empty() {
            return Err(MailError::configuration("mail_from is required"));
        }

        // If a username is configured then a password must be configured as
        // well; catching this at startup keeps the misconfiguration visible
        // before any send is attempted.
        if self.username.is_some() && self.password.is_none() {
            return Err(MailError::configuration(
                "password must be configured when username is set",
            ));
        }

        Ok(())
    }

    /// Returns the full relay address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.smtp_host, self.smtp_port)
    }

    /// Returns true if authentication is configured.
    pub fn has_auth(&self) -> bool {
        self.username.is_some()
    }

    /// Returns the client identifier for EHLO.
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or("localhost")
    }
}

/// Builder for mailer configuration.
#[derive(Debug, Default)]
pub struct MailConfigBuilder {
    smtp_host: Option<String>,
    smtp_port: u16,
    starttls: bool,
    username: Option<String>,
    password: Option<SecretString>,
    mail_from: Option<String>,
    site_title: Option<String>,
    site_url: Option<String>,
    reply_to: Option<String>,
    conn_timeout: Duration,
    stop_outgoing: bool,
    hide_version: bool,
    mail_per_page: usize,
    client_id: Option<String>,
}

impl MailConfigBuilder {
    /// Sets the SMTP relay host.
    pub fn smtp_host(mut self, host: impl Into<String>) -> Self {
        self.smtp_host = Some(host.into());
        self
    }

    /// Sets the SMTP relay port.
    pub fn smtp_port(mut self, port: u16) -> Self {
        self.smtp_port = port;
        self
    }

    /// Enables or disables STARTTLS.
    pub fn starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Sets plain credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the sender address.
    pub fn mail_from(mut self, mail_from: impl Into<String>) -> Self {
        self.mail_from = Some(mail_from.into());
        self
    }

    /// Sets the site title used as the From display name.
    pub fn site_title(mut self, site_title: impl Into<String>) -> Self {
        self.site_title = Some(site_title.into());
        self
    }

    /// Sets the site URL.
    pub fn site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    /// Sets the fallback Reply-To address.
    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Sets the connection timeout.
    pub fn conn_timeout(mut self, timeout: Duration) -> Self {
        self.conn_timeout = timeout;
        self
    }

    /// Suppresses outgoing mail (recorded but not transmitted).
    pub fn stop_outgoing(mut self, stop: bool) -> Self {
        self.stop_outgoing = stop;
        self
    }

    /// Hides the X-Mailer version marker.
    pub fn hide_version(mut self, hide: bool) -> Self {
        self.hide_version = hide;
        self
    }

    /// Sets the dashboard page size.
    pub fn mail_per_page(mut self, per_page: usize) -> Self {
        self.mail_per_page = per_page;
        self
    }

    /// Sets the client identifier for EHLO.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> MailResult<MailConfig> {
        let config = MailConfig {
            smtp_host: self
                .smtp_host
                .ok_or_else(|| MailError::configuration("smtp_host is required"))?,
            smtp_port: if self.smtp_port == 0 {
                DEFAULT_PORT
            } else {
                self.smtp_port
            },
            starttls: self.starttls,
            username: self.username,
            password: self.password,
            mail_from: self
                .mail_from
                .ok_or_else(|| MailError::configuration("mail_from is required"))?,
            site_title: self.site_title.unwrap_or_default(),
            site_url: self.site_url.unwrap_or_default(),
            reply_to: self.reply_to,
            conn_timeout: if self.conn_timeout == Duration::ZERO {
                DEFAULT_CONN_TIMEOUT
            } else {
                self.conn_timeout
            },
            stop_outgoing: self.stop_outgoing,
            hide_version: self.hide_version,
            mail_per_page: if self.mail_per_page == 0 {
                DEFAULT_MAIL_PER_PAGE
            } else {
                self.mail_per_page
            },
            client_id: self.client_id,
        };

        config.validate()?;
        Ok(config)
    }
}

// Humantime serde support
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MailConfig::builder()
            .smtp_host("smtp.example.com")
            .smtp_port(587)
            .starttls(true)
            .credentials("user", "pass")
            .mail_from("noreply@example.com")
            .site_title("Example Site")
            .build()
            .unwrap();

        assert_eq!(config.smtp_host, "smtp.example.com");
        assert_eq!(config.smtp_port, 587);
        assert!(config.starttls);
        assert_eq!(config.username, Some("user".to_string()));
        assert!(config.password.is_some());
        assert_eq!(config.address(), "smtp.example.com:587");
    }

    #[test]
    fn test_config_defaults() {
        let config = MailConfig::builder()
            .smtp_host("smtp.example.com")
            .mail_from("noreply@example.com")
            .build()
            .unwrap();

        assert_eq!(config.smtp_port, DEFAULT_PORT);
        assert_eq!(config.conn_timeout, DEFAULT_CONN_TIMEOUT);
        assert_eq!(config.mail_per_page, DEFAULT_MAIL_PER_PAGE);
        assert!(!config.starttls);
        assert!(!config.stop_outgoing);
        assert_eq!(config.client_id(), "localhost");
    }

    #[test]
    fn test_missing_host_rejected() {
        let result = MailConfig::builder().mail_from("noreply@example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_sender_rejected() {
        let result = MailConfig::builder().smtp_host("smtp.example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_username_without_password_rejected() {
        let result = MailConfig::builder()
            .smtp_host("smtp.example.com")
            .mail_from("noreply@example.com")
            .username("user")
            .build();

        let err = result.unwrap_err();
        assert!(err.kind().is_configuration());
        assert!(err.message().contains("password"));
    }
}
