//! The delivery channel.
//!
//! One channel per send: connect, EHLO, optional STARTTLS upgrade, optional
//! authentication, transmit, QUIT. The connection is always released, whether
//! or not the transmit succeeded, and nothing is retried.

use crate::auth::{AuthMethod, Authenticator, Credentials};
use crate::config::MailConfig;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::protocol::{codes, EsmtpCapabilities, SmtpCommand};
use crate::transport::{SmtpTransport, TcpTransport};
use crate::types::Address;

/// An open, handshaken connection to the relay, ready to transmit.
#[derive(Debug)]
pub struct Channel<T: SmtpTransport> {
    transport: T,
    capabilities: EsmtpCapabilities,
}

impl Channel<TcpTransport> {
    /// Opens a channel to the configured relay: connect, handshake,
    /// negotiate TLS and authentication as configured.
    pub async fn open(config: &MailConfig) -> MailResult<Self> {
        let transport = TcpTransport::connect(config).await?;
        Self::handshake(transport, config).await
    }
}

impl<T: SmtpTransport> Channel<T> {
    /// Performs the post-connect handshake on an established transport.
    pub async fn handshake(mut transport: T, config: &MailConfig) -> MailResult<Self> {
        let mut capabilities = Self::greet(&mut transport, config).await?;

        if config.starttls {
            if !capabilities.starttls {
                return Err(MailError::new(
                    MailErrorKind::StarttlsNotSupported,
                    "Server does not support STARTTLS",
                ));
            }

            let response = transport.send_command(&SmtpCommand::StartTls).await?;
            if response.code != codes::SERVICE_READY {
                return Err(response.to_error());
            }

            transport.upgrade_tls(&config.smtp_host).await?;

            // The capability set may change after the upgrade.
            capabilities = Self::greet(&mut transport, config).await?;
        }

        if let Some(username) = &config.username {
            let password = config.password.as_ref().ok_or_else(|| {
                MailError::configuration("password must be configured when username is set")
            })?;
            let credentials = Credentials {
                username: username.clone(),
                password: password.clone(),
            };
            Self::authenticate(&mut transport, &capabilities, &credentials).await?;
        }

        Ok(Self {
            transport,
            capabilities,
        })
    }

    /// Returns the capabilities advertised by the relay.
    pub fn capabilities(&self) -> &EsmtpCapabilities {
        &self.capabilities
    }

    /// Transmits a composed message and releases the connection. QUIT is
    /// issued on both the success and the failure path.
    pub async fn deliver(
        mut self,
        envelope_from: &Address,
        recipients: &[Address],
        payload: &[u8],
    ) -> MailResult<()> {
        let outcome = self.transmit(envelope_from, recipients, payload).await;
        let _ = self.transport.close().await;
        outcome
    }

    /// Closes the channel without transmitting (connection tests).
    pub async fn close(mut self) -> MailResult<()> {
        self.transport.close().await
    }

    /// Sends EHLO (HELO fallback) and parses the capability set.
    async fn greet(transport: &mut T, config: &MailConfig) -> MailResult<EsmtpCapabilities> {
        let client_id = config.client_id();

        let response = transport
            .send_command(&SmtpCommand::Ehlo(client_id.to_string()))
            .await?;

        let response = if response.is_success() {
            response
        } else {
            let fallback = transport
                .send_command(&SmtpCommand::Helo(client_id.to_string()))
                .await?;
            if !fallback.is_success() {
                return Err(fallback.to_error());
            }
            fallback
        };

        Ok(EsmtpCapabilities::from_ehlo_response(&response))
    }

    /// Authenticates with the strongest mutually supported mechanism.
    async fn authenticate(
        transport: &mut T,
        capabilities: &EsmtpCapabilities,
        credentials: &Credentials,
    ) -> MailResult<()> {
        if !capabilities.has_auth() {
            return Err(MailError::new(
                MailErrorKind::AuthMethodNotSupported,
                "Server advertises no authentication mechanisms",
            ));
        }

        let available: Vec<AuthMethod> = capabilities.auth_mechanisms.iter().copied().collect();
        let method = Authenticator::select_best_method(&available, transport.is_tls())?;

        tracing::debug!(mechanism = %method, "authenticating");

        match method {
            AuthMethod::Plain => Self::auth_plain(transport, credentials).await,
            AuthMethod::Login => Self::auth_login(transport, credentials).await,
            AuthMethod::CramMd5 => Self::auth_cram_md5(transport, credentials).await,
        }
    }

    async fn auth_plain(transport: &mut T, credentials: &Credentials) -> MailResult<()> {
        let command = SmtpCommand::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some(Authenticator::plain_initial_response(credentials)),
        };

        let response = transport.send_command(&command).await?;
        if response.code == codes::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(response.to_error())
        }
    }

    async fn auth_login(transport: &mut T, credentials: &Credentials) -> MailResult<()> {
        let command = SmtpCommand::Auth {
            mechanism: "LOGIN".to_string(),
            initial_response: None,
        };

        let response = transport.send_command(&command).await?;
        if response.code != codes::AUTH_CONTINUE {
            return Err(response.to_error());
        }

        let username = Authenticator::login_username(credentials);
        transport
            .send_data(format!("{}\r\n", username).as_bytes())
            .await?;

        let response = transport.read_response().await?;
        if response.code != codes::AUTH_CONTINUE {
            return Err(response.to_error());
        }

        let password = Authenticator::login_password(credentials);
        transport
            .send_data(format!("{}\r\n", password).as_bytes())
            .await?;

        let response = transport.read_response().await?;
        if response.code == codes::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(response.to_error())
        }
    }

    async fn auth_cram_md5(transport: &mut T, credentials: &Credentials) -> MailResult<()> {
        let command = SmtpCommand::Auth {
            mechanism: "CRAM-MD5".to_string(),
            initial_response: None,
        };

        let response = transport.send_command(&command).await?;
        if response.code != codes::AUTH_CONTINUE {
            return Err(response.to_error());
        }

        let answer = Authenticator::cram_md5_response(response.first_message(), credentials)?;
        transport
            .send_data(format!("{}\r\n", answer).as_bytes())
            .await?;

        let response = transport.read_response().await?;
        if response.code == codes::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(response.to_error())
        }
    }

    /// The MAIL FROM → RCPT TO → DATA sequence. Every recipient must be
    /// accepted; any rejection fails the whole transmission.
    async fn transmit(
        &mut self,
        envelope_from: &Address,
        recipients: &[Address],
        payload: &[u8],
    ) -> MailResult<()> {
        let mail_from = SmtpCommand::MailFrom {
            address: envelope_from.to_smtp(),
            size: self.capabilities.size.map(|_| payload.len()),
        };

        let response = self.transport.send_command(&mail_from).await?;
        if !response.is_success() {
            return Err(response.to_error());
        }

        for recipient in recipients {
            let rcpt_to = SmtpCommand::RcptTo {
                address: recipient.to_smtp(),
            };

            let response = self.transport.send_command(&rcpt_to).await?;
            if !response.is_success() {
                return Err(response.to_error());
            }
        }

        let response = self.transport.send_command(&SmtpCommand::Data).await?;
        if response.code != codes::START_MAIL_INPUT {
            return Err(response.to_error());
        }

        self.transport.send_data(payload).await?;

        let response = self.transport.read_response().await?;
        if !response.is_success() {
            return Err(response.to_error());
        }

        Ok(())
    }
}
