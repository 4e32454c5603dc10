//! Transport layer for relay connections.
//!
//! A TCP connection with optional STARTTLS upgrade, every read and write
//! bounded by the configured timeout. One connection per send; the channel
//! opens it, uses it, and closes it.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::MailConfig;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::protocol::{codes, SmtpCommand, SmtpResponse};

/// Trait for SMTP transport abstraction.
#[async_trait]
pub trait SmtpTransport: Send + fmt::Debug {
    /// Sends a command and receives a response.
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse>;

    /// Sends raw data (for the DATA payload and AUTH continuations).
    async fn send_data(&mut self, data: &[u8]) -> MailResult<()>;

    /// Reads a response from the server.
    async fn read_response(&mut self) -> MailResult<SmtpResponse>;

    /// Upgrades the connection to TLS.
    async fn upgrade_tls(&mut self, host: &str) -> MailResult<()>;

    /// Returns true if TLS is enabled.
    fn is_tls(&self) -> bool;

    /// Closes the connection gracefully (QUIT).
    async fn close(&mut self) -> MailResult<()>;
}

/// Stream type that can be plain TCP or TLS.
enum TransportStream {
    Plain(BufReader<TcpStream>),
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// TCP connection with optional TLS.
pub struct TcpTransport {
    /// Read/write stream; taken during the TLS upgrade and on close.
    stream: Option<TransportStream>,
    /// Timeout applied to each read and write.
    command_timeout: Duration,
    /// TLS enabled flag.
    tls_enabled: bool,
    /// Server host.
    host: String,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("tls_enabled", &self.tls_enabled)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl TcpTransport {
    /// Connects to the configured relay and reads the 220 greeting.
    pub async fn connect(config: &MailConfig) -> MailResult<Self> {
        let address = config.address();

        let stream = timeout(config.conn_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                MailError::timeout(
                    MailErrorKind::ConnectTimeout,
                    format!("Connect to {} timed out", address),
                )
            })?
            .map_err(|e| Self::map_io_error(e, &address))?;

        stream.set_nodelay(true).ok();

        let mut transport = Self {
            stream: Some(TransportStream::Plain(BufReader::new(stream))),
            command_timeout: config.conn_timeout,
            tls_enabled: false,
            host: config.smtp_host.clone(),
        };

        let greeting = transport.read_response().await?;
        if greeting.code != codes::SERVICE_READY {
            return Err(greeting.to_error());
        }

        Ok(transport)
    }

    /// Maps IO errors to mail errors.
    fn map_io_error(error: io::Error, address: &str) -> MailError {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => MailError::new(
                MailErrorKind::ConnectionRefused,
                format!("Connection refused to {}", address),
            ),
            io::ErrorKind::TimedOut => {
                MailError::timeout(MailErrorKind::ConnectTimeout, "Connect timed out")
            }
            io::ErrorKind::ConnectionReset => {
                MailError::new(MailErrorKind::ConnectionReset, "Connection reset by server")
            }
            _ => MailError::connection(format!("Connection error: {}", error)).with_cause(error),
        }
    }

    fn stream_mut(&mut self) -> MailResult<&mut TransportStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| MailError::new(MailErrorKind::ConnectionReset, "Connection is closed"))
    }

    /// Reads lines until a complete (possibly multiline) response is seen.
    async fn read_response_inner<R: AsyncBufReadExt + Unpin>(
        reader: &mut R,
        timeout_duration: Duration,
    ) -> MailResult<SmtpResponse> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();

            let read = timeout(timeout_duration, reader.read_line(&mut line))
                .await
                .map_err(|_| MailError::timeout(MailErrorKind::ReadTimeout, "Read timed out"))?
                .map_err(|e| MailError::protocol(format!("Read error: {}", e)))?;

            if read == 0 {
                return Err(MailError::new(
                    MailErrorKind::ConnectionReset,
                    "Server closed connection",
                ));
            }

            let line = line.trim_end().to_string();

            // Continuation lines use a hyphen after the code
            let is_continuation = line.len() >= 4 && line.chars().nth(3) == Some('-');
            lines.push(line);

            if !is_continuation {
                break;
            }
        }

        SmtpResponse::parse(&lines)
    }

    /// Writes and flushes data within the timeout.
    async fn write_all<W: AsyncWrite + Unpin>(
        writer: &mut W,
        data: &[u8],
        timeout_duration: Duration,
    ) -> MailResult<()> {
        timeout(timeout_duration, writer.write_all(data))
            .await
            .map_err(|_| MailError::timeout(MailErrorKind::WriteTimeout, "Write timed out"))?
            .map_err(|e| MailError::protocol(format!("Write error: {}", e)))?;

        timeout(timeout_duration, writer.flush())
            .await
            .map_err(|_| MailError::timeout(MailErrorKind::WriteTimeout, "Flush timed out"))?
            .map_err(|e| MailError::protocol(format!("Flush error: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl SmtpTransport for TcpTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        let cmd_str = format!("{}\r\n", command.to_smtp_string());
        let command_timeout = self.command_timeout;

        tracing::debug!(command = %command, "sending SMTP command");

        match self.stream_mut()? {
            TransportStream::Plain(stream) => {
                Self::write_all(stream.get_mut(), cmd_str.as_bytes(), command_timeout).await?;
            }
            TransportStream::Tls(stream) => {
                Self::write_all(stream.get_mut(), cmd_str.as_bytes(), command_timeout).await?;
            }
        }

        self.read_response().await
    }

    async fn send_data(&mut self, data: &[u8]) -> MailResult<()> {
        let command_timeout = self.command_timeout;
        match self.stream_mut()? {
            TransportStream::Plain(stream) => {
                Self::write_all(stream.get_mut(), data, command_timeout).await?;
            }
            TransportStream::Tls(stream) => {
                Self::write_all(stream.get_mut(), data, command_timeout).await?;
            }
        }
        Ok(())
    }

    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        let command_timeout = self.command_timeout;
        let response = match self.stream_mut()? {
            TransportStream::Plain(stream) => {
                Self::read_response_inner(stream, command_timeout).await?
            }
            TransportStream::Tls(stream) => {
                Self::read_response_inner(stream, command_timeout).await?
            }
        };

        tracing::debug!(code = response.code, message = %response.first_message(), "received SMTP response");

        Ok(response)
    }

    async fn upgrade_tls(&mut self, host: &str) -> MailResult<()> {
        if self.tls_enabled {
            return Ok(());
        }

        use rustls::pki_types::ServerName;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| MailError::tls(format!("Invalid server name: {}", host)))?;

        let tcp_stream = match self.stream.take() {
            Some(TransportStream::Plain(reader)) => reader.into_inner(),
            Some(other) => {
                self.stream = Some(other);
                return Err(MailError::tls("Already using TLS"));
            }
            None => {
                return Err(MailError::new(
                    MailErrorKind::ConnectionReset,
                    "Connection is closed",
                ))
            }
        };

        let tls_stream = timeout(
            self.command_timeout,
            connector.connect(server_name, tcp_stream),
        )
        .await
        .map_err(|_| MailError::timeout(MailErrorKind::ConnectTimeout, "TLS handshake timed out"))?
        .map_err(|e| MailError::tls(format!("TLS handshake failed: {}", e)))?;

        self.stream = Some(TransportStream::Tls(BufReader::new(tls_stream)));
        self.tls_enabled = true;

        Ok(())
    }

    fn is_tls(&self) -> bool {
        self.tls_enabled
    }

    async fn close(&mut self) -> MailResult<()> {
        if self.stream.is_some() {
            let _ = self.send_command(&SmtpCommand::Quit).await;
            self.stream = None;
        }
        Ok(())
    }
}
