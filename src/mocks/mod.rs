//! Mock implementations for testing.
//!
//! Provides a scripted transport and message fixtures. The transport records
//! every command and data write; a [`MockHandle`] keeps those recordings
//! observable after the channel has consumed the transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{MailError, MailResult};
use crate::protocol::{codes, SmtpCommand, SmtpResponse};
use crate::transport::SmtpTransport;
use crate::types::Message;

/// Scripted SMTP transport.
///
/// Responses are popped from a queue; when the queue is empty a `250 OK`
/// default is returned. Commands and data writes are recorded.
#[derive(Debug)]
pub struct MockTransport {
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    responses: Arc<Mutex<VecDeque<SmtpResponse>>>,
    data_received: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_next: Arc<Mutex<Option<MailError>>>,
    tls_enabled: Arc<AtomicBool>,
    closed: bool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            data_received: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(Mutex::new(None)),
            tls_enabled: Arc::new(AtomicBool::new(false)),
            closed: false,
        }
    }

    /// Returns a handle sharing this transport's recordings and queue.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            commands: Arc::clone(&self.commands),
            responses: Arc::clone(&self.responses),
            data_received: Arc::clone(&self.data_received),
            fail_next: Arc::clone(&self.fail_next),
            tls_enabled: Arc::clone(&self.tls_enabled),
        }
    }

    /// Queues a response.
    pub fn queue_response(&self, response: SmtpResponse) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Queues an OK response.
    pub fn queue_ok(&self) -> &Self {
        self.queue_response(SmtpResponse::new(codes::OK, "OK"))
    }

    /// Queues an error response.
    pub fn queue_error(&self, code: u16, message: &str) -> &Self {
        self.queue_response(SmtpResponse::new(code, message))
    }

    /// Sets the next call to fail.
    pub fn fail_next_with(&self, error: MailError) -> &Self {
        *self.fail_next.lock().unwrap() = Some(error);
        self
    }

    fn next_response(&self) -> SmtpResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SmtpResponse::new(codes::OK, "OK"))
    }

    fn take_failure(&self) -> Option<MailError> {
        self.fail_next.lock().unwrap().take()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmtpTransport for MockTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        self.commands.lock().unwrap().push(command.clone());
        Ok(self.next_response())
    }

    async fn send_data(&mut self, data: &[u8]) -> MailResult<()> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        self.data_received.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        Ok(self.next_response())
    }

    async fn upgrade_tls(&mut self, _host: &str) -> MailResult<()> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        self.tls_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_tls(&self) -> bool {
        self.tls_enabled.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> MailResult<()> {
        if !self.closed {
            self.commands.lock().unwrap().push(SmtpCommand::Quit);
            self.closed = true;
        }
        Ok(())
    }
}

/// Observation handle for a [`MockTransport`] that has been handed to a
/// channel.
#[derive(Debug, Clone)]
pub struct MockHandle {
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    responses: Arc<Mutex<VecDeque<SmtpResponse>>>,
    data_received: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_next: Arc<Mutex<Option<MailError>>>,
    tls_enabled: Arc<AtomicBool>,
}

impl MockHandle {
    /// Returns the recorded commands.
    pub fn recorded_commands(&self) -> Vec<SmtpCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Returns the recorded data writes.
    pub fn received_data(&self) -> Vec<Vec<u8>> {
        self.data_received.lock().unwrap().clone()
    }

    /// Queues a response on the shared queue.
    pub fn queue_response(&self, response: SmtpResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Sets the next call to fail.
    pub fn fail_next_with(&self, error: MailError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Returns true if the transport was upgraded to TLS.
    pub fn tls_upgraded(&self) -> bool {
        self.tls_enabled.load(Ordering::SeqCst)
    }
}

/// Creates an EHLO response with standard capabilities.
pub fn ehlo_response() -> SmtpResponse {
    SmtpResponse {
        code: codes::OK,
        enhanced_code: None,
        message: vec![
            "relay.example.com Hello".to_string(),
            "SIZE 10485760".to_string(),
            "AUTH PLAIN LOGIN CRAM-MD5".to_string(),
            "STARTTLS".to_string(),
            "8BITMIME".to_string(),
        ],
        is_multiline: true,
    }
}

/// Creates a minimal test message.
pub fn test_message() -> Message {
    Message::builder()
        .to("recipient@example.com")
        .expect("valid address")
        .subject("Test Subject")
        .body("Plain text version")
        .body_html("<html><body><h1>HTML version</h1></body></html>")
        .build()
        .expect("valid message")
}
