//! Single-flight AT command engine.
//!
//! The engine writes one command at a time, collects response lines until
//! a terminal token (`OK`, `ERROR`, `FAIL` or the `>` prompt) and retries
//! commands that time out. An `ERROR`/`FAIL` answer is a complete response,
//! not a failure: call sites decide whether it matters via
//! [`Response::into_ok`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use crate::error::{Error, Result};
use crate::protocol::{Response, Terminal};
use crate::transport::Transport;

/// Command line terminator.
const LINE_END: &str = "\r\n";

/// Command engine over a shared transport.
pub struct CommandEngine<T> {
    transport: Arc<Mutex<T>>,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl<T: Transport> CommandEngine<T> {
    /// Creates an engine owning `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::from_shared(Arc::new(Mutex::new(transport)))
    }

    /// Creates an engine over an already shared transport.
    #[must_use]
    pub const fn from_shared(transport: Arc<Mutex<T>>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the timeout used by [`send_default`](Self::send_default).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the attempts used by [`send_default`](Self::send_default).
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the default command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens the transport.
    pub async fn open(&self) -> Result<()> {
        self.transport.lock().await.open().await
    }

    /// Closes the transport. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.transport.lock().await.close().await
    }

    /// Returns true if the transport is open.
    pub async fn is_open(&self) -> bool {
        self.transport.lock().await.is_open()
    }

    /// Sends `command` with the default timeout and retries.
    pub async fn send_default(&self, command: &str) -> Result<Response> {
        self.send(command, self.timeout, self.retries).await
    }

    /// Sends `command` and collects its response.
    ///
    /// Each attempt clears stale input, writes the command with CR/LF and
    /// reads until a terminal token or `timeout`. Only timeouts are
    /// retried, up to `retries` attempts in total.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] once every attempt timed out, or the
    /// transport error that interrupted an attempt.
    pub async fn send(&self, command: &str, timeout: Duration, retries: u32) -> Result<Response> {
        let attempts = retries.max(1);

        for attempt in 1..=attempts {
            tracing::debug!(attempt, "sending {}", command);

            match self.attempt(command, timeout).await {
                Ok(response) => {
                    tracing::debug!("{} -> {:?}", command, response.lines);
                    return Ok(response);
                }
                Err(Error::Timeout { .. }) if attempt < attempts => {
                    tracing::debug!(
                        "{} timed out (attempt {}/{}), retrying",
                        command,
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::debug!("{} failed: {}", command, e);
                    return Err(e);
                }
            }
        }

        Err(Error::timeout(command, timeout))
    }

    async fn attempt(&self, command: &str, timeout: Duration) -> Result<Response> {
        let mut transport = self.transport.lock().await;
        transport.clear_input()?;
        transport
            .write(Bytes::from(format!("{command}{LINE_END}")))
            .await?;
        collect(&mut *transport, command, timeout).await
    }

    /// Writes raw bytes without a terminator and without reading.
    ///
    /// Used for SMS bodies after the compose prompt.
    pub async fn write_raw(&self, data: impl Into<Bytes>) -> Result<()> {
        self.transport.lock().await.write(data.into()).await
    }

    /// Reads until a terminal token without writing anything.
    ///
    /// `label` names the response in errors and logs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no terminal token arrives in time.
    pub async fn await_terminal(&self, label: &str, timeout: Duration) -> Result<Response> {
        let mut transport = self.transport.lock().await;
        collect(&mut *transport, label, timeout).await
    }

    /// Reads lines until one satisfies `pred`, without writing anything.
    ///
    /// Resolves to `Ok(None)` if `timeout` passes first.
    pub async fn read_until<F>(&self, timeout: Duration, mut pred: F) -> Result<Option<String>>
    where
        F: FnMut(&str) -> bool + Send,
    {
        let deadline = Instant::now() + timeout;
        let mut transport = self.transport.lock().await;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match transport.read_line(remaining).await? {
                Some(line) if pred(&line) => return Ok(Some(line)),
                Some(line) => tracing::trace!("ignoring line: {}", line),
                None => return Ok(None),
            }
        }
    }
}

/// Reads lines until one carries a terminal token.
async fn collect<T: Transport + ?Sized>(
    transport: &mut T,
    command: &str,
    timeout: Duration,
) -> Result<Response> {
    let deadline = Instant::now() + timeout;
    let mut lines = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::timeout(command, timeout));
        }

        let Some(line) = transport.read_line(remaining).await? else {
            return Err(Error::timeout(command, timeout));
        };

        let terminal = Terminal::from_line(&line);
        lines.push(line);
        if let Some(terminal) = terminal {
            return Ok(Response {
                command: command.to_owned(),
                lines,
                terminal,
            });
        }
    }
}
