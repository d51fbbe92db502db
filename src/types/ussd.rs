//! USSD exchange record.

use chrono::{DateTime, Utc};

/// Result of a USSD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UssdExchange {
    /// Command as given by the caller.
    pub command: String,
    /// Modem that executed the command.
    pub modem_id: Option<String>,
    /// Decoded reply text.
    pub response: String,
    /// Raw protocol trace of the successful attempt.
    pub raw_response: String,
    /// Whether the request succeeded.
    pub success: bool,
    /// When the reply was received.
    pub timestamp: DateTime<Utc>,
}
