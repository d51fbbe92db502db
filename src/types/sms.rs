//! SMS message types.

use chrono::{DateTime, Utc};

/// Storage status of an SMS, as reported by `AT+CMGL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmsStatus {
    /// Received, not yet read.
    Unread,
    /// Received and read.
    Read,
    /// Stored, not sent.
    StoredUnsent,
    /// Stored and sent.
    StoredSent,
}

impl SmsStatus {
    /// Parses a text-mode status string (`"REC UNREAD"` etc.).
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim().trim_matches('"') {
            "REC UNREAD" => Some(Self::Unread),
            "REC READ" => Some(Self::Read),
            "STO UNSENT" => Some(Self::StoredUnsent),
            "STO SENT" => Some(Self::StoredSent),
            _ => None,
        }
    }

    /// Returns the text-mode status string.
    #[must_use]
    pub const fn as_text(self) -> &'static str {
        match self {
            Self::Unread => "REC UNREAD",
            Self::Read => "REC READ",
            Self::StoredUnsent => "STO UNSENT",
            Self::StoredSent => "STO SENT",
        }
    }
}

/// An SMS stored on a modem.
///
/// `id` is the modem's storage index: it only identifies the message
/// relative to the modem that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRecord {
    /// Storage index on the modem.
    pub id: u32,
    /// Modem that holds the message.
    pub modem_id: Option<String>,
    /// Storage status.
    pub status: SmsStatus,
    /// Sender (received) or recipient (stored) number.
    pub number: String,
    /// Message body.
    pub body: String,
    /// Service centre timestamp, or the time of listing if unparseable.
    pub timestamp: DateTime<Utc>,
}
