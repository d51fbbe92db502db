//! Connection state, modem status and SIM snapshots.

/// Lifecycle state of a modem session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport closed.
    #[default]
    Disconnected,
    /// Transport opening and configuration in progress.
    Connecting,
    /// Connected and the last operation succeeded.
    Ready,
    /// Transport open but the last operation failed.
    Degraded,
}

impl ConnectionState {
    /// Returns true if the transport is open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

/// Network technology generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NetworkType {
    /// 2G.
    Gsm,
    /// 3G.
    Umts,
    /// 4G.
    Lte,
    /// 5G.
    Nr,
    /// Not known.
    #[default]
    Unknown,
}

impl NetworkType {
    /// Maps a 3GPP 27.007 access technology (`<AcT>`) value.
    #[must_use]
    pub const fn from_act(act: u8) -> Self {
        match act {
            0 | 1 | 3 => Self::Gsm,
            2 | 4 | 5 | 6 => Self::Umts,
            7 | 9 => Self::Lte,
            10..=13 => Self::Nr,
            _ => Self::Unknown,
        }
    }

    /// Returns the marketing generation label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gsm => "2G",
            Self::Umts => "3G",
            Self::Lte => "4G",
            Self::Nr => "5G",
            Self::Unknown => "Unknown",
        }
    }
}

/// Hardware details read from the modem at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemDetails {
    /// Model name (`AT+CGMM`).
    pub model: Option<String>,
    /// Firmware revision (`AT+CGMR`).
    pub firmware: Option<String>,
    /// IMEI (`AT+CGSN`).
    pub imei: Option<String>,
}

/// Point-in-time modem status.
///
/// Every field except `connected` is best-effort: a query that fails
/// leaves its field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemStatus {
    /// Whether the modem is connected and answering.
    pub connected: bool,
    /// Modem id.
    pub modem_id: Option<String>,
    /// Serial port.
    pub port: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Firmware revision.
    pub firmware: Option<String>,
    /// Signal strength, 0-100.
    pub signal_strength: Option<u8>,
    /// Network generation.
    pub network_type: NetworkType,
    /// Operator name.
    pub operator: Option<String>,
    /// Error message when `connected` is false.
    pub error: Option<String>,
}

/// SIM card information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimSnapshot {
    /// Modem id.
    pub modem_id: Option<String>,
    /// International Mobile Subscriber Identity.
    pub imsi: Option<String>,
    /// SIM card identifier.
    pub iccid: Option<String>,
    /// Device identifier.
    pub imei: Option<String>,
    /// Subscriber phone number.
    pub msisdn: Option<String>,
    /// Signal strength, 0-100.
    pub signal_strength: Option<u8>,
    /// Operator name.
    pub operator_name: Option<String>,
    /// Whether the SIM is roaming.
    pub roaming: bool,
    /// Network generation.
    pub network_type: NetworkType,
}
