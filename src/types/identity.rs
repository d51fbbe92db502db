//! Modem identity.

use crate::transport::PortInfo;

/// Prefix of every modem id.
pub const ID_PREFIX: &str = "modem-";

/// Hardware identity of a detected modem.
///
/// Created at detection time and only replaced by a later detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModemIdentity {
    /// Stable id derived from the port path.
    pub id: String,
    /// Serial port path (e.g. "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// USB vendor id, if known.
    pub vid: Option<u16>,
    /// USB product id, if known.
    pub pid: Option<u16>,
    /// Port description reported by the OS.
    pub description: Option<String>,
}

impl ModemIdentity {
    /// Derives the stable modem id for a port path.
    ///
    /// The last path component is kept and anything outside
    /// `[A-Za-z0-9_.-]` becomes `_`, so `/dev/ttyUSB0` maps to
    /// `modem-ttyUSB0` and `COM3` to `modem-COM3`.
    #[must_use]
    pub fn id_for_port(port: &str) -> String {
        let name = port
            .rsplit(['/', '\\'])
            .find(|part| !part.is_empty())
            .unwrap_or(port);
        let name: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{ID_PREFIX}{name}")
    }

    /// Builds an identity from an enumerated port.
    #[must_use]
    pub fn from_port(port: &PortInfo) -> Self {
        Self {
            id: Self::id_for_port(&port.port_name),
            port: port.port_name.clone(),
            vid: port.vid,
            pid: port.pid,
            description: port.description.clone(),
        }
    }
}
