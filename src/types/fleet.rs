//! Read-only views of the fleet registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::identity::ModemIdentity;
use crate::types::status::{ConnectionState, ModemStatus};

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemInfo {
    /// Hardware identity.
    pub identity: ModemIdentity,
    /// Session state, `Disconnected` when no session is live.
    pub state: ConnectionState,
    /// When the current (or last) session was connected.
    pub connected_at: Option<DateTime<Utc>>,
    /// Last operation against this modem.
    pub last_activity: Option<DateTime<Utc>>,
}

/// Status of every known modem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetStatus {
    /// Modems in the registry.
    pub total_modems: usize,
    /// Modems with a live session.
    pub connected_modems: usize,
    /// Status per connected modem id.
    pub modems: HashMap<String, ModemStatus>,
}

/// Activity counters for the whole fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetStats {
    /// Modems in the registry.
    pub total_modems: usize,
    /// Modems with a live session.
    pub connected_modems: usize,
    /// Ids of connected modems, sorted.
    pub active_modem_ids: Vec<String>,
    /// Per-modem operations run since the fleet was created.
    pub operation_count: u64,
    /// When the last operation finished, or the fleet was created.
    pub last_operation: DateTime<Utc>,
}
