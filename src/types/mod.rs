//! Data types for modems, SIM cards, SMS and USSD.
//!
//! This module contains the core data structures used throughout the library:
//! - Modem identity and connection state
//! - Status and SIM snapshots
//! - SMS records
//! - USSD exchanges
//! - Fleet views

pub mod fleet;
pub mod identity;
pub mod sms;
pub mod status;
pub mod ussd;

pub use fleet::{FleetStats, FleetStatus, ModemInfo};
pub use identity::ModemIdentity;
pub use sms::{SmsRecord, SmsStatus};
pub use status::{ConnectionState, ModemDetails, ModemStatus, NetworkType, SimSnapshot};
pub use ussd::UssdExchange;
