//! # modemfleet
//!
//! Drive a fleet of USB cellular modems over AT commands.
//!
//! This library detects modems on serial ports, keeps one session per
//! connected modem, and exposes SIM status, SMS and USSD operations on top.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Hardware detection by USB identity with a probe fallback
//! - Ordered fallback strategies for SMS submission and USSD requests
//! - GSM 03.38 7-bit packing, UCS-2 replies and SMS-SUBMIT PDUs
//! - Comprehensive error handling
//!
//! ## Quick Start
//!
//! ```no_run
//! use modemfleet::{FleetConfig, ModemFleet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), modemfleet::Error> {
//!     let fleet = ModemFleet::new(FleetConfig::default())?;
//!
//!     for id in fleet.detect_modems().await? {
//!         // Connects on demand
//!         let sim = fleet.get_sim_info(&id).await?;
//!         println!("{id}: {:?} on {:?}", sim.msisdn, sim.operator_name);
//!
//!         let balance = fleet.get_balance(&id).await?;
//!         println!("balance: {}", balance.response);
//!     }
//!
//!     fleet.cleanup().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`codec`] - GSM 7-bit and UCS-2 text codecs
//! - [`protocol`] - AT command vocabulary, line framing and reply parsers
//! - [`transport`] - Line transports (currently USB/Serial)
//! - [`engine`] - Command/response exchange with timeouts and retries
//! - [`session`] - Per-modem session with SMS and USSD operations
//! - [`detector`] - Hardware discovery
//! - [`fleet`] - High-level [`ModemFleet`] coordinator
//! - [`types`] - Data structures (identities, status, SMS, USSD)

pub mod codec;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use config::{DetectorConfig, FleetConfig, SessionConfig, UsbMatch};
pub use detector::ModemDetector;
pub use engine::CommandEngine;
pub use error::{Error, ErrorKind, Result};
pub use fleet::{FleetSession, ModemFleet};
pub use protocol::{Response, Terminal};
pub use session::{ModemSession, SmsStrategy, UssdFormat};
pub use transport::{PortInfo, PortProvider, SerialPorts, SerialTransport, Transport, list_ports};
pub use types::{
    ConnectionState, FleetStats, FleetStatus, ModemDetails, ModemIdentity, ModemInfo, ModemStatus,
    NetworkType, SimSnapshot, SmsRecord, SmsStatus, UssdExchange,
};
