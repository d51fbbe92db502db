//! Transport layer for modem communication.
//!
//! This module provides the abstraction over the serial command channel
//! and over port enumeration. The USB/Serial implementation lives in
//! [`serial`].

pub mod serial;

#[cfg(test)]
pub(crate) mod scripted;

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;

/// Trait for transport implementations.
///
/// A transport is a half-duplex byte channel to one modem, read back as
/// decoded lines.
pub trait Transport: Send {
    /// Opens the channel. Opening an open transport is a no-op.
    fn open(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Closes the channel. Closing a closed transport is a no-op.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Returns true if the channel is open.
    fn is_open(&self) -> bool;

    /// Discards any unread input.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the port rejects it.
    fn clear_input(&mut self) -> Result<()>;

    /// Writes raw bytes.
    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Reads the next non-empty line, waiting at most `timeout`.
    ///
    /// Resolves to `Ok(None)` when the deadline passes without a line.
    fn read_line(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<String>>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        (**self).open()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        (**self).write(data)
    }

    fn read_line(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<String>>> {
        (**self).read_line(timeout)
    }
}

/// An enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port path (e.g. "/dev/ttyUSB0" or "COM3").
    pub port_name: String,
    /// USB vendor id, for USB ports.
    pub vid: Option<u16>,
    /// USB product id, for USB ports.
    pub pid: Option<u16>,
    /// Manufacturer and product strings, for USB ports.
    pub description: Option<String>,
}

/// Source of ports and transports.
///
/// The detector and the fleet never open hardware directly; they go
/// through a provider so that both can be driven without devices.
pub trait PortProvider: Send + Sync {
    /// Lists the ports currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if the port list cannot be retrieved.
    fn available_ports(&self) -> Result<Vec<PortInfo>>;

    /// Creates an unopened transport for `port`.
    fn transport(&self, port: &str, baud_rate: u32) -> Box<dyn Transport>;
}

pub use serial::{SerialConfig, SerialPorts, SerialTransport, list_ports};
