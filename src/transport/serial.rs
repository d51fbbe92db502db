//! Serial/USB transport implementation.
//!
//! This module provides serial port communication for modems connected
//! via USB.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialPortType, SerialStream};

use crate::error::{Error, Result};
use crate::protocol::LineDecoder;
use crate::transport::{PortInfo, PortProvider, Transport};

/// Default baud rate for USB modems.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default delay between opening the port and the first command.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(300);

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening before sending commands.
    pub connection_delay: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            connection_delay: DEFAULT_CONNECTION_DELAY,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }
}

/// Serial transport for AT command traffic.
pub struct SerialTransport {
    config: SerialConfig,
    stream: Option<SerialStream>,
    decoder: LineDecoder,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            stream: None,
            decoder: LineDecoder::new(),
        }
    }

    /// Creates a new serial transport for the given port with default settings.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Returns the port path.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.config.port
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.stream.is_some() {
                return Ok(());
            }

            tracing::info!("opening serial port: {}", self.config.port);

            let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .open_native_async()
                .map_err(Error::Serial)?;

            // Give the modem time to settle, then drop whatever it sent meanwhile
            tokio::time::sleep(self.config.connection_delay).await;
            if let Err(e) = stream.clear(ClearBuffer::Input) {
                tracing::warn!("failed to clear input buffer: {}", e);
            }

            self.stream = Some(stream);
            self.decoder.clear();

            tracing::info!("opened serial port: {}", self.config.port);
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.stream.take().is_some() {
                tracing::info!("closed serial port: {}", self.config.port);
            }
            self.decoder.clear();
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn clear_input(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(Error::NotConnected)?;
        stream.clear(ClearBuffer::Input).map_err(Error::Serial)?;
        self.decoder.clear();
        Ok(())
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

            tracing::trace!("writing {} bytes", data.len());
            stream.write_all(&data).await.map_err(Error::Io)?;
            stream.flush().await.map_err(Error::Io)?;

            Ok(())
        })
    }

    fn read_line(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            let mut buf = [0u8; 1024];

            loop {
                if let Some(line) = self.decoder.decode() {
                    tracing::trace!("received line: {}", line);
                    return Ok(Some(line));
                }

                let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }

                match tokio::time::timeout(remaining, stream.read(&mut buf)).await {
                    Err(_) => return Ok(None),
                    Ok(Ok(0)) => {
                        tracing::debug!("serial port closed");
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            "serial port closed",
                        )));
                    }
                    Ok(Ok(n)) => {
                        tracing::trace!("received {} bytes", n);
                        self.decoder.feed(&buf[..n]);
                    }
                    Ok(Err(e)) => {
                        tracing::error!("serial read error: {}", e);
                        return Err(Error::Io(e));
                    }
                }
            }
        })
    }
}

/// Port provider backed by the operating system's serial ports.
#[derive(Debug, Clone, Copy)]
pub struct SerialPorts {
    connection_delay: Duration,
}

impl SerialPorts {
    /// Creates a provider using the default connection delay.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connection_delay: DEFAULT_CONNECTION_DELAY,
        }
    }

    /// Sets the connection delay of created transports.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }
}

impl Default for SerialPorts {
    fn default() -> Self {
        Self::new()
    }
}

impl PortProvider for SerialPorts {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        list_ports()
    }

    fn transport(&self, port: &str, baud_rate: u32) -> Box<dyn Transport> {
        let config = SerialConfig::new(port)
            .baud_rate(baud_rate)
            .connection_delay(self.connection_delay);
        Box::new(SerialTransport::new(config))
    }
}

/// Lists available serial ports with their USB identity.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) => {
                let description = [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                PortInfo {
                    port_name: p.port_name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    description: (!description.is_empty()).then_some(description),
                }
            }
            _ => PortInfo {
                port_name: p.port_name,
                vid: None,
                pid: None,
                description: None,
            },
        })
        .collect())
}
