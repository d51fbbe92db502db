//! Hardware discovery.
//!
//! Ports are filtered by USB identity or description keywords, then
//! confirmed with a short probe. If no port looks like a modem, every port
//! is probed as a last resort.

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::transport::{PortInfo, PortProvider, Transport};
use crate::types::ModemIdentity;

/// Substrings that show a port is a responsive modem.
const PROBE_TOKENS: [&str; 4] = ["OK", "+CSQ", "Manufacturer", "Model"];

/// Finds responsive modems among the available ports.
pub struct ModemDetector {
    provider: Arc<dyn PortProvider>,
    config: DetectorConfig,
    span: tracing::Span,
}

impl ModemDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(provider: Arc<dyn PortProvider>, config: DetectorConfig) -> Self {
        Self {
            provider,
            config,
            span: tracing::info_span!("detector"),
        }
    }

    /// Replaces the span the detector logs under.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Returns true if the port's identity or description matches.
    #[must_use]
    pub fn is_candidate(&self, port: &PortInfo) -> bool {
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            if self.config.usb_matches.iter().any(|m| m.matches(vid, pid)) {
                return true;
            }
        }
        port.description.as_deref().is_some_and(|description| {
            let description = description.to_lowercase();
            self.config
                .keywords
                .iter()
                .any(|keyword| description.contains(keyword.as_str()))
        })
    }

    /// Enumerates ports and returns those with a responsive modem.
    ///
    /// Ports are probed one after another. Nothing is kept open.
    ///
    /// # Errors
    ///
    /// Fails only if the ports cannot be enumerated.
    pub async fn detect(&self) -> Result<Vec<ModemIdentity>> {
        async {
            let ports = self.provider.available_ports()?;
            tracing::debug!("found {} serial ports", ports.len());

            let candidates: Vec<&PortInfo> =
                ports.iter().filter(|port| self.is_candidate(port)).collect();
            let targets = if candidates.is_empty() {
                tracing::warn!("no known modem ports, probing all {} ports", ports.len());
                ports.iter().collect()
            } else {
                candidates
            };

            let mut found = Vec::new();
            for port in targets {
                if self.probe_port(port).await {
                    found.push(ModemIdentity::from_port(port));
                }
            }

            tracing::info!("detected {} modems", found.len());
            Ok(found)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn probe_port(&self, port: &PortInfo) -> bool {
        let mut transport = self
            .provider
            .transport(&port.port_name, self.config.baud_rate);
        match probe(transport.as_mut(), &self.config).await {
            Ok(true) => {
                tracing::info!("modem responding on {}", port.port_name);
                true
            }
            Ok(false) => {
                tracing::debug!("no modem on {}", port.port_name);
                false
            }
            Err(e) => {
                tracing::debug!("probe of {} failed: {}", port.port_name, e);
                false
            }
        }
    }
}

/// Opens `transport`, sends the probe commands and closes it again.
///
/// Returns true on the first line carrying a probe token.
///
/// # Errors
///
/// Fails if the transport cannot be opened or written.
pub async fn probe<T: Transport + ?Sized>(transport: &mut T, config: &DetectorConfig) -> Result<bool> {
    transport.open().await?;
    let result = probe_open(transport, config).await;
    if let Err(e) = transport.close().await {
        tracing::debug!("close after probe failed: {}", e);
    }
    result
}

async fn probe_open<T: Transport + ?Sized>(transport: &mut T, config: &DetectorConfig) -> Result<bool> {
    for command in &config.probe_commands {
        transport.clear_input()?;
        transport
            .write(Bytes::from(format!("{command}\r\n")))
            .await?;

        let deadline = Instant::now() + config.probe_window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match transport.read_line(remaining).await? {
                Some(line) if PROBE_TOKENS.iter().any(|token| line.contains(token)) => {
                    return Ok(true);
                }
                Some(line) => tracing::trace!("probe {}: {}", command, line),
                None => break,
            }
        }
    }
    Ok(false)
}
