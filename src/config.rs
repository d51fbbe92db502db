//! Configuration for sessions, detection and the fleet.
//!
//! Every struct has defaults matching common USB modems and builder-style
//! setters. Loading values from files or the environment is left to the
//! caller.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::at;
use crate::transport::serial::DEFAULT_BAUD_RATE;

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of attempts for a timed-out command.
pub const DEFAULT_RETRIES: u32 = 3;
/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default SIM snapshot time-to-live.
pub const DEFAULT_SIM_CACHE_TTL: Duration = Duration::from_secs(300);
/// Default number of concurrently connected modems.
pub const DEFAULT_MAX_MODEMS: usize = 10;
/// Upper bound for [`FleetConfig::max_modems`].
pub const MAX_MODEMS_LIMIT: usize = 50;

/// Session timing and carrier settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Baud rate used to open the port.
    pub baud_rate: u32,
    /// Timeout of an ordinary command.
    pub command_timeout: Duration,
    /// Attempts for a command that times out.
    pub retries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Timeout of the `AT` liveness check.
    pub liveness_timeout: Duration,
    /// Timeout of each best-effort configuration or pre-flight step.
    pub step_timeout: Duration,
    /// Timeout waiting for the compose prompt.
    pub compose_timeout: Duration,
    /// Timeout waiting for an SMS submission to complete.
    pub sms_timeout: Duration,
    /// Timeout waiting for a USSD reply.
    pub ussd_timeout: Duration,
    /// How long a SIM snapshot is served from cache.
    pub sim_cache_ttl: Duration,
    /// Country code replacing a local leading zero (e.g. "+213").
    pub country_code: String,
    /// Packet data APN set during configuration.
    pub apn: String,
    /// USSD codes tried in order by a balance query.
    pub balance_codes: Vec<String>,
    /// Case-insensitive words that mark a reply as a balance.
    pub balance_keywords: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            liveness_timeout: Duration::from_secs(3),
            step_timeout: Duration::from_secs(5),
            compose_timeout: Duration::from_secs(15),
            sms_timeout: Duration::from_secs(30),
            ussd_timeout: Duration::from_secs(30),
            sim_cache_ttl: DEFAULT_SIM_CACHE_TTL,
            country_code: "+213".into(),
            apn: "internet".into(),
            balance_codes: ["*223#", "*100#", "*101#", "*102#"]
                .map(String::from)
                .to_vec(),
            balance_keywords: ["balance", "solde"].map(String::from).to_vec(),
        }
    }
}

impl SessionConfig {
    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the ordinary command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the number of attempts for a timed-out command.
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the SMS submission timeout.
    #[must_use]
    pub const fn sms_timeout(mut self, timeout: Duration) -> Self {
        self.sms_timeout = timeout;
        self
    }

    /// Sets the USSD reply timeout.
    #[must_use]
    pub const fn ussd_timeout(mut self, timeout: Duration) -> Self {
        self.ussd_timeout = timeout;
        self
    }

    /// Sets the SIM snapshot time-to-live.
    #[must_use]
    pub const fn sim_cache_ttl(mut self, ttl: Duration) -> Self {
        self.sim_cache_ttl = ttl;
        self
    }

    /// Sets the country code.
    #[must_use]
    pub fn country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    /// Sets the APN.
    #[must_use]
    pub fn apn(mut self, apn: impl Into<String>) -> Self {
        self.apn = apn.into();
        self
    }

    /// Sets the balance USSD codes.
    #[must_use]
    pub fn balance_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.balance_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<()> {
        let timeouts = [
            ("command_timeout", self.command_timeout),
            ("liveness_timeout", self.liveness_timeout),
            ("step_timeout", self.step_timeout),
            ("compose_timeout", self.compose_timeout),
            ("sms_timeout", self.sms_timeout),
            ("ussd_timeout", self.ussd_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(invalid(format!("{name} must be non-zero")));
        }
        if self.retries == 0 {
            return Err(invalid("retries must be at least 1"));
        }
        if self.balance_codes.is_empty() {
            return Err(invalid("at least one balance code is required"));
        }
        Ok(())
    }
}

/// A USB vendor id, optionally narrowed to one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbMatch {
    /// Vendor id.
    pub vid: u16,
    /// Product id, `None` matches any product of the vendor.
    pub pid: Option<u16>,
}

impl UsbMatch {
    /// Matches every product of a vendor.
    #[must_use]
    pub const fn vendor(vid: u16) -> Self {
        Self { vid, pid: None }
    }

    /// Matches one product.
    #[must_use]
    pub const fn product(vid: u16, pid: u16) -> Self {
        Self {
            vid,
            pid: Some(pid),
        }
    }

    /// Returns true if the given ids match.
    #[must_use]
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid.is_none_or(|p| p == pid)
    }
}

/// Hardware discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Known modem USB identities.
    pub usb_matches: Vec<UsbMatch>,
    /// Lower-case keywords looked for in the port description.
    pub keywords: Vec<String>,
    /// Commands sent by the probe, in order.
    pub probe_commands: Vec<String>,
    /// How long to read after each probe command.
    pub probe_window: Duration,
    /// Baud rate used by the probe.
    pub baud_rate: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            usb_matches: vec![
                // Huawei
                UsbMatch::vendor(0x12d1),
                // ZTE
                UsbMatch::vendor(0x19d2),
                UsbMatch::vendor(0x1c9e),
            ],
            keywords: ["huawei", "e3531", "e3131", "e3372", "e5573", "e5785"]
                .map(String::from)
                .to_vec(),
            probe_commands: [at::AT, at::RESET, at::IDENTIFY]
                .map(String::from)
                .to_vec(),
            probe_window: Duration::from_secs(2),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl DetectorConfig {
    /// Sets the probe window.
    #[must_use]
    pub const fn probe_window(mut self, window: Duration) -> Self {
        self.probe_window = window;
        self
    }

    /// Adds a known USB identity.
    #[must_use]
    pub fn usb_match(mut self, usb: UsbMatch) -> Self {
        self.usb_matches.push(usb);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.probe_window.is_zero() {
            return Err(invalid("probe_window must be non-zero"));
        }
        if self.probe_commands.is_empty() {
            return Err(invalid("at least one probe command is required"));
        }
        Ok(())
    }
}

/// Fleet settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    /// Maximum number of concurrently connected modems.
    pub max_modems: usize,
    /// Settings for each session.
    pub session: SessionConfig,
    /// Settings for discovery.
    pub detector: DetectorConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_modems: DEFAULT_MAX_MODEMS,
            session: SessionConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Sets the maximum number of connected modems.
    #[must_use]
    pub const fn max_modems(mut self, max: usize) -> Self {
        self.max_modems = max;
        self
    }

    /// Sets the session configuration.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Sets the detector configuration.
    #[must_use]
    pub fn detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_MODEMS_LIMIT).contains(&self.max_modems) {
            return Err(invalid(format!(
                "max_modems must be between 1 and {MAX_MODEMS_LIMIT}, got {}",
                self.max_modems
            )));
        }
        self.session.validate()?;
        self.detector.validate()
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.max_modems, 10);
        assert_eq!(config.session.command_timeout, Duration::from_secs(10));
        assert_eq!(config.session.retries, 3);
        assert_eq!(config.session.sim_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.session.country_code, "+213");
        assert_eq!(config.session.balance_codes[0], "*223#");
        assert_eq!(config.detector.probe_window, Duration::from_secs(2));
        assert_eq!(config.detector.probe_commands, vec!["AT", "ATZ", "ATI"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_modems_bounds() {
        assert!(FleetConfig::default().max_modems(1).validate().is_ok());
        assert!(FleetConfig::default().max_modems(50).validate().is_ok());

        let err = FleetConfig::default().max_modems(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(FleetConfig::default().max_modems(51).validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config =
            FleetConfig::default().session(SessionConfig::default().sms_timeout(Duration::ZERO));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sms_timeout"));

        let config = FleetConfig::default()
            .detector(DetectorConfig::default().probe_window(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_usb_match() {
        assert!(UsbMatch::vendor(0x12d1).matches(0x12d1, 0x1506));
        assert!(UsbMatch::product(0x12d1, 0x1506).matches(0x12d1, 0x1506));
        assert!(!UsbMatch::product(0x12d1, 0x1506).matches(0x12d1, 0x14dc));
        assert!(!UsbMatch::vendor(0x12d1).matches(0x19d2, 0x1506));
    }
}
