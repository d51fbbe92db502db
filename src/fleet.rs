//! Fleet coordinator.
//!
//! The [`ModemFleet`] owns the registry of detected modems and their live
//! sessions. Structural changes (connect, disconnect, cleanup) run under one
//! coordinator-wide lock so the concurrency limit cannot be overshot;
//! operations on different connected modems run independently.
//!
//! Per-modem operations connect on demand: an unconnected modem is
//! connected first, and if that fails the operation fails with
//! [`Error::NotFound`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::FleetConfig;
use crate::detector::ModemDetector;
use crate::error::{Error, Result};
use crate::session::{ModemSession, SmsStrategy};
use crate::transport::{PortProvider, SerialPorts, Transport};
use crate::types::{
    ConnectionState, FleetStats, FleetStatus, ModemIdentity, ModemInfo, ModemStatus, SimSnapshot,
    SmsRecord, UssdExchange,
};

/// Session type used by the fleet.
pub type FleetSession = ModemSession<Box<dyn Transport>>;

/// One registry entry. Outlives its sessions until re-detection.
struct FleetEntry {
    identity: ModemIdentity,
    session: Option<Arc<FleetSession>>,
    connected_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
}

impl FleetEntry {
    const fn new(identity: ModemIdentity) -> Self {
        Self {
            identity,
            session: None,
            connected_at: None,
            last_activity: None,
        }
    }

    fn info(&self) -> ModemInfo {
        ModemInfo {
            identity: self.identity.clone(),
            state: self
                .session
                .as_ref()
                .map_or(ConnectionState::Disconnected, |s| s.state()),
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

/// Operation counters behind [`ModemFleet::get_stats`].
struct Activity {
    operations: u64,
    last: DateTime<Utc>,
}

/// Coordinator for a set of modems.
pub struct ModemFleet {
    provider: Arc<dyn PortProvider>,
    detector: ModemDetector,
    config: FleetConfig,
    registry: RwLock<HashMap<String, FleetEntry>>,
    structure: Mutex<()>,
    activity: StdMutex<Activity>,
    span: tracing::Span,
}

impl ModemFleet {
    /// Creates a fleet over the system's serial ports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is out of range.
    pub fn new(config: FleetConfig) -> Result<Self> {
        Self::with_provider(config, Arc::new(SerialPorts::new()))
    }

    /// Creates a fleet over the given port provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is out of range.
    pub fn with_provider(config: FleetConfig, provider: Arc<dyn PortProvider>) -> Result<Self> {
        config.validate()?;
        let span = tracing::info_span!("fleet");
        let detector = ModemDetector::new(Arc::clone(&provider), config.detector.clone())
            .with_span(tracing::info_span!(parent: &span, "detector"));
        Ok(Self {
            provider,
            detector,
            config,
            registry: RwLock::new(HashMap::new()),
            structure: Mutex::new(()),
            activity: StdMutex::new(Activity {
                operations: 0,
                last: Utc::now(),
            }),
            span,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FleetConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, FleetEntry>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, FleetEntry>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self, id: &str) -> Option<Arc<FleetSession>> {
        self.read().get(id).and_then(|entry| entry.session.clone())
    }

    fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|entry| entry.session.is_some())
            .count()
    }

    fn touch(&self, id: &str) {
        let now = Utc::now();
        if let Some(entry) = self.write().get_mut(id) {
            entry.last_activity = Some(now);
        }
        let mut activity = self.activity.lock().unwrap_or_else(PoisonError::into_inner);
        activity.operations += 1;
        activity.last = now;
    }

    /// Detects modems and merges them into the registry.
    ///
    /// New modems are added and known ones get their identity refreshed;
    /// nothing is connected or disconnected. Returns the detected ids.
    ///
    /// # Errors
    ///
    /// Fails if the ports cannot be enumerated.
    pub async fn detect_modems(&self) -> Result<Vec<String>> {
        async {
            let identities = self.detector.detect().await?;

            let mut registry = self.write();
            let mut ids = Vec::with_capacity(identities.len());
            for identity in identities {
                ids.push(identity.id.clone());
                match registry.get_mut(&identity.id) {
                    Some(entry) => entry.identity = identity,
                    None => {
                        tracing::info!("new modem {} on {}", identity.id, identity.port);
                        registry.insert(identity.id.clone(), FleetEntry::new(identity));
                    }
                }
            }
            Ok(ids)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Connects a detected modem.
    ///
    /// # Errors
    ///
    /// Checked in order: [`Error::AlreadyConnected`] if the modem has a
    /// live session, [`Error::LimitExceeded`] if the fleet is full,
    /// [`Error::NotFound`] if the id was never detected. Otherwise the
    /// session's connect error.
    pub async fn connect_modem(&self, id: &str) -> Result<()> {
        async {
            let _structure = self.structure.lock().await;

            let identity = {
                let registry = self.read();
                let entry = registry.get(id);
                if entry.is_some_and(|e| e.session.is_some()) {
                    return Err(Error::AlreadyConnected { id: id.to_owned() });
                }
                let active = registry.values().filter(|e| e.session.is_some()).count();
                if active >= self.config.max_modems {
                    return Err(Error::LimitExceeded {
                        max: self.config.max_modems,
                    });
                }
                entry
                    .map(|e| e.identity.clone())
                    .ok_or_else(|| Error::NotFound { id: id.to_owned() })?
            };

            let transport = self
                .provider
                .transport(&identity.port, self.config.session.baud_rate);
            let span = tracing::info_span!(
                parent: &self.span,
                "modem",
                id = %identity.id,
                port = %identity.port
            );
            let session = ModemSession::new(identity, transport, self.config.session.clone())
                .with_span(span);
            session.connect().await?;

            let now = Utc::now();
            if let Some(entry) = self.write().get_mut(id) {
                entry.session = Some(Arc::new(session));
                entry.connected_at = Some(now);
                entry.last_activity = Some(now);
            }
            tracing::info!("connected {} ({} active)", id, self.active_count());
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Disconnects a modem, keeping its registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the modem is not connected, or the
    /// error closing its port.
    pub async fn disconnect_modem(&self, id: &str) -> Result<()> {
        async {
            let _structure = self.structure.lock().await;

            let session = self
                .write()
                .get_mut(id)
                .and_then(|entry| entry.session.take())
                .ok_or_else(|| Error::NotFound { id: id.to_owned() })?;

            let result = session.close().await;
            tracing::info!("disconnected {}", id);
            result
        }
        .instrument(self.span.clone())
        .await
    }

    /// Returns the live session for `id`, connecting it first if needed.
    async fn session(&self, id: &str) -> Result<Arc<FleetSession>> {
        if let Some(session) = self.active(id) {
            return Ok(session);
        }

        tracing::debug!("connecting {} on demand", id);
        match self.connect_modem(id).await {
            Ok(()) | Err(Error::AlreadyConnected { .. }) => self
                .active(id)
                .ok_or_else(|| Error::NotFound { id: id.to_owned() }),
            Err(e) => {
                tracing::warn!("on-demand connect of {} failed: {}", id, e);
                Err(Error::NotFound { id: id.to_owned() })
            }
        }
    }

    /// Runs `op` against the session for `id` and records the activity.
    async fn with_session<R, F, Fut>(&self, id: &str, op: F) -> Result<R>
    where
        F: FnOnce(Arc<FleetSession>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let session = self.session(id).await?;
        let result = op(session).await;
        self.touch(id);
        result
    }

    /// Returns the status of a modem.
    pub async fn get_status(&self, id: &str) -> Result<ModemStatus> {
        self.with_session(id, |s| async move { Ok(s.get_status().await) })
            .await
    }

    /// Returns SIM information of a modem.
    pub async fn get_sim_info(&self, id: &str) -> Result<SimSnapshot> {
        self.with_session(id, |s| async move { s.get_sim_info().await })
            .await
    }

    /// Lists the SMS stored on a modem.
    pub async fn get_sms(&self, id: &str) -> Result<Vec<SmsRecord>> {
        self.with_session(id, |s| async move { s.get_sms_messages().await })
            .await
    }

    /// Sends an SMS from a modem.
    pub async fn send_sms(&self, id: &str, number: &str, text: &str) -> Result<SmsStrategy> {
        self.with_session(id, |s| async move { s.send_sms(number, text).await })
            .await
    }

    /// Deletes an SMS from a modem's storage.
    pub async fn delete_sms(&self, id: &str, index: u32) -> Result<bool> {
        self.with_session(id, |s| async move { s.delete_sms(index).await })
            .await
    }

    /// Sends a USSD request from a modem.
    pub async fn send_ussd(&self, id: &str, command: &str) -> Result<UssdExchange> {
        self.with_session(id, |s| async move { s.send_ussd(command).await })
            .await
    }

    /// Queries the account balance of a modem.
    pub async fn get_balance(&self, id: &str) -> Result<UssdExchange> {
        self.with_session(id, |s| async move { s.get_balance().await })
            .await
    }

    /// Disconnects every modem, logging individual failures.
    pub async fn cleanup(&self) {
        async {
            let _structure = self.structure.lock().await;

            let sessions: Vec<Arc<FleetSession>> = self
                .write()
                .values_mut()
                .filter_map(|entry| entry.session.take())
                .collect();

            let count = sessions.len();
            for session in sessions {
                if let Err(e) = session.close().await {
                    tracing::warn!("failed to close {}: {}", session.id(), e);
                }
            }
            tracing::info!("closed {} modems", count);
        }
        .instrument(self.span.clone())
        .await;
    }

    /// Returns the ids of connected modems, sorted.
    #[must_use]
    pub fn get_connected_modems(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, entry)| entry.session.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Returns a snapshot of a registry entry.
    #[must_use]
    pub fn get_modem_info(&self, id: &str) -> Option<ModemInfo> {
        self.read().get(id).map(FleetEntry::info)
    }

    /// Returns registry sizes and operation counters.
    #[must_use]
    pub fn get_stats(&self) -> FleetStats {
        let (operation_count, last_operation) = {
            let activity = self.activity.lock().unwrap_or_else(PoisonError::into_inner);
            (activity.operations, activity.last)
        };
        let active_modem_ids = self.get_connected_modems();
        FleetStats {
            total_modems: self.read().len(),
            connected_modems: active_modem_ids.len(),
            active_modem_ids,
            operation_count,
            last_operation,
        }
    }

    /// Returns the status of every connected modem.
    ///
    /// Modems are queried concurrently; a failing modem shows up as
    /// disconnected with its error.
    pub async fn get_all_modems_status(&self) -> FleetStatus {
        let (total_modems, sessions): (usize, Vec<(String, Arc<FleetSession>)>) = {
            let registry = self.read();
            let sessions = registry
                .iter()
                .filter_map(|(id, entry)| entry.session.clone().map(|s| (id.clone(), s)))
                .collect();
            (registry.len(), sessions)
        };

        let statuses = join_all(sessions.into_iter().map(|(id, session)| async move {
            let status = session.get_status().await;
            (id, status)
        }))
        .await;

        FleetStatus {
            total_modems,
            connected_modems: statuses.len(),
            modems: statuses.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::{FakePorts, ScriptedTransport, init_tracing, lines, usb_port};

    fn ports() -> Vec<crate::transport::PortInfo> {
        vec![
            usb_port("/dev/ttyUSB0", 0x12d1, 0x1506, "HUAWEI Mobile"),
            usb_port("/dev/ttyUSB1", 0x12d1, 0x1506, "HUAWEI Mobile"),
        ]
    }

    fn fleet_with(provider: FakePorts, max: usize) -> ModemFleet {
        init_tracing();
        ModemFleet::with_provider(FleetConfig::default().max_modems(max), Arc::new(provider))
            .unwrap()
    }

    async fn detected(max: usize) -> ModemFleet {
        let fleet = fleet_with(FakePorts::healthy(ports()), max);
        fleet.detect_modems().await.unwrap();
        fleet
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ModemFleet::with_provider(
            FleetConfig::default().max_modems(0),
            Arc::new(FakePorts::healthy(Vec::new())),
        );
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_does_not_connect() {
        let fleet = fleet_with(FakePorts::healthy(ports()), 10);

        let mut first = fleet.detect_modems().await.unwrap();
        let mut second = fleet.detect_modems().await.unwrap();
        first.sort();
        second.sort();
        assert_eq!(first, vec!["modem-ttyUSB0", "modem-ttyUSB1"]);
        assert_eq!(first, second);
        assert!(fleet.get_connected_modems().is_empty());

        let info = fleet.get_modem_info("modem-ttyUSB0").unwrap();
        assert_eq!(info.state, ConnectionState::Disconnected);
        assert_eq!(info.connected_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_single_winner() {
        let fleet = detected(10).await;

        let (a, b) = tokio::join!(
            fleet.connect_modem("modem-ttyUSB0"),
            fleet.connect_modem("modem-ttyUSB0")
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(Error::AlreadyConnected { .. })))
                .count(),
            1
        );
        assert_eq!(fleet.get_connected_modems(), vec!["modem-ttyUSB0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_exceeded() {
        let fleet = detected(1).await;
        fleet.connect_modem("modem-ttyUSB0").await.unwrap();

        let err = fleet.connect_modem("modem-ttyUSB1").await.unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { max: 1 }));

        // Checked before the id is looked up
        let err = fleet.connect_modem("modem-nope").await.unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { .. }));

        let err = fleet.connect_modem("modem-ttyUSB0").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_unknown_modem() {
        let fleet = detected(10).await;
        let err = fleet.connect_modem("modem-ttyUSB7").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref id } if id == "modem-ttyUSB7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_keeps_entry() {
        let fleet = detected(10).await;
        fleet.connect_modem("modem-ttyUSB0").await.unwrap();

        let info = fleet.get_modem_info("modem-ttyUSB0").unwrap();
        assert_eq!(info.state, ConnectionState::Ready);
        assert!(info.connected_at.is_some());

        fleet.disconnect_modem("modem-ttyUSB0").await.unwrap();
        assert!(fleet.get_connected_modems().is_empty());
        let info = fleet.get_modem_info("modem-ttyUSB0").unwrap();
        assert_eq!(info.state, ConnectionState::Disconnected);

        let err = fleet.disconnect_modem("modem-ttyUSB0").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        // Reconnect through the same entry
        fleet.connect_modem("modem-ttyUSB0").await.unwrap();
        assert_eq!(fleet.get_connected_modems(), vec!["modem-ttyUSB0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redetect_keeps_sessions() {
        let fleet = detected(10).await;
        fleet.connect_modem("modem-ttyUSB1").await.unwrap();
        fleet.detect_modems().await.unwrap();
        assert_eq!(fleet.get_connected_modems(), vec!["modem-ttyUSB1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_on_demand() {
        let fleet = detected(10).await;
        assert!(fleet.get_connected_modems().is_empty());

        let sim = fleet.get_sim_info("modem-ttyUSB0").await.unwrap();
        assert_eq!(sim.modem_id.as_deref(), Some("modem-ttyUSB0"));
        assert_eq!(fleet.get_connected_modems(), vec!["modem-ttyUSB0"]);

        let info = fleet.get_modem_info("modem-ttyUSB0").unwrap();
        assert!(info.last_activity >= info.connected_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_on_demand_failure_is_not_found() {
        let provider = FakePorts::new(ports(), |port| {
            if port == "/dev/ttyUSB1" {
                // Identifies itself to the probe but never answers AT
                ScriptedTransport::new(|written| {
                    if written == "ATI" {
                        lines(&["Model: E3372", "OK"])
                    } else {
                        Vec::new()
                    }
                })
            } else {
                ScriptedTransport::healthy()
            }
        });
        let fleet = fleet_with(provider, 10);
        assert_eq!(fleet.detect_modems().await.unwrap().len(), 2);

        let err = fleet.get_status("modem-ttyUSB1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        assert!(fleet.get_connected_modems().is_empty());

        let err = fleet.send_ussd("modem-unknown", "*223#").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_modem_operations() {
        let fleet = detected(10).await;
        let id = "modem-ttyUSB0";

        let status = fleet.get_status(id).await.unwrap();
        assert!(status.connected);

        let sms = fleet.get_sms(id).await.unwrap();
        assert_eq!(sms.len(), 1);
        assert!(fleet.delete_sms(id, sms[0].id).await.unwrap());

        let strategy = fleet.send_sms(id, "0555123456", "Salam").await.unwrap();
        assert_eq!(strategy, SmsStrategy::QuotedText);

        let ussd = fleet.send_ussd(id, "*223#").await.unwrap();
        assert!(ussd.success);

        let balance = fleet.get_balance(id).await.unwrap();
        assert!(balance.response.to_lowercase().contains("solde"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_count_operations() {
        let fleet = detected(10).await;
        let created = fleet.get_stats();
        assert_eq!(created.total_modems, 2);
        assert_eq!(created.connected_modems, 0);
        assert_eq!(created.operation_count, 0);

        fleet.get_status("modem-ttyUSB1").await.unwrap();
        fleet.get_sms("modem-ttyUSB1").await.unwrap();
        // Fails before reaching a session, not counted
        fleet.get_sms("modem-unknown").await.unwrap_err();

        let stats = fleet.get_stats();
        assert_eq!(stats.operation_count, 2);
        assert_eq!(stats.active_modem_ids, vec!["modem-ttyUSB1"]);
        assert_eq!(stats.connected_modems, 1);
        assert!(stats.last_operation >= created.last_operation);
        assert_eq!(
            Some(stats.last_operation),
            fleet.get_modem_info("modem-ttyUSB1").unwrap().last_activity
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_modems_status_and_cleanup() {
        let fleet = detected(10).await;
        fleet.connect_modem("modem-ttyUSB0").await.unwrap();
        fleet.connect_modem("modem-ttyUSB1").await.unwrap();

        let status = fleet.get_all_modems_status().await;
        assert_eq!(status.total_modems, 2);
        assert_eq!(status.connected_modems, 2);
        assert!(status.modems["modem-ttyUSB1"].connected);

        fleet.cleanup().await;
        assert!(fleet.get_connected_modems().is_empty());
        assert_eq!(fleet.get_all_modems_status().await.connected_modems, 0);
        assert!(fleet.get_modem_info("modem-ttyUSB0").is_some());
    }
}
