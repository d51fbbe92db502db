//! A session with one modem.
//!
//! A [`ModemSession`] owns the command engine for one port and implements
//! the high-level operations as scripted command sequences. Best-effort
//! steps are logged and skipped; only the steps an operation cannot do
//! without are allowed to fail it.
//!
//! Every public operation runs under the session's operation lock, so
//! multi-command sequences (pre-flight, compose, body, await) never
//! interleave on the transport.

mod sms;
mod ussd;

pub use sms::{SmsStrategy, normalize_number};
pub use ussd::UssdFormat;

use std::future::Future;
use std::sync::{Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::instrument::Instrumented;

use crate::config::SessionConfig;
use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::protocol::parser::{self, OperatorInfo};
use crate::protocol::{Response, at};
use crate::transport::Transport;
use crate::types::{
    ConnectionState, ModemDetails, ModemIdentity, ModemStatus, NetworkType, SimSnapshot,
};

/// SIM state reported by `AT+CPIN?` when no PIN is required.
const SIM_READY: &str = "READY";

/// State guarded by the operation lock.
#[derive(Debug, Default)]
struct Operation {
    sim_cache: Option<(Instant, SimSnapshot)>,
}

/// State readable without waiting for a running operation.
#[derive(Debug, Default)]
struct Shared {
    state: ConnectionState,
    details: ModemDetails,
}

/// Registration and access technology.
#[derive(Debug, Default)]
struct Network {
    operator: Option<OperatorInfo>,
    network_type: NetworkType,
}

/// A session with one modem.
pub struct ModemSession<T> {
    identity: ModemIdentity,
    config: SessionConfig,
    engine: CommandEngine<T>,
    op: Mutex<Operation>,
    shared: StdMutex<Shared>,
    span: tracing::Span,
}

impl<T: Transport> ModemSession<T> {
    /// Creates a session over an unopened transport.
    #[must_use]
    pub fn new(identity: ModemIdentity, transport: T, config: SessionConfig) -> Self {
        let engine = CommandEngine::new(transport)
            .with_timeout(config.command_timeout)
            .with_retries(config.retries)
            .with_retry_delay(config.retry_delay);
        let span = tracing::info_span!("modem", id = %identity.id, port = %identity.port);
        Self {
            identity,
            config,
            engine,
            op: Mutex::new(Operation::default()),
            shared: StdMutex::new(Shared::default()),
            span,
        }
    }

    /// Replaces the span the session logs under.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the modem identity.
    #[must_use]
    pub const fn identity(&self) -> &ModemIdentity {
        &self.identity
    }

    /// Returns the modem id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared().state
    }

    /// Returns the model, firmware and IMEI read at connect time.
    #[must_use]
    pub fn modem_details(&self) -> ModemDetails {
        self.shared().details.clone()
    }

    fn shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut shared = self.shared();
        if shared.state != state {
            tracing::debug!("state {:?} -> {:?}", shared.state, state);
            shared.state = state;
        }
    }

    /// Records the outcome of an operation on an open session.
    fn settle<R>(&self, result: Result<R>) -> Result<R> {
        if self.state().is_connected() {
            self.set_state(if result.is_ok() {
                ConnectionState::Ready
            } else {
                ConnectionState::Degraded
            });
        }
        result
    }

    fn traced<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }

    /// Opens the port, checks the modem answers and configures it.
    ///
    /// Configuration and identification are best-effort. Connecting an
    /// already connected session is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the port cannot be opened or the modem does not answer
    /// `AT` with `OK`. The port is closed again in that case.
    pub async fn connect(&self) -> Result<()> {
        self.traced(async {
            let _op = self.op.lock().await;
            if self.state().is_connected() {
                return Ok(());
            }

            tracing::info!("connecting");
            self.set_state(ConnectionState::Connecting);

            if let Err(e) = self.open_and_check().await {
                tracing::error!("connect failed: {}", e);
                if let Err(close_err) = self.engine.close().await {
                    tracing::warn!("close after failed connect: {}", close_err);
                }
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }

            self.configure().await;
            let details = self.read_details().await;
            tracing::info!(
                model = details.model.as_deref().unwrap_or("unknown"),
                "connected"
            );
            {
                let mut shared = self.shared();
                shared.details = details;
                shared.state = ConnectionState::Ready;
            }
            Ok(())
        })
        .await
    }

    async fn open_and_check(&self) -> Result<()> {
        self.engine.open().await?;
        let response = self
            .engine
            .send(at::AT, self.config.liveness_timeout, self.config.retries)
            .await?;
        if !response.is_ok() {
            return Err(Error::Transport {
                message: format!("modem did not answer AT: {}", response.last_line()),
            });
        }
        Ok(())
    }

    async fn configure(&self) {
        let apn = at::set_apn(&self.config.apn);
        let steps = [
            at::RESET,
            at::FACTORY_RESET,
            at::SIM_STATE,
            at::REGISTRATION,
            at::SIGNAL_QUALITY,
            at::GPRS_ATTACH,
            apn.as_str(),
            at::SMS_TEXT_MODE,
            at::SMS_NOTIFICATIONS,
            at::CALLER_ID,
            at::OPERATOR_AUTO,
        ];
        for command in steps {
            self.step(command).await;
        }
    }

    async fn read_details(&self) -> ModemDetails {
        let info = |response: Option<Response>| {
            response.and_then(|r| r.info_line().map(str::to_owned))
        };
        ModemDetails {
            model: info(self.step(at::MODEL).await),
            firmware: info(self.step(at::FIRMWARE).await),
            imei: info(self.step(at::IMEI).await),
        }
    }

    /// Runs a best-effort step, returning the response only if it was `OK`.
    async fn step(&self, command: &str) -> Option<Response> {
        match self.engine.send(command, self.config.step_timeout, 1).await {
            Ok(response) if response.is_ok() => Some(response),
            Ok(response) => {
                tracing::warn!("{} rejected: {}", command, response.last_line());
                None
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", command, e);
                None
            }
        }
    }

    /// Runs a query whose failure only empties one field.
    ///
    /// Transport failures still propagate.
    async fn query(&self, command: &str) -> Result<Option<Response>> {
        match self.engine.send_default(command).await {
            Ok(response) if response.is_ok() => Ok(Some(response)),
            Ok(response) => {
                tracing::debug!("{} rejected: {}", command, response.last_line());
                Ok(None)
            }
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                tracing::warn!("{} failed: {}", command, e);
                Ok(None)
            }
        }
    }

    /// Pre-flight shared by SMS and USSD.
    async fn preflight(&self) {
        if self.step(at::AT).await.is_none() {
            tracing::warn!("modem not answering AT");
        }

        let sim = self
            .step(at::SIM_STATE)
            .await
            .and_then(|r| r.find("+CPIN:").and_then(parser::parse_cpin));
        if sim.as_deref() != Some(SIM_READY) {
            tracing::warn!("SIM not ready: {}", sim.as_deref().unwrap_or("unknown"));
        }

        let registered = self
            .step(at::REGISTRATION)
            .await
            .and_then(|r| r.find("+CREG:").and_then(parser::parse_creg))
            .is_some_and(parser::is_registered);
        if !registered {
            tracing::warn!("not registered on the network");
        }

        self.step(at::RESET).await;
    }

    async fn signal(&self) -> Result<Option<u8>> {
        Ok(self
            .query(at::SIGNAL_QUALITY)
            .await?
            .and_then(|r| r.find("+CSQ:").and_then(parser::parse_csq))
            .and_then(parser::signal_percent))
    }

    async fn network(&self) -> Result<Network> {
        let operator = self
            .query(at::OPERATOR)
            .await?
            .and_then(|r| r.find("+COPS:").and_then(parser::parse_cops));
        let registered = self
            .query(at::REGISTRATION)
            .await?
            .and_then(|r| r.find("+CREG:").and_then(parser::parse_creg))
            .is_some_and(parser::is_registered);
        let attached = if registered {
            self.query(at::GPRS_ATTACH)
                .await?
                .and_then(|r| r.find("+CGATT:").and_then(parser::parse_cgatt))
                .unwrap_or(false)
        } else {
            false
        };

        let network_type = match operator.as_ref().and_then(|o| o.act) {
            Some(act) => NetworkType::from_act(act),
            None if registered && attached => NetworkType::Lte,
            None => NetworkType::Unknown,
        };
        Ok(Network {
            operator,
            network_type,
        })
    }

    /// Returns the current status.
    ///
    /// Never fails: a field whose query fails is left empty, and a lost
    /// link yields `connected = false` with the error message.
    pub async fn get_status(&self) -> ModemStatus {
        self.traced(async {
            let _op = self.op.lock().await;
            let mut status = ModemStatus {
                modem_id: Some(self.identity.id.clone()),
                port: Some(self.identity.port.clone()),
                ..ModemStatus::default()
            };

            if !self.state().is_connected() {
                status.error = Some(Error::NotConnected.to_string());
                return status;
            }

            match self.settle(self.query_status().await) {
                Ok((signal, network)) => {
                    let details = self.modem_details();
                    status.connected = true;
                    status.model = details.model;
                    status.firmware = details.firmware;
                    status.signal_strength = signal;
                    status.operator = network.operator.and_then(|o| o.name);
                    status.network_type = network.network_type;
                }
                Err(e) => {
                    tracing::error!("status query failed: {}", e);
                    status.error = Some(e.to_string());
                }
            }
            status
        })
        .await
    }

    async fn query_status(&self) -> Result<(Option<u8>, Network)> {
        let signal = self.signal().await?;
        let network = self.network().await?;
        Ok((signal, network))
    }

    /// Returns SIM card information, served from cache within its TTL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if the SIM is not ready, or the
    /// transport error that interrupted the query.
    pub async fn get_sim_info(&self) -> Result<SimSnapshot> {
        self.traced(async {
            let mut op = self.op.lock().await;
            if let Some((cached_at, snapshot)) = &op.sim_cache {
                if cached_at.elapsed() < self.config.sim_cache_ttl {
                    tracing::debug!("SIM info served from cache");
                    return Ok(snapshot.clone());
                }
            }

            let snapshot = self.settle(self.query_sim().await)?;
            op.sim_cache = Some((Instant::now(), snapshot.clone()));
            Ok(snapshot)
        })
        .await
    }

    async fn query_sim(&self) -> Result<SimSnapshot> {
        self.require_sim_ready().await?;

        let imsi = self
            .query(at::IMSI)
            .await?
            .and_then(|r| r.info_line().map(str::to_owned));
        let iccid = self
            .query(at::ICCID)
            .await?
            .and_then(|r| parser::parse_iccid(&r));
        let msisdn = self
            .query(at::MSISDN)
            .await?
            .and_then(|r| r.find("+CNUM:").and_then(parser::parse_cnum));
        let signal_strength = self.signal().await?;
        let network = self.network().await?;

        Ok(SimSnapshot {
            modem_id: Some(self.identity.id.clone()),
            imsi,
            iccid,
            imei: self.modem_details().imei,
            msisdn,
            signal_strength,
            roaming: network.operator.as_ref().is_some_and(OperatorInfo::is_roaming),
            operator_name: network.operator.and_then(|o| o.name),
            network_type: network.network_type,
        })
    }

    async fn require_sim_ready(&self) -> Result<()> {
        let response = self.engine.send_default(at::SIM_STATE).await?;
        let state = if response.is_ok() {
            response
                .find("+CPIN:")
                .and_then(parser::parse_cpin)
                .unwrap_or_else(|| "unknown".into())
        } else {
            response.last_line().to_owned()
        };

        if state == SIM_READY {
            Ok(())
        } else {
            tracing::warn!("SIM not ready: {}", state);
            Err(Error::NotReady { state })
        }
    }

    /// Closes the port. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.traced(async {
            let mut op = self.op.lock().await;
            op.sim_cache = None;
            let result = self.engine.close().await;
            if self.state() != ConnectionState::Disconnected {
                tracing::info!("closed");
            }
            self.set_state(ConnectionState::Disconnected);
            result
        })
        .await
    }
}
