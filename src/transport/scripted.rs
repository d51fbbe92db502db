//! Scripted transports and port providers for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::protocol::at;
use crate::transport::{PortInfo, PortProvider, Transport};

/// Maps one written chunk (trimmed of CR/LF) to the lines the modem sends back.
pub(crate) type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

/// Shared log of everything written to a transport.
pub(crate) type WriteLog = Arc<Mutex<Vec<String>>>;

/// Transport that answers writes through a responder closure.
///
/// Reading with nothing queued sleeps for the whole timeout, so tests
/// should run with paused time.
pub(crate) struct ScriptedTransport {
    responder: Responder,
    queue: VecDeque<String>,
    writes: WriteLog,
    open: bool,
    fail_open: bool,
    latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new(responder: impl FnMut(&str) -> Vec<String> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            queue: VecDeque::new(),
            writes: Arc::new(Mutex::new(Vec::new())),
            open: false,
            fail_open: false,
            latency: Duration::ZERO,
        }
    }

    /// A transport answering like a healthy, registered modem.
    pub(crate) fn healthy() -> Self {
        Self::new(healthy_modem)
    }

    /// Makes `open` fail.
    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Delays every queued line by `latency`, so readers yield between lines.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn writes(&self) -> WriteLog {
        Arc::clone(&self.writes)
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_open {
                return Err(Error::Transport {
                    message: "port busy".into(),
                });
            }
            self.open = true;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.open = false;
            self.queue.clear();
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn clear_input(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::NotConnected);
        }
        self.queue.clear();
        Ok(())
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::NotConnected);
            }
            let text = String::from_utf8_lossy(&data)
                .trim_end_matches(['\r', '\n'])
                .to_owned();
            if let Ok(mut writes) = self.writes.lock() {
                writes.push(text.clone());
            }
            let replies = (self.responder)(&text);
            self.queue.extend(replies);
            Ok(())
        })
    }

    fn read_line(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::NotConnected);
            }
            if let Some(line) = self.queue.pop_front() {
                if !self.latency.is_zero() {
                    tokio::time::sleep(self.latency.min(timeout)).await;
                }
                return Ok(Some(line));
            }
            tokio::time::sleep(timeout).await;
            Ok(None)
        })
    }
}

/// Builds an owned line list.
pub(crate) fn lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| (*l).to_owned()).collect()
}

/// Responder for a registered modem with a ready SIM.
pub(crate) fn healthy_modem(written: &str) -> Vec<String> {
    if written.ends_with(at::CTRL_Z) {
        return lines(&["+CMGS: 12", "OK"]);
    }
    if written.starts_with("AT+CMGS=") {
        return lines(&[">"]);
    }
    if written.starts_with("AT+CUSD=1") {
        return lines(&["+CUSD: 0,\"Votre solde est 100 DA\",15", "OK"]);
    }
    match written {
        at::SIM_STATE => lines(&["+CPIN: READY", "OK"]),
        at::SIGNAL_QUALITY => lines(&["+CSQ: 20,99", "OK"]),
        at::OPERATOR => lines(&["+COPS: 0,0,\"Mobilis\",7", "OK"]),
        at::REGISTRATION => lines(&["+CREG: 0,1", "OK"]),
        at::GPRS_ATTACH => lines(&["+CGATT: 1", "OK"]),
        at::MODEL => lines(&["E3372", "OK"]),
        at::FIRMWARE => lines(&["22.200.15.00.00", "OK"]),
        at::IMEI => lines(&["861234567890123", "OK"]),
        at::IMSI => lines(&["603011234567890", "OK"]),
        at::ICCID => lines(&["+CCID: 89213011234567890123", "OK"]),
        at::MSISDN => lines(&["+CNUM: \"\",\"+213555123456\",145", "OK"]),
        at::SMS_LIST_ALL => lines(&[
            "+CMGL: 1,\"REC UNREAD\",\"+213555000111\",,\"24/01/15,10:30:00+04\"",
            "Hello",
            "OK",
        ]),
        _ => lines(&["OK"]),
    }
}

/// Builds a transport for a given port path.
pub(crate) type TransportFactory = Box<dyn Fn(&str) -> ScriptedTransport + Send + Sync>;

/// Port provider serving a fixed port list and scripted transports.
pub(crate) struct FakePorts {
    ports: Vec<PortInfo>,
    factory: TransportFactory,
    created: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakePorts {
    pub(crate) fn new(
        ports: Vec<PortInfo>,
        factory: impl Fn(&str) -> ScriptedTransport + Send + Sync + 'static,
    ) -> Self {
        Self {
            ports,
            factory: Box::new(factory),
            created: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Every port answers like a healthy modem.
    pub(crate) fn healthy(ports: Vec<PortInfo>) -> Self {
        Self::new(ports, |_| ScriptedTransport::healthy())
    }

    /// Number of transports created per port.
    pub(crate) fn created(&self) -> Arc<Mutex<HashMap<String, usize>>> {
        Arc::clone(&self.created)
    }
}

impl PortProvider for FakePorts {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self.ports.clone())
    }

    fn transport(&self, port: &str, _baud_rate: u32) -> Box<dyn Transport> {
        if let Ok(mut created) = self.created.lock() {
            *created.entry(port.to_owned()).or_default() += 1;
        }
        Box::new((self.factory)(port))
    }
}

/// A USB port with the given identity.
pub(crate) fn usb_port(name: &str, vid: u16, pid: u16, description: &str) -> PortInfo {
    PortInfo {
        port_name: name.to_owned(),
        vid: Some(vid),
        pid: Some(pid),
        description: Some(description.to_owned()),
    }
}

/// A port without USB identity.
pub(crate) fn plain_port(name: &str) -> PortInfo {
    PortInfo {
        port_name: name.to_owned(),
        vid: None,
        pid: None,
        description: None,
    }
}

/// Installs a test subscriber honouring `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
