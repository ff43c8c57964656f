//! Colaboradores roteirizados para os testes.

use crate::identity::{Clock, SerialField};
use crate::transport::{DeviceInfoProvider, NetworkProvider, TransportClient};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Espera `cond` ficar verdadeira até `timeout`.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn epoch_secs(&self) -> u64 {
        self.0
    }
}

// ──────────────────────────────────────────────
// Transporte
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect,
    Publish(String),
    Disconnect,
}

struct MockState {
    connected: bool,
    connect_ok: bool,
    connected_after_connect: bool,
    publish_ok: bool,
    keep_alive: Option<u32>,
    attempts: Vec<ConnectAttempt>,
    published: Vec<(String, String)>,
    disconnects: usize,
    events: Vec<TransportEvent>,
    gate: Option<Receiver<()>>,
}

/// Transporte que registra todas as chamadas.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                connected: false,
                connect_ok: true,
                connected_after_connect: true,
                publish_ok: true,
                keep_alive: None,
                attempts: Vec::new(),
                published: Vec::new(),
                disconnects: 0,
                events: Vec::new(),
                gate: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn fail_connects(&self, fail: bool) {
        self.lock().connect_ok = !fail;
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.lock().publish_ok = !fail;
    }

    /// Estado que `is_connected()` reporta após um connect bem-sucedido.
    pub fn report_connected_after_connect(&self, connected: bool) {
        self.lock().connected_after_connect = connected;
    }

    /// Faz `connect()` bloquear até o `Sender` retornado ser solto.
    pub fn hold_connects(&self) -> Sender<()> {
        let (tx, rx) = bounded(0);
        self.lock().gate = Some(rx);
        tx
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn connect_attempts(&self) -> Vec<ConnectAttempt> {
        self.lock().attempts.clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.lock().published.clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.lock().disconnects
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.lock().events.clone()
    }

    pub fn keep_alive(&self) -> Option<u32> {
        self.lock().keep_alive
    }
}

impl TransportClient for MockTransport {
    fn connect(
        &self,
        host: &str,
        port: u16,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> bool {
        let gate = {
            let mut state = self.lock();
            state.attempts.push(ConnectAttempt {
                host: host.into(),
                port,
                client_id: client_id.into(),
                username: username.into(),
                password: password.into(),
            });
            state.events.push(TransportEvent::Connect);
            state.gate.clone()
        };
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        let mut state = self.lock();
        let ok = state.connect_ok;
        state.connected = ok && state.connected_after_connect;
        ok
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.disconnects += 1;
        state.events.push(TransportEvent::Disconnect);
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn publish(&self, topic: &str, payload: &str) -> bool {
        let mut state = self.lock();
        state.events.push(TransportEvent::Publish(payload.into()));
        if state.publish_ok {
            state.published.push((topic.into(), payload.into()));
        }
        state.publish_ok
    }

    fn set_keep_alive(&self, seconds: u32) {
        self.lock().keep_alive = Some(seconds);
    }
}

// ──────────────────────────────────────────────
// Rede e dispositivo
// ──────────────────────────────────────────────

pub struct MockNetwork {
    client: Option<Arc<MockTransport>>,
    created: Mutex<Vec<u8>>,
}

impl MockNetwork {
    pub fn new(client: Arc<MockTransport>) -> Self {
        Self {
            client: Some(client),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Rede que não consegue criar clientes.
    pub fn broken() -> Self {
        Self {
            client: None,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Prioridades pedidas em cada criação.
    pub fn created(&self) -> Vec<u8> {
        self.created.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl NetworkProvider for MockNetwork {
    fn create_transport_client(&self, priority: u8) -> Option<Arc<dyn TransportClient>> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(priority);
        let client = self.client.clone()?;
        Some(client as Arc<dyn TransportClient>)
    }
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub hardware_address: String,
    pub status: String,
    pub serial: Option<SerialField>,
}

impl MockDevice {
    pub fn with_status(status: &str) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            hardware_address: "AA:BB:CC:DD:EE:FF".into(),
            status: r#"{"battery":80}"#.into(),
            serial: None,
        }
    }
}

impl DeviceInfoProvider for MockDevice {
    fn hardware_address(&self) -> String {
        self.hardware_address.clone()
    }

    fn device_status_snapshot(&self) -> String {
        self.status.clone()
    }

    fn serial_number_field(&self) -> Option<SerialField> {
        self.serial
    }
}
