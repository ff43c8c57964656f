//! Transporte MQTT sobre o cliente síncrono do `rumqttc`.
//!
//! Cada `connect()` abre uma sessão nova: um `Client` e uma thread que
//! dirige o event loop. A thread marca a sessão como conectada no CONNACK e
//! termina no primeiro erro, sem reconexão automática; quem reconecta é o
//! serviço, sob demanda.

use crossbeam_channel::bounded;
use luki_core::{NetworkProvider, TransportClient};
use rumqttc::{Client, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capacidade da fila de requests do `rumqttc`.
const REQUEST_CAPACITY: usize = 16;

/// Espera padrão pelo CONNACK.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct Session {
    client: Client,
    connected: Arc<AtomicBool>,
}

/// Cliente MQTT usado pelo serviço.
pub struct MqttTransport {
    keep_alive: AtomicU32,
    connect_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl MqttTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            keep_alive: AtomicU32::new(60),
            connect_timeout,
            session: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Instala a sessão nova. Outro connect concorrente pode ter instalado
    /// uma antes; ela é encerrada.
    fn install(&self, session: Session) {
        let previous = self.lock().replace(session);
        if let Some(previous) = previous {
            warn!("Sessão MQTT anterior substituída, encerrando");
            close(previous);
        }
    }

    /// Encerra a sessão atual, se existir.
    fn close_session(&self) {
        let session = self.lock().take();
        if let Some(session) = session {
            close(session);
        }
    }
}

fn close(session: Session) {
    session.connected.store(false, Ordering::Release);
    if let Err(e) = session.client.try_disconnect() {
        debug!("Disconnect MQTT não enviado: {e}");
    }
}

impl TransportClient for MqttTransport {
    fn connect(
        &self,
        host: &str,
        port: u16,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> bool {
        self.close_session();

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(u64::from(
            self.keep_alive.load(Ordering::Relaxed),
        )));
        if !username.is_empty() {
            options.set_credentials(username, password);
        }

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let (ack_tx, ack_rx) = bounded::<bool>(1);

        let flag = Arc::clone(&connected);
        let spawned = thread::Builder::new()
            .name("mqtt-eventloop".into())
            .spawn(move || {
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            let accepted = ack.code == ConnectReturnCode::Success;
                            flag.store(accepted, Ordering::Release);
                            let _ = ack_tx.try_send(accepted);
                            if !accepted {
                                warn!("Broker recusou conexão: {:?}", ack.code);
                                break;
                            }
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            info!("Broker encerrou a sessão MQTT");
                            flag.store(false, Ordering::Release);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!("Event loop MQTT encerrado: {e}");
                            flag.store(false, Ordering::Release);
                            let _ = ack_tx.try_send(false);
                            break;
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Falha ao criar thread do event loop MQTT: {e}");
            return false;
        }

        match ack_rx.recv_timeout(self.connect_timeout) {
            Ok(true) => {
                self.install(Session { client, connected });
                true
            }
            Ok(false) => false,
            Err(_) => {
                warn!(
                    "Sem CONNACK em {} ms",
                    self.connect_timeout.as_millis()
                );
                let _ = client.try_disconnect();
                false
            }
        }
    }

    fn disconnect(&self) {
        self.close_session();
    }

    fn is_connected(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|s| s.connected.load(Ordering::Acquire))
    }

    fn publish(&self, topic: &str, payload: &str) -> bool {
        let guard = self.lock();
        let Some(session) = guard.as_ref() else {
            return false;
        };
        match session
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Publish MQTT falhou em {topic}: {e}");
                false
            }
        }
    }

    fn set_keep_alive(&self, seconds: u32) {
        self.keep_alive.store(seconds, Ordering::Relaxed);
    }
}

/// Provedor de rede que entrega clientes [`MqttTransport`].
pub struct MqttNetwork {
    connect_timeout: Duration,
}

impl Default for MqttNetwork {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl NetworkProvider for MqttNetwork {
    fn create_transport_client(&self, priority: u8) -> Option<Arc<dyn TransportClient>> {
        debug!("Criando cliente MQTT (prioridade {priority})");
        Some(Arc::new(MqttTransport::new(self.connect_timeout)))
    }
}
