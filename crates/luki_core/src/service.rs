//! Controlador de ciclo de vida do serviço de telemetria.
//!
//! `start()` cria o cliente de transporte, a mailbox e o worker. `stop()`
//! (entrada em sleep) derruba mailbox e worker, anuncia offline e
//! desconecta. `resume()` recria mailbox e worker, reconecta e anuncia
//! online. `shutdown()` volta a `Stopped` e solta o cliente.
//!
//! As operações de ciclo de vida exigem `&mut self`: o compilador garante
//! que nunca rodem em paralelo. Produtores em outras threads usam um
//! [`PublishHandle`], que só enfileira e nunca bloqueia.

use crate::config::MqttConfig;
use crate::connection::{ConnectionManager, ConnectionSettings};
use crate::envelope::EnvelopeBuilder;
use crate::error::{EnqueueError, ServiceError};
use crate::identity::{self, Clock, DeviceIdentity, SystemClock};
use crate::mailbox::{MailboxCloser, MailboxConsumer, MailboxProducer, mailbox};
use crate::publisher::Publisher;
use crate::transport::{DeviceInfoProvider, NetworkProvider};
use crate::types::{DEVICE_AWAKE, DEVICE_SLEEPING, DEVICE_STATUS, ServiceState, TelemetryMessage};
use crate::worker::Worker;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Intervalo de polling enquanto espera o worker sair.
const JOIN_POLL: Duration = Duration::from_millis(10);

// ──────────────────────────────────────────────
// Estado compartilhado com produtores
// ──────────────────────────────────────────────

/// Slot da mailbox: `None` é o sentinela "inválido".
#[derive(Default)]
struct Shared {
    mailbox: RwLock<Option<MailboxProducer>>,
    dropped: AtomicU64,
}

impl Shared {
    fn enqueue(&self, msg: TelemetryMessage) -> Result<(), EnqueueError> {
        let slot = self.mailbox.read().unwrap_or_else(PoisonError::into_inner);
        let Some(producer) = slot.as_ref() else {
            warn!("Fila de publicação indisponível, [{}] ignorada", msg.label());
            return Err(EnqueueError::Unavailable);
        };

        producer.try_enqueue(msg).inspect_err(|e| {
            if matches!(e, EnqueueError::Full { .. }) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            warn!("{e}");
        })
    }

    fn install(&self, producer: MailboxProducer) {
        *self.mailbox.write().unwrap_or_else(PoisonError::into_inner) = Some(producer);
    }

    fn invalidate(&self) -> Option<MailboxProducer> {
        self.mailbox
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn pending(&self) -> usize {
        self.mailbox
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, MailboxProducer::len)
    }
}

/// API de produtor: enfileiramento não bloqueante, clonável entre threads.
#[derive(Clone)]
pub struct PublishHandle {
    shared: Arc<Shared>,
}

impl PublishHandle {
    /// Pede ao worker um reporte de status.
    pub fn publish_status_async(&self) -> Result<(), EnqueueError> {
        self.shared.enqueue(TelemetryMessage::status())
    }

    /// Enfileira `(kind, message)`; `message` vai como está para o envelope.
    pub fn publish_device_message_async(&self, kind: &str, message: &str) -> Result<(), EnqueueError> {
        self.shared.enqueue(TelemetryMessage::device(kind, message))
    }

    /// Serializa `value` e enfileira como mensagem de dispositivo.
    pub fn publish_device_json_async(&self, kind: &str, value: &Value) -> Result<(), EnqueueError> {
        let payload = serde_json::to_string(value).map_err(|e| {
            error!("Falha ao serializar mensagem [{kind}]: {e}");
            EnqueueError::Serialization(e.to_string())
        })?;
        self.shared.enqueue(TelemetryMessage::device(kind, &payload))
    }

    /// Mensagens aguardando o worker.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    /// Mensagens descartadas por fila cheia.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

// ──────────────────────────────────────────────
// Serviço
// ──────────────────────────────────────────────

struct WorkerSlot {
    handle: JoinHandle<()>,
    closer: MailboxCloser,
}

/// Serviço de telemetria com ciclo de vida sleep/wake.
pub struct TelemetryService {
    config: MqttConfig,
    network: Arc<dyn NetworkProvider>,
    device: Arc<dyn DeviceInfoProvider>,
    clock: Arc<dyn Clock>,
    boot_epoch: u64,
    state: ServiceState,
    shared: Arc<Shared>,
    publisher: Option<Arc<Publisher>>,
    worker: Option<WorkerSlot>,
    /// Worker que não saiu dentro de `stop_timeout`.
    lingering: Option<JoinHandle<()>>,
}

impl TelemetryService {
    pub fn new(
        config: MqttConfig,
        network: Arc<dyn NetworkProvider>,
        device: Arc<dyn DeviceInfoProvider>,
    ) -> Self {
        Self::with_clock(config, network, device, Arc::new(SystemClock))
    }

    /// Como [`new`](Self::new), com relógio explícito. O epoch de boot usado
    /// no client id é lido aqui, uma única vez.
    pub fn with_clock(
        config: MqttConfig,
        network: Arc<dyn NetworkProvider>,
        device: Arc<dyn DeviceInfoProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let boot_epoch = clock.epoch_secs();
        Self {
            config,
            network,
            device,
            clock,
            boot_epoch,
            state: ServiceState::Stopped,
            shared: Arc::new(Shared::default()),
            publisher: None,
            worker: None,
            lingering: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    pub fn handle(&self) -> PublishHandle {
        PublishHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Client id da sessão atual (existe a partir do `start()`).
    pub fn client_id(&self) -> Option<&str> {
        self.publisher.as_ref().map(|p| p.connection().client_id())
    }

    pub fn is_connected(&self) -> bool {
        self.publisher
            .as_ref()
            .is_some_and(|p| p.connection().is_connected())
    }

    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    // ── Produtores ──

    pub fn publish_status_async(&self) -> Result<(), EnqueueError> {
        self.handle().publish_status_async()
    }

    pub fn publish_device_message_async(&self, kind: &str, message: &str) -> Result<(), EnqueueError> {
        self.handle().publish_device_message_async(kind, message)
    }

    pub fn publish_device_json_async(&self, kind: &str, value: &Value) -> Result<(), EnqueueError> {
        self.handle().publish_device_json_async(kind, value)
    }

    // ── Publicação síncrona ──

    /// Garante conexão e publica `(kind, data)` na thread do chamador.
    pub fn publish_device_message(&self, kind: &str, data: &str) -> bool {
        let Some(publisher) = self.publisher.as_ref() else {
            warn!("Serviço MQTT não iniciado, ignorando [{kind}]");
            return false;
        };
        if !publisher.connection().ensure_connected() {
            return false;
        }
        publisher.publish_device_message(kind, data)
    }

    /// Garante conexão e publica o snapshot de status.
    pub fn publish_status_once(&self) -> bool {
        let Some(publisher) = self.publisher.as_ref() else {
            warn!("Serviço MQTT não iniciado, ignorando status");
            return false;
        };
        if !publisher.connection().ensure_connected() {
            return false;
        }
        publisher.publish_status_once()
    }

    // ── Ciclo de vida ──

    /// `Stopped → Running`.
    ///
    /// Endpoint vazio torna o `start()` inerte ([`ServiceError::NotConfigured`]).
    /// Chamar com o serviço já iniciado é violação de pré-condição e retorna
    /// [`ServiceError::InvalidTransition`]. Qualquer falha deixa o serviço em
    /// `Stopped`, sem recursos pendurados; `start()` pode ser repetido.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Stopped {
            warn!("start() ignorado: serviço {}", self.state);
            return Err(ServiceError::transition("start", self.state));
        }

        if self.config.endpoint.trim().is_empty() {
            warn!("Endpoint MQTT vazio, serviço não iniciado");
            return Err(ServiceError::NotConfigured);
        }
        if !self.reap_lingering() {
            return Err(ServiceError::WorkerStillRunning);
        }

        let hardware_address = self.device.hardware_address();
        let client_id = identity::client_id(
            &self.config.client_id_prefix,
            &hardware_address,
            self.boot_epoch,
        );

        if self.config.hide_credentials {
            info!(
                "Config MQTT: endpoint={}, client_id={client_id}",
                self.config.endpoint
            );
        } else {
            info!(
                "Config MQTT: endpoint={}, client_id={client_id}, username={}",
                self.config.endpoint, self.config.username
            );
        }

        let Some(client) = self
            .network
            .create_transport_client(self.config.transport_priority)
        else {
            error!("Falha ao criar cliente MQTT");
            return Err(ServiceError::TransportUnavailable);
        };
        client.set_keep_alive(self.config.keepalive_secs);

        let identity = DeviceIdentity {
            mac_address: hardware_address,
            serial_number: identity::serial_number(self.device.serial_number_field().as_ref()),
        };
        let connection = Arc::new(ConnectionManager::new(
            Some(client),
            ConnectionSettings {
                endpoint: self.config.endpoint.clone(),
                default_port: self.config.default_port,
                client_id,
                username: self.config.username.clone(),
                password: self.config.password.clone(),
            },
        ));
        let publisher = Arc::new(Publisher::new(
            connection,
            EnvelopeBuilder::with_clock(identity, Arc::clone(&self.clock)),
            Arc::clone(&self.device),
            self.config.device_topic.clone(),
        ));

        // Tudo que o worker lê foi escrito acima, antes de ele existir
        let (producer, consumer, closer) = self.open_mailbox()?;
        let handle = self.spawn_worker(consumer, &publisher)?;
        self.shared.install(producer);
        self.worker = Some(WorkerSlot { handle, closer });
        self.publisher = Some(publisher);
        self.state = ServiceState::Running;

        info!("Serviço MQTT iniciado");
        Ok(())
    }

    /// `Running → Suspended` (entrada em sleep).
    ///
    /// O worker é derrubado antes do anúncio offline, e não depois: assim
    /// nenhuma reconexão do worker acontece depois do `disconnect()`. A
    /// sequência vista pelo transporte continua sendo um publish
    /// `device_sleeping` seguido do disconnect.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Running {
            warn!("stop() ignorado: serviço {}", self.state);
            return Err(ServiceError::transition("stop", self.state));
        }

        info!("Parando serviço MQTT para modo sleep...");
        self.teardown_worker();
        self.announce_offline();
        self.state = ServiceState::Suspended;
        Ok(())
    }

    /// `Suspended → Running` (saída do sleep).
    ///
    /// Falha de reconexão não impede a retomada: o worker tenta de novo na
    /// próxima mensagem.
    pub fn resume(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Suspended {
            warn!("resume() ignorado: serviço {}", self.state);
            return Err(ServiceError::transition("resume", self.state));
        }
        if !self.reap_lingering() {
            return Err(ServiceError::WorkerStillRunning);
        }
        let Some(publisher) = self.publisher.clone() else {
            error!("Cliente MQTT ausente no resume");
            return Err(ServiceError::TransportUnavailable);
        };

        info!("Retomando serviço MQTT do modo sleep...");

        // Produtores podem enfileirar enquanto a reconexão acontece
        let pending_worker = if self.worker.is_none() {
            let (producer, consumer, closer) = self.open_mailbox()?;
            self.shared.install(producer);
            Some((consumer, closer))
        } else {
            None
        };

        if publisher.connection().ensure_connected() {
            info!("MQTT reconectado após sleep");
            if !publisher.publish_device_message(DEVICE_STATUS, DEVICE_AWAKE) {
                warn!("Falha ao publicar status online");
            }
        } else {
            warn!("Falha ao reconectar MQTT após sleep");
        }

        if let Some((consumer, closer)) = pending_worker {
            match self.spawn_worker(consumer, &publisher) {
                Ok(handle) => self.worker = Some(WorkerSlot { handle, closer }),
                Err(e) => {
                    closer.close();
                    drop(self.shared.invalidate());
                    publisher.connection().disconnect();
                    return Err(e);
                }
            }
        }

        self.state = ServiceState::Running;
        Ok(())
    }

    /// `Running | Suspended → Stopped`. Solta o cliente de transporte.
    pub fn shutdown(&mut self) -> Result<(), ServiceError> {
        match self.state {
            ServiceState::Stopped => {
                return Err(ServiceError::transition("shutdown", self.state));
            }
            ServiceState::Running => {
                self.teardown_worker();
                self.announce_offline();
            }
            ServiceState::Suspended => {
                // O handle fica guardado e o próximo start() espera por ele
                self.reap_lingering();
                // Desconectado no stop(); pode ter sobrado conexão de
                // publicação síncrona
                if let Some(publisher) = self.publisher.as_ref() {
                    publisher.connection().disconnect();
                }
            }
        }

        self.publisher = None;
        self.state = ServiceState::Stopped;
        info!("Serviço MQTT finalizado");
        Ok(())
    }

    // ── Internos ──

    fn open_mailbox(&self) -> Result<(MailboxProducer, MailboxConsumer, MailboxCloser), ServiceError> {
        mailbox(self.config.mailbox_capacity).ok_or_else(|| {
            error!(
                "Falha ao criar fila de publicação (capacidade {})",
                self.config.mailbox_capacity
            );
            ServiceError::Resource("fila de publicação com capacidade 0".into())
        })
    }

    fn spawn_worker(
        &self,
        consumer: MailboxConsumer,
        publisher: &Arc<Publisher>,
    ) -> Result<JoinHandle<()>, ServiceError> {
        Worker::new(consumer, Arc::clone(publisher), self.config.queue_timeout())
            .spawn()
            .map_err(|e| {
                error!("Falha ao criar thread MQTT: {e}");
                ServiceError::Resource(e.to_string())
            })
    }

    /// Derruba mailbox e worker.
    ///
    /// Ordem: invalida a referência (flag + slot dos produtores), espera o
    /// worker sair com prazo, e só então destrói a fila.
    fn teardown_worker(&mut self) {
        let Some(WorkerSlot { handle, closer }) = self.worker.take() else {
            return;
        };

        closer.close();
        let producer = self.shared.invalidate();

        if wait_finished(&handle, self.config.stop_timeout()) {
            join_worker(handle);
        } else {
            // Sem kill seguro para threads: a thread segue sozinha e desfaz
            // qualquer conexão que complete depois da invalidação.
            error!(
                "Worker MQTT não encerrou em {} ms, abandonando thread",
                self.config.stop_timeout_ms
            );
            self.lingering = Some(handle);
        }

        if let Some(producer) = producer {
            let lost = producer.len();
            if lost > 0 {
                warn!("{lost} mensagens pendentes descartadas");
            }
        }
        drop(closer);
    }

    /// Espera um worker abandonado terminar, até `stop_timeout`. Retorna
    /// `false` se ele continua vivo; o handle fica guardado.
    fn reap_lingering(&mut self) -> bool {
        let Some(handle) = self.lingering.take() else {
            return true;
        };
        if wait_finished(&handle, self.config.stop_timeout()) {
            join_worker(handle);
            info!("Worker MQTT abandonado terminou");
            return true;
        }
        error!("Worker MQTT abandonado ainda em execução");
        self.lingering = Some(handle);
        false
    }

    /// Anuncia offline (best-effort) e desconecta.
    fn announce_offline(&self) {
        let Some(publisher) = self.publisher.as_ref() else {
            return;
        };
        if !publisher.connection().is_connected() {
            return;
        }

        info!("Publicando status offline antes do sleep");
        if !publisher.publish_device_message(DEVICE_STATUS, DEVICE_SLEEPING) {
            warn!("Falha ao publicar status offline");
        }
        let grace = self.config.offline_grace();
        if !grace.is_zero() {
            thread::sleep(grace);
        }

        publisher.connection().disconnect();
        info!("Conexão MQTT encerrada para sleep");
    }
}

fn wait_finished(handle: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(JOIN_POLL);
    }
    handle.is_finished()
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Worker MQTT terminou com pânico");
    } else {
        debug!("Worker MQTT encerrado");
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        if self.state != ServiceState::Stopped {
            let _ = self.shutdown();
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
