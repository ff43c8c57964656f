//! Worker: único consumidor da mailbox.
//!
//! Tenta uma conexão inicial, depois espera mensagens com timeout. Cada
//! mensagem recebida garante conexão e é despachada pelo tipo. O loop
//! termina quando a referência da mailbox deixa de ser válida; o worker
//! então sai sem tocar em nenhum outro estado do serviço.
//!
//! Uma conexão que termina depois da invalidação é desfeita pelo próprio
//! worker: com a mailbox inválida o serviço está suspenso ou parado e o
//! transporte deve ficar desconectado.

use crate::mailbox::{Dequeued, MailboxConsumer};
use crate::publisher::Publisher;
use crate::types::{MessageKind, TelemetryMessage};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Nome da thread do worker.
pub const WORKER_THREAD_NAME: &str = "luki-mqtt";

/// Tudo que o worker precisa; movido para dentro da thread.
pub struct Worker {
    mailbox: MailboxConsumer,
    publisher: Arc<Publisher>,
    queue_timeout: Duration,
}

impl Worker {
    pub fn new(mailbox: MailboxConsumer, publisher: Arc<Publisher>, queue_timeout: Duration) -> Self {
        Self {
            mailbox,
            publisher,
            queue_timeout,
        }
    }

    /// Cria a thread do worker.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || self.run())
    }

    /// Loop principal. Retorna quando a mailbox é invalidada.
    pub fn run(self) {
        info!("Worker MQTT iniciado");

        let initial = self.connect_checked();
        info!(
            "Conexão inicial: {}",
            if initial { "SUCESSO" } else { "FALHA" }
        );

        // A flag é conferida antes de cada espera: logo após um timeout e
        // logo após processar uma mensagem.
        while self.mailbox.is_valid() {
            match self.mailbox.dequeue(self.queue_timeout) {
                Dequeued::Message(msg) => {
                    if !self.mailbox.is_valid() {
                        debug!("Mailbox invalidada, descartando [{}]", msg.label());
                        break;
                    }
                    self.process(&msg);
                }
                Dequeued::Timeout => continue,
                Dequeued::Closed => break,
            }
        }

        info!("Worker MQTT encerrado");
    }

    /// `ensure_connected()` seguido de nova conferência da flag.
    fn connect_checked(&self) -> bool {
        let connected = self.publisher.connection().ensure_connected();
        if self.mailbox.is_valid() {
            return connected;
        }
        if connected {
            warn!("Mailbox invalidada durante a conexão, desconectando");
            self.publisher.connection().disconnect();
        }
        false
    }

    fn process(&self, msg: &TelemetryMessage) {
        debug!("Processando mensagem: {}", msg.label());

        if !self.connect_checked() {
            warn!("Sem conexão, mensagem [{}] perdida", msg.label());
            return;
        }

        let published = match msg.kind() {
            MessageKind::StatusPublish => self.publisher.publish_status_once(),
            MessageKind::DeviceMessage => self
                .publisher
                .publish_device_message(msg.label(), msg.payload()),
        };
        if !published {
            warn!("Falha ao publicar mensagem [{}]", msg.label());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, ConnectionSettings};
    use crate::envelope::EnvelopeBuilder;
    use crate::identity::DeviceIdentity;
    use crate::mailbox::mailbox;
    use crate::testing::{MockDevice, MockTransport, wait_until};
    use crate::transport::TransportClient;

    fn publisher(mock: &Arc<MockTransport>) -> Arc<Publisher> {
        let client: Arc<dyn TransportClient> = mock.clone();
        let connection = Arc::new(ConnectionManager::new(
            Some(client),
            ConnectionSettings {
                endpoint: "10.0.0.5:1883".into(),
                default_port: 1883,
                client_id: "id".into(),
                username: String::new(),
                password: String::new(),
            },
        ));
        let envelopes = EnvelopeBuilder::new(DeviceIdentity {
            mac_address: "AA:BB".into(),
            serial_number: None,
        });
        Arc::new(Publisher::new(
            connection,
            envelopes,
            Arc::new(MockDevice::with_status(r#"{"battery":80}"#)),
            "luki/device",
        ))
    }

    #[test]
    fn dispatches_by_kind_and_exits_on_close() {
        let mock = Arc::new(MockTransport::new());
        let (producer, consumer, closer) = mailbox(5).unwrap();
        let handle = Worker::new(consumer, publisher(&mock), Duration::from_millis(20))
            .spawn()
            .unwrap();

        producer.try_enqueue(TelemetryMessage::status()).unwrap();
        producer
            .try_enqueue(TelemetryMessage::device("button", "pressed"))
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || mock.published().len() == 2));
        let published = mock.published();
        assert!(published[0].1.contains(r#""battery":80"#));
        assert!(published[1].1.contains(r#""message":"pressed""#));

        closer.close();
        assert!(wait_until(Duration::from_secs(2), || handle.is_finished()));
        // Conexão inicial + nenhuma reconexão
        assert_eq!(mock.connect_calls(), 1);
    }

    #[test]
    fn failed_connection_drops_message_and_retries_next_time() {
        let mock = Arc::new(MockTransport::new());
        mock.fail_connects(true);
        let (producer, consumer, closer) = mailbox(5).unwrap();
        let handle = Worker::new(consumer, publisher(&mock), Duration::from_millis(20))
            .spawn()
            .unwrap();

        producer
            .try_enqueue(TelemetryMessage::device("a", "1"))
            .unwrap();
        // Inicial + uma tentativa pela mensagem
        assert!(wait_until(Duration::from_secs(2), || mock.connect_calls() == 2));
        assert!(mock.published().is_empty());

        mock.fail_connects(false);
        producer
            .try_enqueue(TelemetryMessage::device("b", "2"))
            .unwrap();
        assert!(wait_until(Duration::from_secs(2), || mock.published().len() == 1));
        assert!(mock.published()[0].1.contains(r#""type":"b""#));

        closer.close();
        assert!(wait_until(Duration::from_secs(2), || handle.is_finished()));
    }

    #[test]
    fn connect_finishing_after_close_is_undone() {
        let mock = Arc::new(MockTransport::new());
        let gate = mock.hold_connects();
        let (_producer, consumer, closer) = mailbox(5).unwrap();
        let handle = Worker::new(consumer, publisher(&mock), Duration::from_millis(20))
            .spawn()
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || mock.connect_calls() == 1));
        closer.close();
        drop(gate);

        assert!(wait_until(Duration::from_secs(2), || handle.is_finished()));
        assert!(!mock.is_connected());
        assert_eq!(mock.disconnect_calls(), 1);
    }

    #[test]
    fn idle_worker_exits_within_one_timeout() {
        let mock = Arc::new(MockTransport::new());
        let (_producer, consumer, closer) = mailbox(5).unwrap();
        let handle = Worker::new(consumer, publisher(&mock), Duration::from_secs(1))
            .spawn()
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || mock.connect_calls() == 1));
        closer.close();
        // O sentinela acorda o worker antes do timeout de 1s
        assert!(wait_until(Duration::from_millis(500), || handle.is_finished()));
    }
}
