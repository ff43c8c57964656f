//! Mailbox bounded entre produtores e o worker.
//!
//! Capacidade fixa K. O produtor nunca bloqueia: com a fila cheia a mensagem
//! é descartada. O worker espera no máximo `timeout` por mensagem, o que
//! garante que ele retoma o controle periodicamente mesmo sem tráfego.
//!
//! Encerramento usa um canal de controle separado (1 slot) com o sentinela
//! [`Control::Shutdown`], então o pedido de parada não depende de espaço na
//! fila. Antes dele, a flag de validade é zerada; o worker confere a flag
//! toda vez que acorda.

use crate::error::EnqueueError;
use crate::types::TelemetryMessage;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Sentinela enviado pelo canal de controle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Shutdown,
}

/// Resultado de uma espera do worker.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    Message(TelemetryMessage),
    Timeout,
    /// Sentinela recebido ou lado produtor destruído.
    Closed,
}

/// Cria uma mailbox com capacidade `capacity`.
///
/// Retorna `None` para capacidade zero (canal de rendezvous não serve como
/// fila não bloqueante).
pub fn mailbox(capacity: usize) -> Option<(MailboxProducer, MailboxConsumer, MailboxCloser)> {
    if capacity == 0 {
        return None;
    }
    let (tx, rx) = bounded::<TelemetryMessage>(capacity);
    let (ctrl_tx, ctrl_rx) = bounded::<Control>(1);
    let valid = Arc::new(AtomicBool::new(true));

    Some((
        MailboxProducer { tx, capacity },
        MailboxConsumer {
            rx,
            ctrl: ctrl_rx,
            valid: Arc::clone(&valid),
        },
        MailboxCloser { ctrl: ctrl_tx, valid },
    ))
}

// ──────────────────────────────────────────────
// Lado produtor
// ──────────────────────────────────────────────

/// Lado produtor: enfileiramento não bloqueante.
#[derive(Debug, Clone)]
pub struct MailboxProducer {
    tx: Sender<TelemetryMessage>,
    capacity: usize,
}

impl MailboxProducer {
    pub fn try_enqueue(&self, msg: TelemetryMessage) -> Result<(), EnqueueError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(msg) => EnqueueError::Full {
                label: msg.label().to_string(),
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => EnqueueError::Unavailable,
        })
    }

    /// Mensagens pendentes.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ──────────────────────────────────────────────
// Lado consumidor (worker)
// ──────────────────────────────────────────────

/// Lado consumidor, pertence exclusivamente ao worker.
#[derive(Debug)]
pub struct MailboxConsumer {
    rx: Receiver<TelemetryMessage>,
    ctrl: Receiver<Control>,
    valid: Arc<AtomicBool>,
}

impl MailboxConsumer {
    /// A referência da mailbox ainda é válida?
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Espera até `timeout` por uma mensagem ou pelo sentinela.
    pub fn dequeue(&self, timeout: Duration) -> Dequeued {
        crossbeam_channel::select! {
            recv(self.rx) -> msg => match msg {
                Ok(msg) => Dequeued::Message(msg),
                Err(_) => Dequeued::Closed,
            },
            recv(self.ctrl) -> _ => Dequeued::Closed,
            default(timeout) => Dequeued::Timeout,
        }
    }
}

// ──────────────────────────────────────────────
// Encerramento
// ──────────────────────────────────────────────

/// Handle de encerramento mantido pelo controlador de ciclo de vida.
#[derive(Debug)]
pub struct MailboxCloser {
    ctrl: Sender<Control>,
    valid: Arc<AtomicBool>,
}

impl MailboxCloser {
    /// Invalida a referência e acorda o worker.
    ///
    /// A flag é escrita antes do sentinela: quando o worker acorda, já vê a
    /// mailbox como inválida.
    pub fn close(&self) {
        self.valid.store(false, Ordering::Release);
        let _ = self.ctrl.try_send(Control::Shutdown);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}
