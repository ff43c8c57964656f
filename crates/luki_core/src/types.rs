//! Tipos compartilhados entre produtores, mailbox e worker.
//!
//! As mensagens da fila têm tamanho máximo fixo para label e payload.
//! Conteúdo acima do limite é truncado, nunca cresce dinamicamente.

use std::fmt;

/// Tamanho máximo do label (tipo da mensagem), em bytes.
pub const MAX_LABEL_LEN: usize = 32;

/// Tamanho máximo do payload de uma mensagem, em bytes.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Tipo de mensagem usado no envelope de status.
pub const DEVICE_STATUS: &str = "device_status";

/// Mensagem publicada antes de entrar em modo sleep.
pub const DEVICE_SLEEPING: &str = "DEVICE_SLEEPING";

/// Mensagem publicada ao acordar.
pub const DEVICE_AWAKE: &str = "DEVICE_AWAKE";

// ──────────────────────────────────────────────
// Mensagens da fila
// ──────────────────────────────────────────────

/// Tipo de trabalho enfileirado para o worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Busca o snapshot de status do dispositivo e publica.
    StatusPublish,
    /// Publica `(label, payload)` diretamente.
    DeviceMessage,
}

/// Mensagem transportada pela mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryMessage {
    kind: MessageKind,
    label: String,
    payload: String,
}

impl TelemetryMessage {
    /// Cria uma mensagem, truncando label e payload nos limites fixos.
    pub fn new(kind: MessageKind, label: &str, payload: &str) -> Self {
        Self {
            kind,
            label: truncate_str(label, MAX_LABEL_LEN).to_owned(),
            payload: truncate_str(payload, MAX_PAYLOAD_LEN).to_owned(),
        }
    }

    /// Pedido de publicação de status (payload vazio).
    pub fn status() -> Self {
        Self::new(MessageKind::StatusPublish, DEVICE_STATUS, "")
    }

    /// Mensagem de dispositivo com tipo e conteúdo.
    pub fn device(label: &str, payload: &str) -> Self {
        Self::new(MessageKind::DeviceMessage, label, payload)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Corta `s` em no máximo `max` bytes sem quebrar um caractere UTF-8.
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ──────────────────────────────────────────────
// Estado do serviço
// ──────────────────────────────────────────────

/// Estado do ciclo de vida do serviço.
///
/// ```text
/// Stopped ──start()──> Running ──stop()──> Suspended
///    ^                    ^                    │
///    │                    └─────resume()───────┘
///    └──────────shutdown() (Running | Suspended)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Stopped,
    Running,
    Suspended,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Suspended => "suspended",
        };
        f.write_str(name)
    }
}
