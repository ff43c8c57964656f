//! Erros do serviço de telemetria.
//!
//! Nenhum erro atravessa a fronteira produtor/worker como pânico: o caminho
//! de publicação retorna `bool`, o ciclo de vida retorna [`ServiceError`] e
//! os produtores recebem [`EnqueueError`].

use crate::types::ServiceState;

/// Falha ao interpretar o endpoint `host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Endpoint vazio")]
    Empty,

    #[error("Host vazio no endpoint '{0}'")]
    EmptyHost(String),

    #[error("Porta inválida no endpoint '{endpoint}': '{port}'")]
    InvalidPort { endpoint: String, port: String },
}

/// Erros das operações de ciclo de vida (start/stop/resume/shutdown).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Endpoint não configurado: `start()` é inerte.
    #[error("Endpoint MQTT não configurado, serviço não iniciado")]
    NotConfigured,

    #[error("Falha ao criar cliente de transporte")]
    TransportUnavailable,

    /// Falha ao criar mailbox ou worker.
    #[error("Falha ao alocar recurso: {0}")]
    Resource(String),

    /// Um worker abandonado no último stop ainda não terminou.
    #[error("Worker MQTT anterior ainda em execução")]
    WorkerStillRunning,

    #[error("Transição inválida: {operation}() com serviço {state}")]
    InvalidTransition {
        operation: &'static str,
        state: ServiceState,
    },
}

impl ServiceError {
    pub(crate) fn transition(operation: &'static str, state: ServiceState) -> Self {
        ServiceError::InvalidTransition { operation, state }
    }
}

/// Falha ao enfileirar uma mensagem. O produtor nunca bloqueia.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// Mailbox cheia: a mensagem foi descartada.
    #[error("Fila de publicação cheia ({capacity} mensagens), mensagem '{label}' descartada")]
    Full { label: String, capacity: usize },

    /// Serviço parado ou suspenso: não há mailbox.
    #[error("Fila de publicação indisponível")]
    Unavailable,

    #[error("Falha ao serializar mensagem: {0}")]
    Serialization(String),
}
