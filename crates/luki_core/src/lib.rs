//! # Luki Core
//!
//! Serviço assíncrono de telemetria: desacopla threads da aplicação que
//! reportam estado/eventos do caminho de rede que entrega ao broker, e
//! gerencia a conexão nas transições sleep/wake do dispositivo.
//!
//! ```text
//! produtor ──try_enqueue──> Mailbox(K) ──> Worker ──> ConnectionManager
//!                                                      │ ensure_connected()
//!                                           EnvelopeBuilder ──> publish()
//! ```
//!
//! ## Módulos
//! - [`types`] – Mensagens da fila e estado do serviço
//! - [`identity`] – Client id por boot e número de série
//! - [`envelope`] – Envelope JSON publicado
//! - [`endpoint`] – Parsing de `host[:port]`
//! - [`transport`] – Traits dos colaboradores externos
//! - [`mailbox`] – Fila bounded produtor → worker
//! - [`connection`] – Conexão sob demanda
//! - [`publisher`] – Publicação síncrona de envelopes
//! - [`worker`] – Loop consumidor
//! - [`service`] – Ciclo de vida start/stop/resume/shutdown
//! - [`config`] – Configuração TOML + overrides por ambiente
//! - [`error`] – Erros tipados

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod mailbox;
pub mod publisher;
pub mod service;
pub mod transport;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports convenientes
pub use config::{AgentConfig, AppConfig, MqttConfig};
pub use error::{EndpointError, EnqueueError, ServiceError};
pub use service::{PublishHandle, TelemetryService};
pub use transport::{DeviceInfoProvider, NetworkProvider, TransportClient};
pub use types::{MessageKind, ServiceState, TelemetryMessage};
