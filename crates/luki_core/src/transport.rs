//! Interfaces dos colaboradores externos.
//!
//! O serviço recebe essas dependências por injeção no construtor; o
//! protocolo de publish/subscribe em si (framing, QoS, TLS) fica a cargo do
//! cliente de transporte.

use crate::identity::SerialField;
use std::sync::Arc;

/// Cliente de mensageria (ex.: MQTT). Compartilhado entre o worker e as
/// operações de ciclo de vida, por isso todos os métodos usam `&self`.
pub trait TransportClient: Send + Sync {
    /// Conecta ao broker. Bloqueia até o resultado.
    fn connect(
        &self,
        host: &str,
        port: u16,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> bool;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Publica `payload` em `topic`. `true` se aceito pelo transporte.
    fn publish(&self, topic: &str, payload: &str) -> bool;

    fn set_keep_alive(&self, seconds: u32);
}

/// Fábrica de clientes de transporte.
pub trait NetworkProvider: Send + Sync {
    /// `None` quando a interface de rede não consegue criar o cliente.
    fn create_transport_client(&self, priority: u8) -> Option<Arc<dyn TransportClient>>;
}

/// Informações do dispositivo host.
pub trait DeviceInfoProvider: Send + Sync {
    fn hardware_address(&self) -> String;

    /// Snapshot de status em JSON (vazio = indisponível).
    fn device_status_snapshot(&self) -> String;

    /// Campo persistido com o número de série, se existir.
    fn serial_number_field(&self) -> Option<SerialField> {
        None
    }
}
