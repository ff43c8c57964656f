//! Gerência de conexão com o broker.
//!
//! Conecta sob demanda: sem retry interno nem backoff. Uma falha retorna
//! `false` e a próxima mensagem tirada da fila dispara nova tentativa.

use crate::endpoint::Endpoint;
use crate::transport::TransportClient;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Credenciais e identidade usadas no `connect`.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub default_port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint)
            .field("default_port", &self.default_port)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Dono do cliente de transporte.
///
/// Escrito uma única vez no `start()`, antes de o worker existir; depois
/// disso só é lido.
pub struct ConnectionManager {
    client: Option<Arc<dyn TransportClient>>,
    settings: ConnectionSettings,
}

impl ConnectionManager {
    pub fn new(client: Option<Arc<dyn TransportClient>>, settings: ConnectionSettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> Option<&Arc<dyn TransportClient>> {
        self.client.as_ref()
    }

    pub fn client_id(&self) -> &str {
        &self.settings.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    /// Garante a conexão, tentando conectar uma vez se necessário.
    pub fn ensure_connected(&self) -> bool {
        let Some(client) = self.client.as_ref() else {
            error!("Cliente MQTT inexistente");
            return false;
        };

        if self.settings.endpoint.is_empty() {
            error!("Endpoint MQTT vazio");
            return false;
        }

        let endpoint = match Endpoint::parse(&self.settings.endpoint, self.settings.default_port)
        {
            Ok(ep) => ep,
            Err(e) => {
                error!("Endpoint MQTT inválido: {e}");
                return false;
            }
        };
        debug!("Broker: {endpoint}");

        if client.is_connected() {
            return true;
        }

        info!(
            "Conectando ao MQTT {endpoint}, client_id={}",
            self.settings.client_id
        );

        let started = Instant::now();
        let connected = client.connect(
            &endpoint.host,
            endpoint.port,
            &self.settings.client_id,
            &self.settings.username,
            &self.settings.password,
        );
        info!(
            "MQTT connect() levou {} ms, resultado={connected}",
            started.elapsed().as_millis()
        );

        if !connected {
            error!(
                "Falha ao conectar MQTT – broker={endpoint}, client_id={}",
                self.settings.client_id
            );
            return false;
        }

        // Anomalia registrada, mas o resultado reportado prevalece
        if !client.is_connected() {
            error!("MQTT connect() retornou true mas is_connected() é false");
        } else {
            info!("MQTT conectado a {endpoint}");
        }
        true
    }

    /// Desconecta se conectado. Retorna se havia conexão.
    pub fn disconnect(&self) -> bool {
        match self.client.as_ref() {
            Some(client) if client.is_connected() => {
                client.disconnect();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn settings(endpoint: &str) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: endpoint.into(),
            default_port: 1883,
            client_id: "luki_l1AABB_1000".into(),
            username: "user".into(),
            password: "secret".into(),
        }
    }

    fn manager(mock: &Arc<MockTransport>, endpoint: &str) -> ConnectionManager {
        let client: Arc<dyn TransportClient> = mock.clone();
        ConnectionManager::new(Some(client), settings(endpoint))
    }

    #[test]
    fn fails_fast_without_client() {
        let cm = ConnectionManager::new(None, settings("10.0.0.5:1883"));
        assert!(!cm.ensure_connected());
        assert!(!cm.is_connected());
    }

    #[test]
    fn fails_fast_with_empty_endpoint() {
        let mock = Arc::new(MockTransport::new());
        let cm = manager(&mock, "");
        assert!(!cm.ensure_connected());
        assert_eq!(mock.connect_calls(), 0);
    }

    #[test]
    fn connects_with_parsed_endpoint_and_credentials() {
        let mock = Arc::new(MockTransport::new());
        let cm = manager(&mock, "10.0.0.5");
        assert!(cm.ensure_connected());

        let attempts = mock.connect_attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].host, "10.0.0.5");
        assert_eq!(attempts[0].port, 1883);
        assert_eq!(attempts[0].client_id, "luki_l1AABB_1000");
        assert_eq!(attempts[0].username, "user");
        assert_eq!(attempts[0].password, "secret");
    }

    #[test]
    fn already_connected_skips_connect() {
        let mock = Arc::new(MockTransport::new());
        mock.set_connected(true);
        let cm = manager(&mock, "10.0.0.5:1883");
        assert!(cm.ensure_connected());
        assert_eq!(mock.connect_calls(), 0);
    }

    #[test]
    fn failed_connect_returns_false_without_retry() {
        let mock = Arc::new(MockTransport::new());
        mock.fail_connects(true);
        let cm = manager(&mock, "10.0.0.5:1883");
        assert!(!cm.ensure_connected());
        assert_eq!(mock.connect_calls(), 1);

        // Nova tentativa só na próxima chamada
        mock.fail_connects(false);
        assert!(cm.ensure_connected());
        assert_eq!(mock.connect_calls(), 2);
    }

    #[test]
    fn state_mismatch_is_not_fatal() {
        let mock = Arc::new(MockTransport::new());
        mock.report_connected_after_connect(false);
        let cm = manager(&mock, "10.0.0.5:1883");
        assert!(cm.ensure_connected());
    }

    #[test]
    fn invalid_port_fails_without_connect() {
        let mock = Arc::new(MockTransport::new());
        let cm = manager(&mock, "10.0.0.5:abc");
        assert!(!cm.ensure_connected());
        assert_eq!(mock.connect_calls(), 0);
    }

    #[test]
    fn disconnect_only_when_connected() {
        let mock = Arc::new(MockTransport::new());
        let cm = manager(&mock, "10.0.0.5:1883");
        assert!(!cm.disconnect());
        assert!(cm.ensure_connected());
        assert!(cm.disconnect());
        assert_eq!(mock.disconnect_calls(), 1);
        assert!(!cm.is_connected());
    }
}
