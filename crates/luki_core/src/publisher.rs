//! Publicação síncrona de envelopes no tópico de dispositivo.

use crate::connection::ConnectionManager;
use crate::envelope::EnvelopeBuilder;
use crate::transport::DeviceInfoProvider;
use crate::types::DEVICE_STATUS;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Monta o envelope e entrega ao transporte. Exige conexão já estabelecida.
pub struct Publisher {
    connection: Arc<ConnectionManager>,
    envelopes: EnvelopeBuilder,
    device: Arc<dyn DeviceInfoProvider>,
    topic: String,
}

impl Publisher {
    pub fn new(
        connection: Arc<ConnectionManager>,
        envelopes: EnvelopeBuilder,
        device: Arc<dyn DeviceInfoProvider>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            envelopes,
            device,
            topic: topic.into(),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publica `(kind, data)` envelopado. `false` se desconectado, se a
    /// serialização falhar ou se o transporte recusar.
    pub fn publish_device_message(&self, kind: &str, data: &str) -> bool {
        let Some(client) = self.connection.client().filter(|c| c.is_connected()) else {
            warn!("MQTT desconectado, ignorando mensagem [{kind}]");
            return false;
        };

        let envelope = self.envelopes.serialize(kind, data);
        if envelope.is_empty() {
            return false;
        }

        info!("Publicando mensagem [{kind}] em {}", self.topic);
        debug!("Envelope: {envelope}");
        let published = client.publish(&self.topic, &envelope);
        if !published {
            warn!("Transporte recusou mensagem [{kind}]");
        }
        published
    }

    /// Busca o snapshot de status e publica como `device_status`.
    pub fn publish_status_once(&self) -> bool {
        if !self.connection.is_connected() {
            warn!("MQTT desconectado, ignorando status");
            return false;
        }

        let status = self.device.device_status_snapshot();
        if status.is_empty() {
            warn!("Snapshot de status do dispositivo vazio");
            return false;
        }

        self.publish_device_message(DEVICE_STATUS, &status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::identity::DeviceIdentity;
    use crate::testing::{MockDevice, MockTransport};
    use crate::transport::TransportClient;
    use serde_json::{Value, json};

    fn publisher(mock: &Arc<MockTransport>, device: MockDevice) -> Publisher {
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
            mac_address: device.hardware_address(),
            serial_number: None,
        });
        Publisher::new(connection, envelopes, Arc::new(device), "luki/device")
    }

    #[test]
    fn publishes_envelope_when_connected() {
        let mock = Arc::new(MockTransport::new());
        mock.set_connected(true);
        let p = publisher(&mock, MockDevice::default());

        assert!(p.publish_device_message("device_status", r#"{"battery":80}"#));
        let published = mock.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "luki/device");
        let value: Value = serde_json::from_str(&published[0].1).unwrap();
        assert_eq!(value["message"], json!({"battery": 80}));
    }

    #[test]
    fn skips_when_disconnected() {
        let mock = Arc::new(MockTransport::new());
        let p = publisher(&mock, MockDevice::default());
        assert!(!p.publish_device_message("device_status", "x"));
        assert!(mock.published().is_empty());
    }

    #[test]
    fn transport_refusal_is_reported() {
        let mock = Arc::new(MockTransport::new());
        mock.set_connected(true);
        mock.fail_publishes(true);
        let p = publisher(&mock, MockDevice::default());
        assert!(!p.publish_device_message("device_status", "x"));
    }

    #[test]
    fn status_uses_device_snapshot() {
        let mock = Arc::new(MockTransport::new());
        mock.set_connected(true);
        let p = publisher(&mock, MockDevice::with_status(r#"{"battery":55}"#));

        assert!(p.publish_status_once());
        let value: Value = serde_json::from_str(&mock.published()[0].1).unwrap();
        assert_eq!(value["type"], "device_status");
        assert_eq!(value["message"]["battery"], 55);
    }

    #[test]
    fn empty_snapshot_fails_status() {
        let mock = Arc::new(MockTransport::new());
        mock.set_connected(true);
        let p = publisher(&mock, MockDevice::with_status(""));
        assert!(!p.publish_status_once());
        assert!(mock.published().is_empty());
    }
}
