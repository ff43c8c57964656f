//! Envelope JSON publicado no tópico de dispositivo.
//!
//! Formato:
//!
//! ```text
//! {
//!   "mac_address":    string,
//!   "serial_number"?: string,          // omitido se ausente
//!   "timestamp":      integer,         // segundos desde a epoch
//!   "type":           string,
//!   "message":        object | string
//! }
//! ```
//!
//! `message` recebe o payload como valor estruturado quando ele é JSON
//! válido, senão o texto literal. Payload vazio vira `{}`.

use crate::identity::{Clock, DeviceIdentity, SystemClock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, trace};

/// Envelope de uma mensagem de dispositivo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Value,
}

/// Converte o payload bruto no campo `message`.
pub fn message_value(payload: &str) -> Value {
    if payload.is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(parsed) => parsed,
        Err(_) => {
            trace!("Payload não é JSON, embutindo como texto");
            Value::String(payload.to_string())
        }
    }
}

/// Monta e serializa envelopes com a identidade do dispositivo.
#[derive(Clone)]
pub struct EnvelopeBuilder {
    identity: DeviceIdentity,
    clock: Arc<dyn Clock>,
}

impl EnvelopeBuilder {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self::with_clock(identity, Arc::new(SystemClock))
    }

    pub fn with_clock(identity: DeviceIdentity, clock: Arc<dyn Clock>) -> Self {
        Self { identity, clock }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Monta o envelope com timestamp atual.
    pub fn build(&self, kind: &str, payload: &str) -> Envelope {
        Envelope {
            mac_address: self.identity.mac_address.clone(),
            serial_number: self
                .identity
                .serial_number
                .clone()
                .filter(|s| !s.is_empty()),
            timestamp: self.clock.epoch_secs(),
            kind: kind.to_string(),
            message: message_value(payload),
        }
    }

    /// Serializa o envelope. Falha resulta em string vazia, tratada pelo
    /// chamador como publicação falha.
    pub fn serialize(&self, kind: &str, payload: &str) -> String {
        let envelope = self.build(kind, payload);
        match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                error!("Erro ao serializar envelope [{kind}]: {e}");
                String::new()
            }
        }
    }
}

impl std::fmt::Debug for EnvelopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeBuilder")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
