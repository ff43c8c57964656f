//! Parsing do endpoint do broker no formato `host[:port]`.

use crate::error::EndpointError;
use std::fmt;

/// Endereço do broker já resolvido em host e porta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Interpreta `host[:port]`; sem `:` usa `default_port`.
    pub fn parse(endpoint: &str, default_port: u16) -> Result<Self, EndpointError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(EndpointError::Empty);
        }

        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| EndpointError::InvalidPort {
                        endpoint: endpoint.to_string(),
                        port: port.to_string(),
                    })?;
                (host.trim(), port)
            }
            None => (endpoint, default_port),
        };

        if host.is_empty() {
            return Err(EndpointError::EmptyHost(endpoint.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
