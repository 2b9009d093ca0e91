//! # HTTP Transport
//!
//! `Transport` over a blocking `reqwest` client.

use crate::config::Config;
use reqwest::header::CONTENT_TYPE;
use structdb_core::{StructDbError, Transport, TransportResponse};

/// Posts JSON payloads over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build a transport with the configured timeout and certificate policy.
    pub fn new(config: &Config) -> Result<Self, StructDbError> {
        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| StructDbError::ConnectionFailed(format!("Cannot build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, payload: &str) -> Result<TransportResponse, StructDbError> {
        tracing::debug!("POST {} ({} bytes)", url, payload.len());
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .map_err(|e| StructDbError::ConnectionFailed(format!("{url}: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| StructDbError::ConnectionFailed(format!("{url}: {e}")))?
            .to_vec();
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        assert!(HttpTransport::new(&Config::default()).is_ok());
    }

    #[test]
    fn unreachable_host_is_connection_failure() {
        let config = Config {
            timeout_secs: 2,
            ..Config::default()
        };
        let transport = HttpTransport::new(&config);
        let result = transport.and_then(|t| t.post("http://127.0.0.1:1/api", "{}"));
        assert!(matches!(result, Err(StructDbError::ConnectionFailed(_))));
    }
}
