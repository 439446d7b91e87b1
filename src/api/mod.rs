//! Allocator API client
//!
//! The registration handshake that precedes a session: a freshly generated
//! device id is posted to the allocator, which answers with the tunnel
//! address assignment; a second endpoint returns the server's recommended
//! buffer size, MTU and compression flag. Both calls ride the same HTTPS
//! origin as the tunnel itself and carry the shared `key` header.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct RegisterRequest {
    id: String,
}

/// Tunnel address assignment returned by the allocator
#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Server-side tunnel address
    pub server: String,
    /// Client-side tunnel address
    pub client: String,
}

/// Recommended session parameters returned by the server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(rename = "bufferSize")]
    pub buffer_size: usize,
    pub mtu: u16,
    pub compress: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// JSON client for the allocator endpoints
pub struct AllocatorClient {
    http: reqwest::Client,
    base: String,
    key: String,
}

impl AllocatorClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| Error::Api(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: format!("https://{}", config.server_addr),
            key: config.key.clone(),
        })
    }

    /// Register a fresh device id and receive its address assignment
    pub async fn register(&self) -> Result<Assignment> {
        let id = Uuid::new_v4().to_string();
        debug!("registering device {}", id);
        let assignment: Assignment = self
            .post("/allocator/register", Some(&RegisterRequest { id }))
            .await?;
        Ok(assignment)
    }

    /// Fetch the server's recommended session parameters
    pub async fn fetch_settings(&self) -> Result<ServerSettings> {
        self.post::<RegisterRequest, _>("/config", None).await
    }

    async fn post<B, T>(&self, route: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize,
        T: serde::de::DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}{}", self.base, route))
            .header("Content-Type", "application/json");
        if !self.key.is_empty() {
            request = request.header("key", &self.key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Api(format!("request to {} failed: {}", route, e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Api(format!("failed to read response from {}: {}", route, e)))?;

        if !status.is_success() {
            // Error bodies are JSON objects with a message field.
            return match serde_json::from_slice::<ApiError>(&bytes) {
                Ok(api_error) => Err(Error::Api(api_error.message)),
                Err(_) => Err(Error::Api(format!("{} returned status {}", route, status))),
            };
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Api(format!("invalid response from {}: {}", route, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_decoding() {
        let json = r#"{
            "deviceId": "c2b4c98e-6fbb-4a27-9b3e-4f2f3a6f0b71",
            "server": "172.16.0.1",
            "client": "172.16.0.8"
        }"#;
        let assignment: Assignment = serde_json::from_str(json).unwrap();
        assert_eq!(assignment.server, "172.16.0.1");
        assert_eq!(assignment.client, "172.16.0.8");
    }

    #[test]
    fn test_server_settings_decoding() {
        let json = r#"{"bufferSize": 65536, "mtu": 1400, "compress": true}"#;
        let settings: ServerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.buffer_size, 65536);
        assert_eq!(settings.mtu, 1400);
        assert!(settings.compress);
    }

    #[test]
    fn test_error_body_decoding() {
        let json = r#"{"message": "unauthorized"}"#;
        let api_error: ApiError = serde_json::from_str(json).unwrap();
        assert_eq!(api_error.message, "unauthorized");
    }

    #[test]
    fn test_register_request_encoding() {
        let request = RegisterRequest {
            id: "abc".to_string(),
        };
        assert_eq!(serde_json::to_string(&request).unwrap(), r#"{"id":"abc"}"#);
    }
}
