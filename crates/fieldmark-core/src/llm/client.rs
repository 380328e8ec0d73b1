//! Blocking HTTP transport for DashScope and OpenAI-compatible endpoints.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::protocol::{build_payload, extract_content};
use super::{LlmRequest, LlmTransport};
use crate::error::RemoteExtractionError;
use crate::models::config::{LlmConfig, LlmProtocol};

/// One POST per prompt, bearer-authenticated, fixed timeout, no retries.
///
/// Uses the blocking client: build and call it off any async executor.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    model_name: String,
    api_key: String,
    protocol: LlmProtocol,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn from_config(config: &LlmConfig) -> Result<Self, RemoteExtractionError> {
        if config.endpoint.trim().is_empty() {
            return Err(RemoteExtractionError::NotConfigured("no endpoint".to_string()));
        }
        if config.model_name.trim().is_empty() {
            return Err(RemoteExtractionError::NotConfigured("no model name".to_string()));
        }
        let api_key = config.resolve_api_key().ok_or_else(|| {
            RemoteExtractionError::NotConfigured(format!(
                "no API key (set llm.api_key or {})",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteExtractionError::Transport(e.to_string()))?;

        info!("LLM transport: {:?} model {} at {}", config.protocol, config.model_name, config.endpoint);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model_name: config.model_name.clone(),
            api_key,
            protocol: config.protocol,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> RemoteExtractionError {
        if e.is_timeout() {
            RemoteExtractionError::Timeout(self.timeout_secs)
        } else {
            RemoteExtractionError::Transport(e.to_string())
        }
    }
}

impl LlmTransport for HttpTransport {
    fn complete(&self, request: &LlmRequest) -> Result<String, RemoteExtractionError> {
        let payload = build_payload(self.protocol, &self.model_name, request);
        debug!("POST {} ({} prompt chars)", self.endpoint, request.user.chars().count());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RemoteExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .map_err(|e| RemoteExtractionError::Parse(format!("response body: {}", e)))?;
        extract_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_not_configured() {
        let config = LlmConfig {
            api_key: None,
            api_key_env: "FIELDMARK_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            HttpTransport::from_config(&config),
            Err(RemoteExtractionError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_empty_endpoint_is_not_configured() {
        let config = LlmConfig {
            endpoint: String::new(),
            api_key: Some("k".to_string()),
            ..LlmConfig::default()
        };
        assert!(matches!(
            HttpTransport::from_config(&config),
            Err(RemoteExtractionError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:9/unreachable".to_string(),
            api_key: Some("k".to_string()),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        let err = transport
            .complete(&LlmRequest {
                system: String::new(),
                user: "ping".to_string(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            RemoteExtractionError::Transport(_) | RemoteExtractionError::Timeout(_)
        ));
    }
}
