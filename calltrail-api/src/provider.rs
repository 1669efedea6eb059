//! Recording provider client.
//!
//! The provider streams a recording's audio in answer to a signed,
//! form-encoded POST:
//!
//! ```text
//! POST {api_url}/queries/recording/post
//! vpbx_api_key={key}&sign={sha256_hex(key + json + salt)}&json={"recording_id":"..","action":"play"}
//! ```

use crate::config::ProviderConfig;
use crate::constants::{PROVIDER_MAX_REDIRECTS, PROVIDER_RECORDING_ACTION, PROVIDER_RECORDING_PATH};
use ::async_trait::async_trait;
use calltrail_core::ProviderError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Source of recording audio.
#[async_trait]
pub trait RecordingProvider: Send + Sync {
    /// Download the raw audio for `recording_id`.
    async fn fetch_recording(&self, recording_id: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Payload the provider signs over. Field order is part of the signature.
#[derive(Debug, Serialize)]
struct RecordingRequest<'a> {
    recording_id: &'a str,
    action: &'a str,
}

/// Signed form fields for one recording request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub json: String,
    pub sign: String,
}

/// Build the JSON payload and its signature.
pub fn sign_request(
    api_key: &str,
    api_salt: &str,
    recording_id: &str,
) -> Result<SignedRequest, ProviderError> {
    let json = serde_json::to_string(&RecordingRequest {
        recording_id,
        action: PROVIDER_RECORDING_ACTION,
    })
    .map_err(|e| ProviderError::Request {
        reason: format!("Failed to encode request: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(json.as_bytes());
    hasher.update(api_salt.as_bytes());
    let sign = hex::encode(hasher.finalize());

    Ok(SignedRequest { json, sign })
}

/// HTTP client for the telephony provider's recording API.
#[derive(Clone)]
pub struct MangoRecordingClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl MangoRecordingClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        if !config.is_configured() {
            tracing::warn!("Recording provider credentials not configured - downloads will fail");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(PROVIDER_MAX_REDIRECTS))
            .build()
            .map_err(|e| ProviderError::Request {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.api_url.trim_end_matches('/'),
            PROVIDER_RECORDING_PATH
        )
    }
}

#[async_trait]
impl RecordingProvider for MangoRecordingClient {
    async fn fetch_recording(&self, recording_id: &str) -> Result<Vec<u8>, ProviderError> {
        let (Some(api_key), Some(api_salt)) =
            (self.config.api_key.as_deref(), self.config.api_salt.as_deref())
        else {
            return Err(ProviderError::NotConfigured);
        };

        let signed = sign_request(api_key, api_salt, recording_id)?;
        let form = [
            ("vpbx_api_key", api_key),
            ("sign", signed.sign.as_str()),
            ("json", signed.json.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ProviderError::Request {
            reason: format!("Failed to read recording body: {}", e),
        })?;
        if bytes.is_empty() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: "empty recording body".to_string(),
            });
        }

        tracing::debug!(recording_id, bytes = bytes.len(), "Recording downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_payload_shape() {
        let signed = sign_request("key", "salt", "MToxMDY").unwrap();
        assert_eq!(signed.json, r#"{"recording_id":"MToxMDY","action":"play"}"#);
        assert_eq!(signed.sign.len(), 64);
        assert!(signed.sign.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_matches_concatenated_digest() {
        let signed = sign_request("key", "salt", "42").unwrap();
        let expected = hex::encode(Sha256::digest(
            format!("key{}salt", r#"{"recording_id":"42","action":"play"}"#).as_bytes(),
        ));
        assert_eq!(signed.sign, expected);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let a = sign_request("key", "salt-a", "42").unwrap();
        let b = sign_request("key", "salt-b", "42").unwrap();
        assert_eq!(a.json, b.json);
        assert_ne!(a.sign, b.sign);
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses() {
        let client = MangoRecordingClient::new(ProviderConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.fetch_recording("42").await.unwrap_err(),
            ProviderError::NotConfigured
        );
    }

    #[test]
    fn test_endpoint_joins_path() {
        let config = ProviderConfig {
            api_url: "https://pbx.example/vpbx/".to_string(),
            ..Default::default()
        };
        let client = MangoRecordingClient::new(config, Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "https://pbx.example/vpbx/queries/recording/post");
    }
}
