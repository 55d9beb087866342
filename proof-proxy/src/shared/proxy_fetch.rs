/// zkfetch client
/// Sends masked requests to the zkfetch wrapper and parses the proof envelope it returns

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::options::ZkfetchToolOptions;
use super::proof::ProofPayload;
use crate::error::ProofGenerationError;

/// Request body for `POST {zkfetch}/zkfetch`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkfetchPayload {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_options: Option<Value>,
    pub private_options: Value,
    pub redactions: Value,
}

impl ZkfetchPayload {
    /// Build the payload from an already-masked request
    pub fn new(
        url: &str,
        method: &str,
        masked_body: Option<&Value>,
        options: &ZkfetchToolOptions,
    ) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let method = match options.public_options.as_ref().and_then(|p| p.method.as_deref()) {
            Some(forced) => forced.to_uppercase(),
            None => method.to_uppercase(),
        };

        let public_options = options.public_options.as_ref().map(|public| {
            headers.extend(public.headers.clone());
            json!({
                "method": method,
                "timeout": public.timeout.unwrap_or(30_000),
                "headers": public.headers,
            })
        });

        Self {
            url: url.to_string(),
            method,
            headers,
            body: masked_body.cloned(),
            public_options,
            private_options: options.private_options.to_wire(),
            redactions: options.redactions_wire(),
        }
    }
}

/// Parsed response from the zkfetch wrapper
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkfetchResponse {
    /// Target's response, as fetched inside the attested session
    #[serde(default)]
    pub data: Value,
    pub proof: ProofPayload,
    pub verified: bool,
    #[serde(default, alias = "onchain_compatible")]
    pub onchain_compatible: bool,
}

/// Client for the proof-generation service. Performs exactly one attempt per call.
#[derive(Debug, Clone)]
pub struct ZkfetchClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ZkfetchClient {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/zkfetch", self.base_url)
    }

    /// Send one proof request, bounded by the configured timeout
    pub async fn generate_proof(
        &self,
        payload: &ZkfetchPayload,
    ) -> Result<ZkfetchResponse, ProofGenerationError> {
        let url = self.endpoint();
        tracing::debug!("[ZKFETCH] POST {} (target: {} {})", url, payload.method, payload.url);

        // Headers and body share one deadline
        let exchange = async {
            let response = self.client.post(&url).json(payload).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(ProofGenerationError::Timeout(self.timeout));
            }
            Ok(Err(e)) => {
                if e.is_connect() {
                    tracing::error!("[ZKFETCH] Connection error - is the zkfetch wrapper running at {}?", self.base_url);
                }
                return Err(ProofGenerationError::Network(e.to_string()));
            }
            Err(_) => return Err(ProofGenerationError::Timeout(self.timeout)),
        };

        if !status.is_success() {
            tracing::error!("[ZKFETCH] Proof service returned error status: {}", status);
            return Err(ProofGenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

/// Parse and sanity-check the wrapper's answer
pub fn parse_response(body: &str) -> Result<ZkfetchResponse, ProofGenerationError> {
    let mut parsed: ZkfetchResponse = serde_json::from_str(body)
        .map_err(|e| ProofGenerationError::Malformed(e.to_string()))?;

    if parsed.proof.identifier.trim().is_empty() {
        return Err(ProofGenerationError::Malformed(
            "proof has no claim identifier".to_string(),
        ));
    }

    // Some wrappers return the target body as a JSON string
    if let Value::String(text) = &parsed.data {
        if let Ok(inner) = serde_json::from_str::<Value>(text) {
            parsed.data = inner;
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Value {
        json!({
            "data": "{\"slideshow\":{\"title\":\"Sample\"}}",
            "proof": {
                "claimData": {
                    "provider": "http",
                    "parameters": "{}",
                    "owner": "0xabc",
                    "timestampS": 1700000000,
                    "context": "{}",
                    "identifier": "0xclaim",
                    "epoch": 1
                },
                "identifier": "0xclaim",
                "signatures": ["0xsig"],
                "witnesses": [{"id": "0xw", "url": "wss://witness"}],
                "extractedParameterValues": {"title": "Sample"}
            },
            "verified": true,
            "onchainCompatible": true
        })
    }

    #[test]
    fn test_parse_response_decodes_string_data() {
        let parsed = parse_response(&envelope().to_string()).unwrap();
        assert_eq!(parsed.data, json!({"slideshow": {"title": "Sample"}}));
        assert!(parsed.verified);
        assert!(parsed.onchain_compatible);
        assert_eq!(parsed.proof.identifier, "0xclaim");
    }

    #[test]
    fn test_parse_response_requires_verified_flag() {
        let mut body = envelope();
        body.as_object_mut().unwrap().remove("verified");
        assert!(matches!(
            parse_response(&body.to_string()),
            Err(ProofGenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_response_requires_identifier() {
        let mut body = envelope();
        body["proof"]["identifier"] = json!("");
        assert!(matches!(
            parse_response(&body.to_string()),
            Err(ProofGenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_payload_uses_public_method_override() {
        let options = ZkfetchToolOptions::from_json(json!({
            "publicOptions": {"method": "post", "timeout": 5000, "headers": {"X-Trace": "1"}}
        }))
        .unwrap();
        let payload = ZkfetchPayload::new("https://example.com", "GET", None, &options);
        let wire = serde_json::to_value(&payload).unwrap();

        assert_eq!(wire["method"], "POST");
        assert_eq!(wire["publicOptions"]["timeout"], 5000);
        assert_eq!(wire["headers"]["X-Trace"], "1");
        assert_eq!(wire["headers"]["Content-Type"], "application/json");
        assert!(wire.get("body").is_none());
        assert_eq!(wire["redactions"], json!([]));
    }
}
