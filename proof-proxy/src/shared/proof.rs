/// Proof records and their submission to the attestation service

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::redaction::RedactionMetadata;
use crate::config::AttestationConfig;
use crate::error::AttestationError;

/// Claim data signed by the witnesses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimData {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub timestamp_s: u64,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    pub id: String,
    pub url: String,
}

/// Opaque proof payload produced by the zkfetch wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPayload {
    pub claim_data: ClaimData,
    pub identifier: String,
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub witnesses: Vec<Witness>,
    #[serde(default)]
    pub extracted_parameter_values: BTreeMap<String, Value>,
}

/// Cryptographic proof record for a proxied call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptographicProof {
    pub tool_name: String,
    pub timestamp: u64,
    /// Masked request: placeholders only, never hidden values
    pub request: Value,
    /// Response with `redactions` excluded
    pub response: Value,
    pub proof: ProofPayload,
    /// Set only after a successful attestation submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_id: Option<String>,
    pub verified: bool,
    pub onchain_compatible: bool,

    /// Caller-facing result with display paths masked; for UIs and audit views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_response: Option<Value>,

    /// Metadata about which fields were redacted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction_metadata: Option<RedactionMetadata>,
}

/// Body of `POST {attestation}/proofs/submit`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSubmissionRequest<'a> {
    pub proof: &'a CryptographicProof,
    pub workflow_stage: &'a str,
    pub session_id: &'a str,
    pub submitted_by: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProofSubmissionResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "proof_id")]
    proof_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the attestation service
#[derive(Debug, Clone)]
pub struct AttestationClient {
    client: reqwest::Client,
    service_url: String,
    timeout: Duration,
}

impl AttestationClient {
    pub fn new(client: reqwest::Client, config: &AttestationConfig) -> Self {
        Self {
            client,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        }
    }

    /// Submit a verified proof; returns the service's proof id
    pub async fn submit(
        &self,
        proof: &CryptographicProof,
        workflow_stage: &str,
        session_id: &str,
        submitted_by: &str,
    ) -> Result<String, AttestationError> {
        let submit_url = format!("{}/proofs/submit", self.service_url);
        let payload = ProofSubmissionRequest {
            proof,
            workflow_stage,
            session_id,
            submitted_by,
        };

        let exchange = async {
            let response = self.client.post(&submit_url).json(&payload).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if e.is_timeout() => return Err(AttestationError::Timeout(self.timeout)),
            Ok(Err(e)) => {
                tracing::warn!("[PROOF] Error sending request to {}: {}", submit_url, e);
                if e.is_connect() {
                    tracing::warn!(
                        "[PROOF] Connection error - is the attestation service running at {}?",
                        self.service_url
                    );
                }
                return Err(AttestationError::Network(e.to_string()));
            }
            Err(_) => return Err(AttestationError::Timeout(self.timeout)),
        };

        if !status.is_success() {
            tracing::warn!("[PROOF] Attestation service returned error status: {}", status);
            return Err(AttestationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: ProofSubmissionResponse =
            serde_json::from_str(&body).map_err(|_| AttestationError::MissingProofId)?;

        if result.success == Some(false) {
            return Err(AttestationError::Rejected(
                result.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        match result.proof_id {
            Some(proof_id) if !proof_id.is_empty() => {
                tracing::info!("[PROOF] ✓ Proof submitted to attestation service: {}", proof_id);
                Ok(proof_id)
            }
            _ => Err(AttestationError::MissingProofId),
        }
    }
}
