/// Proxy orchestration
/// Runs one proxied call end to end:
/// - resolve which redaction rules apply
/// - mask hidden parameters
/// - request a proof from the zkfetch wrapper
/// - exclude response regions from the proof record
/// - optionally submit the proof for attestation
/// - unmask the caller's copy of the response

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{ProxyConfig, ProxyKind};
use crate::error::{ProofGenerationError, ProxyError, ProxyResult, Stage};
use crate::shared::proof::{AttestationClient, CryptographicProof};
use crate::shared::proxy_fetch::{ZkfetchClient, ZkfetchPayload, ZkfetchResponse};
use crate::shared::redaction::{
    disclose_extracted, exclude_regions, mask_request, redact_for_display, unmask, MaskedRequest,
    RedactionMetadata,
};
use crate::shared::tool_map::{resolve_tool_options, ToolSelection};

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Lifecycle of a single call, logged at debug level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Init,
    Resolved,
    Masked,
    Dispatched,
    ProofReceived,
    Attested,
    AttestationSkipped,
    AttestationFailed,
    Done,
    ProofFailed,
    RedactionFailed,
}

/// Outgoing request as the caller wrote it, hidden values included
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub method: String,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            body,
        }
    }
}

/// What happened to the attestation step of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationOutcome {
    Disabled,
    SkippedUnverified,
    Submitted(String),
    Failed(String),
}

/// Non-fatal problem recorded on a successful call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallWarning {
    pub stage: Stage,
    pub message: String,
}

/// Successful proxied call
#[derive(Debug, Clone)]
pub struct ProxiedResult {
    /// Caller's view of the response, hidden values restored
    pub result: Value,
    pub proof: CryptographicProof,
    pub attestation: AttestationOutcome,
    pub warnings: Vec<CallWarning>,
}

/// Proof fields surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSummary {
    pub collected: bool,
    pub verified: bool,
    pub onchain_compatible: bool,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_id: Option<String>,
    pub extracted_parameter_values: BTreeMap<String, Value>,
}

/// `{ result, proof, warnings? }` as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallerResponse {
    pub result: Value,
    pub proof: ProofSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CallWarning>,
}

impl ProxiedResult {
    pub fn proof_id(&self) -> Option<&str> {
        self.proof.proof_id.as_deref()
    }

    pub fn caller_response(&self) -> CallerResponse {
        CallerResponse {
            result: self.result.clone(),
            proof: ProofSummary {
                collected: true,
                verified: self.proof.verified,
                onchain_compatible: self.proof.onchain_compatible,
                identifier: self.proof.proof.identifier.clone(),
                proof_id: self.proof.proof_id.clone(),
                extracted_parameter_values: self.proof.proof.extracted_parameter_values.clone(),
            },
            warnings: self.warnings.clone(),
        }
    }
}

/// Proof-enabled request proxy. Cheap to clone; clones share configuration.
#[derive(Debug, Clone)]
pub struct ProxyFetch {
    config: Arc<ProxyConfig>,
    zkfetch: ZkfetchClient,
    attestation: Option<AttestationClient>,
}

impl ProxyFetch {
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Build with a caller-supplied HTTP client (connection pool, TLS settings)
    pub fn with_client(config: ProxyConfig, client: reqwest::Client) -> ProxyResult<Self> {
        config.validate()?;

        let zkfetch = ZkfetchClient::new(client.clone(), &config.url, config.proof_timeout);
        let attestation = config
            .attestation_config
            .as_ref()
            .filter(|a| a.enabled)
            .map(|a| AttestationClient::new(client, a));

        tracing::info!(
            "[PROXY_FETCH] Initialized: kind={:?}, zkfetch={}, attestation={}",
            config.kind,
            zkfetch.endpoint(),
            attestation.is_some()
        );

        Ok(Self {
            config: Arc::new(config),
            zkfetch,
            attestation,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub async fn get(&self, url: &str) -> ProxyResult<ProxiedResult> {
        self.request(OutboundRequest::new(url, "GET", None)).await
    }

    pub async fn post(&self, url: &str, body: Option<Value>) -> ProxyResult<ProxiedResult> {
        self.request(OutboundRequest::new(url, "POST", body)).await
    }

    pub async fn put(&self, url: &str, body: Option<Value>) -> ProxyResult<ProxiedResult> {
        self.request(OutboundRequest::new(url, "PUT", body)).await
    }

    pub async fn delete(&self, url: &str) -> ProxyResult<ProxiedResult> {
        self.request(OutboundRequest::new(url, "DELETE", None)).await
    }

    /// Invoke a tool on another tool server through the proxy.
    ///
    /// Targets ending in `/mcp` get a JSON-RPC `tools/call` envelope; anything
    /// else is treated as a REST tool server at `{target}/tools/{tool}`, whose
    /// body carries the tool name in `name`; an argument of that name is rejected.
    pub async fn call_tool(
        &self,
        target_url: &str,
        tool_name: &str,
        arguments: Value,
    ) -> ProxyResult<ProxiedResult> {
        let target = target_url.trim_end_matches('/');
        if target.ends_with("/mcp") {
            let body = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": tool_name, "arguments": arguments},
            });
            self.post(target, Some(body)).await
        } else {
            let mut body = match arguments {
                Value::Object(map) => Value::Object(map),
                Value::Null => json!({}),
                other => json!({ "arguments": other }),
            };
            if let Some(obj) = body.as_object_mut() {
                if obj.contains_key("name") {
                    return Err(ProxyError::InvalidRequest(format!(
                        "argument `name` clashes with the tool name field for {}",
                        tool_name
                    )));
                }
                obj.insert("name".to_string(), json!(tool_name));
            }
            self.post(&format!("{}/tools/{}", target, tool_name), Some(body))
                .await
        }
    }

    /// Run one call through the full pipeline
    pub async fn request(&self, request: OutboundRequest) -> ProxyResult<ProxiedResult> {
        let OutboundRequest { url, method, body } = request;

        let selection = ToolSelection::from_body(body.as_ref());
        let tool_name = match &selection {
            ToolSelection::ByTool(name) => name.clone(),
            ToolSelection::Anonymous => "anonymous".to_string(),
            ToolSelection::NoBody => "direct-fetch".to_string(),
        };
        trace_state(&tool_name, CallState::Init);

        let options = resolve_tool_options(
            &selection,
            self.config.tool_options_map.as_ref(),
            self.config.default_options.as_ref(),
        );
        trace_state(&tool_name, CallState::Resolved);

        let MaskedRequest {
            url,
            body,
            param_values,
        } = mask_request(&url, body, &options.private_options.hidden_parameters);
        if !param_values.is_empty() {
            tracing::info!(
                "[PROXY_FETCH] Masked {} hidden parameter(s) for {}: {:?}",
                param_values.len(),
                tool_name,
                param_values
            );
        }
        trace_state(&tool_name, CallState::Masked);

        let payload = ZkfetchPayload::new(&url, &method, body.as_ref(), options);
        trace_state(&tool_name, CallState::Dispatched);
        let response = match self.dispatch(&tool_name, &payload).await {
            Ok(response) => response,
            Err(e) => {
                trace_state(&tool_name, CallState::ProofFailed);
                tracing::error!("[PROXY_FETCH] Proof generation failed for {}: {}", tool_name, e);
                return Err(e.into());
            }
        };
        trace_state(&tool_name, CallState::ProofReceived);

        let ZkfetchResponse {
            data,
            proof: mut proof_payload,
            verified,
            onchain_compatible,
        } = response;

        let mut proof_response = data.clone();
        let redacted_paths = match exclude_regions(&mut proof_response, &options.redactions) {
            Ok(paths) => paths,
            Err(e) => {
                trace_state(&tool_name, CallState::RedactionFailed);
                tracing::error!("[PROXY_FETCH] Redaction failed for {}: {}", tool_name, e);
                return Err(e.into());
            }
        };
        proof_payload.extracted_parameter_values = disclose_extracted(
            std::mem::take(&mut proof_payload.extracted_parameter_values),
            &options.private_options.response_matches,
        );

        // Caller copy, still masked until the end of the call
        let mut result = match self.config.kind {
            ProxyKind::ToolCall => unwrap_tool_result(data),
            ProxyKind::DirectFetch => data,
        };
        let display_response = if options.response_redaction_paths.is_empty() {
            None
        } else {
            let (display, masked) = redact_for_display(&result, &options.response_redaction_paths);
            tracing::debug!("[PROXY_FETCH] Display copy for {} masks {:?}", tool_name, masked);
            Some(display)
        };

        let mut proof = CryptographicProof {
            tool_name: tool_name.clone(),
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            request: json!({
                "url": payload.url,
                "method": payload.method,
                "body": payload.body,
            }),
            response: proof_response,
            proof: proof_payload,
            proof_id: None,
            verified,
            onchain_compatible,
            display_response,
            redaction_metadata: Some(RedactionMetadata::new(redacted_paths, &param_values)),
        };

        let attestation = self.attest(&mut proof).await;
        let warnings = match &attestation {
            AttestationOutcome::Failed(reason) => {
                trace_state(&tool_name, CallState::AttestationFailed);
                vec![CallWarning {
                    stage: Stage::Attest,
                    message: reason.clone(),
                }]
            }
            AttestationOutcome::Submitted(_) => {
                trace_state(&tool_name, CallState::Attested);
                Vec::new()
            }
            _ => {
                trace_state(&tool_name, CallState::AttestationSkipped);
                Vec::new()
            }
        };

        unmask(&mut result, &param_values);
        drop(param_values);

        trace_state(&tool_name, CallState::Done);
        tracing::info!(
            "[PROXY_FETCH] ✓ {} completed: verified={}, proof_id={}",
            tool_name,
            proof.verified,
            proof.proof_id.as_deref().unwrap_or("-")
        );

        Ok(ProxiedResult {
            result,
            proof,
            attestation,
            warnings,
        })
    }

    /// One attempt plus at most `proof_retries` retries of retryable failures
    async fn dispatch(
        &self,
        tool_name: &str,
        payload: &ZkfetchPayload,
    ) -> Result<ZkfetchResponse, ProofGenerationError> {
        let attempts = self.config.proof_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.zkfetch.generate_proof(payload).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        "[PROXY_FETCH] Attempt {}/{} for {} failed: {}; retrying",
                        attempt,
                        attempts,
                        tool_name,
                        e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Submit a verified proof. Failures are reported, never raised.
    async fn attest(&self, proof: &mut CryptographicProof) -> AttestationOutcome {
        let (client, config) = match self
            .attestation
            .as_ref()
            .zip(self.config.attestation_config.as_ref())
        {
            Some(pair) => pair,
            None => return AttestationOutcome::Disabled,
        };

        if !proof.verified {
            tracing::info!(
                "[PROXY_FETCH] Proof for {} not verified; skipping attestation",
                proof.tool_name
            );
            return AttestationOutcome::SkippedUnverified;
        }

        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| format!("sess_{}", uuid::Uuid::new_v4()));
        let workflow_stage = config.workflow_stage.as_deref().unwrap_or("general");

        match client
            .submit(proof, workflow_stage, &session_id, &config.submitted_by)
            .await
        {
            Ok(proof_id) => {
                proof.proof_id = Some(proof_id.clone());
                AttestationOutcome::Submitted(proof_id)
            }
            Err(e) => {
                tracing::warn!(
                    "[PROXY_FETCH] Attestation failed for {} (continuing): {}",
                    proof.tool_name,
                    e
                );
                AttestationOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Unwrap a tool server's answer to the tool's own result.
///
/// MCP servers answer `result.content[0].text` (JSON text when possible),
/// REST tool servers `{ success, data }`. Anything else passes through.
pub fn unwrap_tool_result(data: Value) -> Value {
    if let Some(text) = data.pointer("/result/content/0/text").and_then(Value::as_str) {
        return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    }

    match data.get("data") {
        Some(inner) if !inner.is_null() => inner.clone(),
        _ => data,
    }
}

fn trace_state(tool_name: &str, state: CallState) {
    tracing::debug!("[PROXY_FETCH] {} -> {:?}", tool_name, state);
}
