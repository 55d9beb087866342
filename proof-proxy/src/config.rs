/// Proxy configuration
/// Built once at startup, validated, then shared read-only by every call

use std::str::FromStr;
use std::time::Duration;

use crate::error::{ProxyError, ProxyResult};
use crate::shared::options::{ToolOptionsFile, ToolOptionsMap, ZkfetchToolOptions};
use crate::shared::tool_map::default_tool_options_map;

/// Proof generation can be slow; the wrapper itself allows up to 15 minutes
pub const DEFAULT_PROOF_TIMEOUT: Duration = Duration::from_secs(900);
pub const DEFAULT_ATTESTATION_TIMEOUT: Duration = Duration::from_secs(30);

/// What the proxy forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// Tool invocations against another tool server
    ToolCall,
    /// Plain HTTPS fetches
    DirectFetch,
}

impl FromStr for ProxyKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tool-call" | "tool_call" | "zkfetch" => Ok(ProxyKind::ToolCall),
            "direct-fetch" | "direct_fetch" | "fetch" => Ok(ProxyKind::DirectFetch),
            other => Err(ProxyError::Configuration(format!("unknown proxy kind `{}`", other))),
        }
    }
}

/// Configuration for attestation service proof submission
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationConfig {
    /// URL of the attestation service (e.g. `http://localhost:8002`)
    pub service_url: String,
    pub enabled: bool,
    /// Workflow stage tag, `"general"` when unset
    pub workflow_stage: Option<String>,
    /// Groups related proofs; generated per call when unset
    pub session_id: Option<String>,
    /// Submitter identity, e.g. "agent-a"
    pub submitted_by: String,
    pub timeout: Duration,
}

impl AttestationConfig {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            enabled: true,
            workflow_stage: None,
            session_id: None,
            submitted_by: "proof-proxy".to_string(),
            timeout: DEFAULT_ATTESTATION_TIMEOUT,
        }
    }

    pub fn with_stage(service_url: impl Into<String>, workflow_stage: impl Into<String>) -> Self {
        Self {
            workflow_stage: Some(workflow_stage.into()),
            ..Self::new(service_url)
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_submitter(mut self, submitted_by: impl Into<String>) -> Self {
        self.submitted_by = submitted_by.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Process-wide proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// zkfetch wrapper URL (e.g. `http://localhost:8000`)
    pub url: String,
    pub kind: ProxyKind,
    /// Per-tool options, consulted only for body-bearing calls
    pub tool_options_map: Option<ToolOptionsMap>,
    /// Fallback options, consulted only for bodyless calls
    pub default_options: Option<ZkfetchToolOptions>,
    pub attestation_config: Option<AttestationConfig>,
    pub proof_timeout: Duration,
    /// Extra attempts after a retryable dispatch failure. Each attempt may be billed.
    pub proof_retries: u32,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, kind: ProxyKind) -> Self {
        Self {
            url: url.into(),
            kind,
            tool_options_map: None,
            default_options: None,
            attestation_config: None,
            proof_timeout: DEFAULT_PROOF_TIMEOUT,
            proof_retries: 0,
        }
    }

    pub fn with_tool_options_map(mut self, map: ToolOptionsMap) -> Self {
        self.tool_options_map = Some(map);
        self
    }

    pub fn with_default_options(mut self, options: ZkfetchToolOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    pub fn with_attestation(mut self, attestation: AttestationConfig) -> Self {
        self.attestation_config = Some(attestation);
        self
    }

    pub fn with_proof_timeout(mut self, timeout: Duration) -> Self {
        self.proof_timeout = timeout;
        self
    }

    pub fn with_proof_retries(mut self, retries: u32) -> Self {
        self.proof_retries = retries;
        self
    }

    /// Reject configurations no call could be served with
    pub fn validate(&self) -> ProxyResult<()> {
        check_http_url("proof service", &self.url)?;

        if self.tool_options_map.is_none() && self.default_options.is_none() {
            return Err(ProxyError::Configuration(
                "either a tool options map or default options must be configured".to_string(),
            ));
        }

        if self.proof_timeout.is_zero() {
            return Err(ProxyError::Configuration("proof timeout must be non-zero".to_string()));
        }

        if let Some(attestation) = self.attestation_config.as_ref().filter(|a| a.enabled) {
            check_http_url("attestation service", &attestation.service_url)?;
            if attestation.submitted_by.trim().is_empty() {
                return Err(ProxyError::Configuration(
                    "attestation submitter identity must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Load configuration from the environment
    ///
    /// Tool options come from the JSON file at `TOOL_OPTIONS_PATH` when set,
    /// otherwise from the built-in map.
    ///
    /// `PROXY_KIND` picks the kind of the returned config. The HTTP binary
    /// runs one proxy of each kind and overrides it.
    pub fn from_env() -> ProxyResult<Self> {
        let url = std::env::var("ZKFETCH_URL")
            .map_err(|_| ProxyError::Configuration("ZKFETCH_URL environment variable not set".to_string()))?;

        let kind = match std::env::var("PROXY_KIND") {
            Ok(kind) => kind.parse()?,
            Err(_) => ProxyKind::ToolCall,
        };

        let mut config = Self::new(url, kind)
            .with_proof_timeout(Duration::from_secs(env_number("PROOF_TIMEOUT_SECS", 900)?))
            .with_proof_retries(env_number("PROOF_RETRIES", 0)? as u32);

        match std::env::var("TOOL_OPTIONS_PATH") {
            Ok(path) => {
                let file = load_tool_options_file(&path)?;
                config.tool_options_map = file.tools;
                config.default_options = file.default;
            }
            Err(_) => {
                config.tool_options_map = Some(default_tool_options_map());
                config.default_options = Some(ZkfetchToolOptions::default());
            }
        }

        if let Ok(service_url) = std::env::var("ATTESTATION_URL") {
            let mut attestation = AttestationConfig::new(service_url).with_timeout(Duration::from_secs(
                env_number("ATTESTATION_TIMEOUT_SECS", DEFAULT_ATTESTATION_TIMEOUT.as_secs())?,
            ));
            attestation.enabled = std::env::var("ATTESTATION_ENABLED")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(true);
            attestation.workflow_stage = std::env::var("WORKFLOW_STAGE").ok();
            attestation.session_id = std::env::var("SESSION_ID").ok();
            if let Ok(submitted_by) = std::env::var("SUBMITTED_BY") {
                attestation.submitted_by = submitted_by;
            }
            config.attestation_config = Some(attestation);
        }

        config.validate()?;
        tracing::info!(
            "[CONFIG] Proxy configured: url={}, kind={:?}, tools={}, attestation={}",
            config.url,
            config.kind,
            config.tool_options_map.as_ref().map(|m| m.len()).unwrap_or(0),
            config.attestation_config.as_ref().map(|a| a.enabled).unwrap_or(false)
        );
        Ok(config)
    }
}

/// Read a `{ "tools": {...}, "default": {...} }` options file
pub fn load_tool_options_file(path: &str) -> ProxyResult<ToolOptionsFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ProxyError::Configuration(format!("cannot read tool options file {}: {}", path, e)))?;
    parse_tool_options_file(&text)
}

pub fn parse_tool_options_file(text: &str) -> ProxyResult<ToolOptionsFile> {
    serde_json::from_str(text)
        .map_err(|e| ProxyError::Configuration(format!("invalid tool options file: {}", e)))
}

fn check_http_url(what: &str, url: &str) -> ProxyResult<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ProxyError::Configuration(format!("invalid {} URL `{}`: {}", what, url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ProxyError::Configuration(format!(
            "{} URL must be http(s), got `{}`",
            what, scheme
        ))),
    }
}

fn env_number(name: &str, default: u64) -> ProxyResult<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ProxyError::Configuration(format!("{} must be a number, got `{}`", name, value))),
        Err(_) => Ok(default),
    }
}
