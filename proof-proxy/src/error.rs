/// Error types for the proof proxy
/// Resolution, masking and proof generation failures end the call with a stage;
/// attestation failures are downgraded to warnings by the orchestrator

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result alias for proxy calls.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Redact,
    Dispatch,
    Verify,
    Attest,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Redact => "redact",
            Stage::Dispatch => "dispatch",
            Stage::Verify => "verify",
            Stage::Attest => "attest",
        }
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a proxied call.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Invalid configuration. Raised at construction, never mid-call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The call itself cannot be built, e.g. arguments that clash with the envelope
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A redaction rule could not be applied; no proof is returned.
    #[error("redact stage failed: {0}")]
    Redaction(#[from] RedactionError),

    /// The proof-generation service failed or answered with garbage.
    #[error("{} stage failed: {source}", .source.stage())]
    ProofGeneration {
        #[from]
        source: ProofGenerationError,
    },
}

impl ProxyError {
    /// Stage the call failed in.
    pub fn stage(&self) -> Stage {
        match self {
            ProxyError::Configuration(_) | ProxyError::InvalidRequest(_) => Stage::Resolve,
            ProxyError::Redaction(_) => Stage::Redact,
            ProxyError::ProofGeneration { source } => source.stage(),
        }
    }
}

/// Redaction rule errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedactionError {
    /// Selector text could not be parsed.
    #[error("invalid path selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Selector walks into a value that cannot be indexed that way,
    /// e.g. `.key` on an array or `[0]` on a string.
    #[error("path selector `{selector}` cannot be applied at `{at}`: found {found}")]
    ShapeMismatch {
        selector: String,
        at: String,
        found: &'static str,
    },
}

/// Proof-generation service errors.
#[derive(Debug, Error)]
pub enum ProofGenerationError {
    #[error("proof service timed out after {0:?}")]
    Timeout(Duration),

    #[error("proof service unreachable: {0}")]
    Network(String),

    #[error("proof service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed proof envelope: {0}")]
    Malformed(String),
}

impl ProofGenerationError {
    pub fn stage(&self) -> Stage {
        match self {
            ProofGenerationError::Malformed(_) => Stage::Verify,
            _ => Stage::Dispatch,
        }
    }

    /// Whether a bounded retry may help. Malformed envelopes and client
    /// errors are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProofGenerationError::Timeout(_) | ProofGenerationError::Network(_) => true,
            ProofGenerationError::Status { status, .. } => *status >= 500,
            ProofGenerationError::Malformed(_) => false,
        }
    }
}

/// Attestation service errors. Never escalated past the orchestrator.
#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("attestation service timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to send request to attestation service: {0}")]
    Network(String),

    #[error("failed to submit proof: HTTP {status} - {body}")]
    Status { status: u16, body: String },

    #[error("attestation service rejected proof: {0}")]
    Rejected(String),

    #[error("no proof_id in response from attestation service")]
    MissingProofId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let names: Vec<&str> = [
            Stage::Resolve,
            Stage::Redact,
            Stage::Dispatch,
            Stage::Verify,
            Stage::Attest,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect();
        assert_eq!(names, vec!["resolve", "redact", "dispatch", "verify", "attest"]);
    }

    #[test]
    fn test_proxy_error_reports_stage() {
        let timeout: ProxyError = ProofGenerationError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(timeout.stage(), Stage::Dispatch);
        assert!(timeout.to_string().starts_with("dispatch stage failed"));

        let malformed: ProxyError = ProofGenerationError::Malformed("no proof".into()).into();
        assert_eq!(malformed.stage(), Stage::Verify);
        assert!(malformed.to_string().starts_with("verify stage failed"));

        let redaction: ProxyError = RedactionError::ShapeMismatch {
            selector: "$.a.b".into(),
            at: "$.a".into(),
            found: "string",
        }
        .into();
        assert_eq!(redaction.stage(), Stage::Redact);
        assert!(redaction.to_string().starts_with("redact stage failed"));

        let invalid = ProxyError::InvalidRequest("argument `name` clashes".into());
        assert_eq!(invalid.stage(), Stage::Resolve);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProofGenerationError::Network("refused".into()).is_retryable());
        assert!(ProofGenerationError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(ProofGenerationError::Status { status: 502, body: String::new() }.is_retryable());
        assert!(!ProofGenerationError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!ProofGenerationError::Malformed("x".into()).is_retryable());
    }
}
