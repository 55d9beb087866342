/// Proof-enabled request proxy library
/// Forwards HTTP calls and tool invocations through a zkfetch wrapper so every
/// response comes back with a proof, masking sensitive parameters on the way out

pub mod config;
pub mod error;
pub mod orchestration;
pub mod shared;

pub use config::{AttestationConfig, ProxyConfig, ProxyKind};
pub use error::{ProxyError, ProxyResult, Stage};
pub use orchestration::{
    AttestationOutcome, CallWarning, CallerResponse, OutboundRequest, ProxiedResult, ProxyFetch,
};
pub use shared::{CryptographicProof, RedactionMetadata, ZkfetchToolOptions};
