/// Shared building blocks for the proxy
/// Tool options, redaction, the zkfetch client and the attestation client

pub mod json_path;
pub mod options;
pub mod proof;
pub mod proxy_fetch;
pub mod redaction;
pub mod tool_map;

pub use json_path::JsonPath;
pub use options::{PrivateOptions, PublicOptions, ResponseMatch, ToolOptionsMap, ZkfetchToolOptions};
pub use proof::{AttestationClient, CryptographicProof, ProofPayload};
pub use proxy_fetch::{ZkfetchClient, ZkfetchPayload, ZkfetchResponse};
pub use redaction::{ParamValues, RedactionMetadata};
pub use tool_map::{default_tool_options_map, resolve_tool_options, ToolSelection};
