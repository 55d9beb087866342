/// Tool option model
/// Validated per-tool redaction and extraction rules, built from the JSON form used in config files

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::json_path::JsonPath;
use crate::error::ProxyError;

lazy_static::lazy_static! {
    // Placeholder tokens are `{name}`, so names must not contain braces or whitespace
    static ref PARAMETER_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("parameter name pattern is valid");
}

/// Options exposed in the generated proof (visible to the verifier)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOptions {
    /// Overrides the HTTP method of the proxied request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Target fetch timeout in milliseconds, enforced by the proof service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Extra headers sent to the target
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// Extraction rule. Only values captured by these rules may be disclosed.
#[derive(Debug, Clone)]
pub enum ResponseMatch {
    Regex {
        pattern: Regex,
        named_groups: Vec<String>,
    },
    Contains {
        value: String,
    },
}

impl PartialEq for ResponseMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ResponseMatch::Regex { pattern: a, named_groups: ga },
                ResponseMatch::Regex { pattern: b, named_groups: gb },
            ) => a.as_str() == b.as_str() && ga == gb,
            (ResponseMatch::Contains { value: a }, ResponseMatch::Contains { value: b }) => a == b,
            _ => false,
        }
    }
}

impl ResponseMatch {
    /// Regex rule disclosing every named capture group of `pattern`
    pub fn regex(pattern: &str) -> Result<Self, ProxyError> {
        Self::regex_with_groups(pattern, None)
    }

    /// Regex rule disclosing only `groups`, each of which must exist in `pattern`
    pub fn regex_with_groups(pattern: &str, groups: Option<Vec<String>>) -> Result<Self, ProxyError> {
        let compiled = Regex::new(pattern).map_err(|e| {
            ProxyError::Configuration(format!("invalid response match regex `{}`: {}", pattern, e))
        })?;
        let declared: Vec<String> = compiled.capture_names().flatten().map(String::from).collect();

        let named_groups = match groups {
            Some(groups) => {
                if let Some(missing) = groups.iter().find(|g| !declared.contains(g)) {
                    return Err(ProxyError::Configuration(format!(
                        "named group `{}` does not exist in regex `{}`",
                        missing, pattern
                    )));
                }
                groups
            }
            None => declared,
        };

        Ok(ResponseMatch::Regex {
            pattern: compiled,
            named_groups,
        })
    }

    pub fn contains(value: impl Into<String>) -> Self {
        ResponseMatch::Contains { value: value.into() }
    }

    pub fn named_groups(&self) -> &[String] {
        match self {
            ResponseMatch::Regex { named_groups, .. } => named_groups,
            ResponseMatch::Contains { .. } => &[],
        }
    }

    /// Form sent to the proof service
    pub fn to_wire(&self) -> Value {
        match self {
            ResponseMatch::Regex { pattern, named_groups } => json!({
                "type": "regex",
                "value": pattern.as_str(),
                "namedGroups": named_groups,
            }),
            ResponseMatch::Contains { value } => json!({
                "type": "contains",
                "value": value,
            }),
        }
    }
}

/// Options hidden from the proof
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivateOptions {
    pub hidden_parameters: Vec<String>,
    pub response_matches: Vec<ResponseMatch>,
}

impl PrivateOptions {
    /// Directives only. Hidden values never leave the orchestrator.
    pub fn to_wire(&self) -> Value {
        json!({
            "hiddenParameters": self.hidden_parameters,
            "responseMatches": self
                .response_matches
                .iter()
                .map(ResponseMatch::to_wire)
                .collect::<Vec<_>>(),
        })
    }

    /// Every name the proof may disclose in `extractedParameterValues`
    pub fn disclosed_names(&self) -> Vec<&str> {
        self.response_matches
            .iter()
            .flat_map(|m| m.named_groups().iter().map(String::as_str))
            .collect()
    }
}

/// Tool-specific ZK proof configuration for the zkfetch wrapper
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawToolOptions")]
pub struct ZkfetchToolOptions {
    pub public_options: Option<PublicOptions>,
    pub private_options: PrivateOptions,
    /// Regions excluded from the proof entirely
    pub redactions: Vec<JsonPath>,
    /// Locations masked with `****` in the proof's display copy, keyed by label
    pub response_redaction_paths: BTreeMap<String, JsonPath>,
}

/// Type alias for tool-specific redaction options
pub type ToolOptionsMap = HashMap<String, ZkfetchToolOptions>;

impl ZkfetchToolOptions {
    /// Build options from their JSON form, validating every rule
    pub fn from_json(value: Value) -> Result<Self, ProxyError> {
        let raw: RawToolOptions = serde_json::from_value(value)
            .map_err(|e| ProxyError::Configuration(format!("invalid tool options: {}", e)))?;
        Self::try_from(raw)
    }

    /// True when the options neither hide, extract nor redact anything
    pub fn is_empty(&self) -> bool {
        self.public_options.is_none()
            && self.private_options.hidden_parameters.is_empty()
            && self.private_options.response_matches.is_empty()
            && self.redactions.is_empty()
            && self.response_redaction_paths.is_empty()
    }

    pub fn redactions_wire(&self) -> Value {
        Value::Array(
            self.redactions
                .iter()
                .map(|p| json!({ "jsonPath": p.as_str() }))
                .collect(),
        )
    }
}

/// JSON form of a response match, e.g. `{"type": "regex", "value": "...", "namedGroups": ["title"]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResponseMatch {
    #[serde(rename = "type", default = "default_match_type")]
    pub kind: String,
    pub value: String,
    #[serde(default, alias = "named_groups")]
    pub named_groups: Option<Vec<String>>,
}

fn default_match_type() -> String {
    "regex".to_string()
}

/// JSON form of a redaction, e.g. `{"jsonPath": "$.data.card_number"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRedaction {
    #[serde(alias = "json_path")]
    pub json_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrivateOptions {
    #[serde(default, alias = "hidden_parameters")]
    pub hidden_parameters: Vec<String>,
    #[serde(default, alias = "response_matches")]
    pub response_matches: Vec<RawResponseMatch>,
}

/// Loosely-typed tool options as written in config files.
/// Accepts both camelCase and snake_case keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawToolOptions {
    #[serde(default, alias = "public_options")]
    pub public_options: Option<PublicOptions>,
    #[serde(default, alias = "private_options")]
    pub private_options: Option<RawPrivateOptions>,
    #[serde(default)]
    pub redactions: Option<Vec<RawRedaction>>,
    #[serde(default, alias = "response_redaction_paths")]
    pub response_redaction_paths: Option<BTreeMap<String, String>>,
}

impl TryFrom<RawToolOptions> for ZkfetchToolOptions {
    type Error = ProxyError;

    fn try_from(raw: RawToolOptions) -> Result<Self, Self::Error> {
        let raw_private = raw.private_options.unwrap_or_default();

        // Ordered set: keep first occurrence
        let mut hidden_parameters: Vec<String> = Vec::new();
        for name in raw_private.hidden_parameters {
            if !PARAMETER_NAME.is_match(&name) {
                return Err(ProxyError::Configuration(format!(
                    "invalid hidden parameter name `{}`",
                    name
                )));
            }
            if !hidden_parameters.contains(&name) {
                hidden_parameters.push(name);
            }
        }

        let response_matches = raw_private
            .response_matches
            .into_iter()
            .map(|m| match m.kind.as_str() {
                "regex" => ResponseMatch::regex_with_groups(&m.value, m.named_groups),
                "contains" => Ok(ResponseMatch::contains(m.value)),
                other => Err(ProxyError::Configuration(format!(
                    "unsupported response match type `{}`",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let redactions = raw
            .redactions
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                JsonPath::parse(&r.json_path).map_err(|e| ProxyError::Configuration(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let response_redaction_paths = raw
            .response_redaction_paths
            .unwrap_or_default()
            .into_iter()
            .map(|(label, selector)| {
                JsonPath::parse(&selector)
                    .map(|path| (label, path))
                    .map_err(|e| ProxyError::Configuration(e.to_string()))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            public_options: raw.public_options,
            private_options: PrivateOptions {
                hidden_parameters,
                response_matches,
            },
            redactions,
            response_redaction_paths,
        })
    }
}

/// Tool options file: `{ "tools": { "<tool>": { ... } }, "default": { ... } }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolOptionsFile {
    #[serde(default)]
    pub tools: Option<ToolOptionsMap>,
    #[serde(default)]
    pub default: Option<ZkfetchToolOptions>,
}
