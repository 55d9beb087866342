/// Tool options mapping module
/// Decides which redaction rules apply to a proxied request

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::options::{PrivateOptions, ToolOptionsMap, ZkfetchToolOptions};

/// Options used for body-bearing calls whose tool has no entry
static EMPTY_OPTIONS: ZkfetchToolOptions = ZkfetchToolOptions {
    public_options: None,
    private_options: PrivateOptions {
        hidden_parameters: Vec::new(),
        response_matches: Vec::new(),
    },
    redactions: Vec::new(),
    response_redaction_paths: BTreeMap::new(),
};

/// Which selection path a request takes. Computed once per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSelection {
    /// Body names a tool: key off tool identity
    ByTool(String),
    /// Body present but no tool name could be extracted
    Anonymous,
    /// No body (GET/HEAD/DELETE or direct fetch): key off the static default
    NoBody,
}

impl ToolSelection {
    pub fn from_body(body: Option<&Value>) -> Self {
        match body {
            None => ToolSelection::NoBody,
            Some(body) => match extract_tool_name(body) {
                Some(name) => ToolSelection::ByTool(name.to_string()),
                None => ToolSelection::Anonymous,
            },
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            ToolSelection::ByTool(name) => Some(name),
            _ => None,
        }
    }
}

/// Extracts the tool name from a request body
///
/// Looks at `name`, then `params.name`, then `params.toolName`.
pub fn extract_tool_name(body: &Value) -> Option<&str> {
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        return Some(name);
    }

    let params = body.get("params")?;
    params
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| params.get("toolName").and_then(Value::as_str))
}

/// Resolves the options for one call
///
/// Body-bearing calls use the tool map only; a missing entry means no
/// redaction. Bodyless calls use the default only. The two are never merged.
pub fn resolve_tool_options<'a>(
    selection: &ToolSelection,
    tool_options_map: Option<&'a ToolOptionsMap>,
    default_options: Option<&'a ZkfetchToolOptions>,
) -> &'a ZkfetchToolOptions {
    match selection {
        ToolSelection::ByTool(name) => tool_options_map
            .and_then(|map| map.get(name))
            .unwrap_or(&EMPTY_OPTIONS),
        ToolSelection::Anonymous => &EMPTY_OPTIONS,
        ToolSelection::NoBody => default_options.unwrap_or(&EMPTY_OPTIONS),
    }
}

/// Built-in map used when no tool options file is configured
///
/// - **get-ticket-price**: No redactions (pricing is public info)
/// - **book-flight**: Hides passenger_name and passenger_email from the proof and its display copy
/// - **enroll-card**: Hides card details and reveals only the token id
pub fn default_tool_options_map() -> ToolOptionsMap {
    let mut map = ToolOptionsMap::new();

    map.insert("get-ticket-price".to_string(), ZkfetchToolOptions::default());

    map.insert(
        "book-flight".to_string(),
        ZkfetchToolOptions::from_json(json!({
            "privateOptions": {
                "hiddenParameters": ["passenger_name", "passenger_email"],
                "responseMatches": [{
                    "type": "regex",
                    "value": "\"booking_id\"\\s*:\\s*\"(?<booking_id>[^\"]+)\""
                }]
            },
            "responseRedactionPaths": {
                "passenger_name": "$.passenger_name",
                "passenger_email": "$.passenger_email"
            }
        }))
        .expect("built-in book-flight options are valid"),
    );

    map.insert(
        "enroll-card".to_string(),
        ZkfetchToolOptions::from_json(json!({
            "privateOptions": {
                "hiddenParameters": ["card_number", "cvv", "expiry"],
                "responseMatches": [{
                    "type": "regex",
                    "value": "\"tokenId\"\\s*:\\s*\"(?<tokenId>[^\"]+)\""
                }]
            },
            "redactions": [{"jsonPath": "$.data.clientReferenceId"}]
        }))
        .expect("built-in enroll-card options are valid"),
    );

    map
}
