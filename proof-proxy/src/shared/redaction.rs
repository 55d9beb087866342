/// Redaction engine
/// Masks hidden parameters before dispatch, restores them for the caller,
/// and enforces path exclusions and extraction limits on the proof copy

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::json_path::{remove_at, render_path, value_at_mut, JsonPath, PathStep};
use super::options::ResponseMatch;
use crate::error::RedactionError;

/// Mask written over display-redacted values
pub const DISPLAY_MASK: &str = "****";

/// Placeholder substituted for a hidden value
pub fn placeholder(name: &str) -> String {
    format!("{{{}}}", name)
}

/// Original values of masked fields for one call.
///
/// Deliberately not `Serialize`, and `Debug` prints names only.
#[derive(Default, Clone, PartialEq)]
pub struct ParamValues(BTreeMap<String, Value>);

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Plaintext form of every held value, used to check outgoing payloads
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    /// First occurrence wins, so a repeated query key keeps its first value
    fn insert(&mut self, name: &str, value: Value) {
        self.0.entry(name.to_string()).or_insert(value);
    }
}

impl fmt::Debug for ParamValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Metadata tracking which fields were redacted from a proof
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedactionMetadata {
    /// Number of response regions excluded from the proof
    pub redacted_field_count: usize,
    /// Concrete paths that were excluded, e.g. `$.slideshow`
    pub redacted_paths: Vec<String>,
    /// Hidden request parameters that were replaced by placeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_parameters: Vec<String>,
    /// Whether anything was excluded or masked
    pub was_redacted: bool,
}

impl RedactionMetadata {
    pub fn new(redacted_paths: Vec<String>, param_values: &ParamValues) -> Self {
        let masked_parameters: Vec<String> = param_values.names().map(String::from).collect();
        Self {
            redacted_field_count: redacted_paths.len(),
            was_redacted: !redacted_paths.is_empty() || !masked_parameters.is_empty(),
            redacted_paths,
            masked_parameters,
        }
    }
}

/// A request after masking. Holds the only copy of the hidden values.
#[derive(Debug)]
pub struct MaskedRequest {
    pub url: String,
    pub body: Option<Value>,
    pub param_values: ParamValues,
}

/// Mask hidden parameters in both the URL query string and the body.
///
/// Consumes the body so the hidden values end up only in `param_values`.
pub fn mask_request(url: &str, body: Option<Value>, hidden: &[String]) -> MaskedRequest {
    let mut param_values = ParamValues::new();
    if hidden.is_empty() {
        return MaskedRequest {
            url: url.to_string(),
            body,
            param_values,
        };
    }

    let url = mask_url(url, hidden, &mut param_values);
    let body = body.map(|b| mask_body(b, hidden, &mut param_values));

    MaskedRequest {
        url,
        body,
        param_values,
    }
}

/// Mask hidden fields of a request body.
///
/// JSON-RPC `tools/call` envelopes are masked inside `params.arguments`,
/// anything else at the top level. Non-object bodies pass through.
pub fn mask_body(mut body: Value, hidden: &[String], param_values: &mut ParamValues) -> Value {
    if let Some(scope) = argument_scope(&mut body) {
        for name in hidden {
            if let Some(slot) = scope.get_mut(name) {
                let original = std::mem::replace(slot, Value::String(placeholder(name)));
                param_values.insert(name, original);
            }
        }
    }
    body
}

fn argument_scope(body: &mut Value) -> Option<&mut Map<String, Value>> {
    let has_arguments = body
        .get("params")
        .and_then(|p| p.get("arguments"))
        .map(Value::is_object)
        .unwrap_or(false);

    if has_arguments {
        body.get_mut("params")?.get_mut("arguments")?.as_object_mut()
    } else {
        body.as_object_mut()
    }
}

/// Mask hidden query parameters, preserving every other byte of the URL
pub fn mask_url(url: &str, hidden: &[String], param_values: &mut ParamValues) -> String {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (url, None),
    };
    let Some((base, query)) = without_fragment.split_once('?') else {
        return url.to_string();
    };

    let mut modified = false;
    let parts: Vec<String> = query
        .split('&')
        .map(|pair| {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key);
            if hidden.iter().any(|h| *h == key) {
                param_values.insert(&key, Value::String(decode_component(raw_value)));
                modified = true;
                format!("{}={}", raw_key, placeholder(&key))
            } else {
                pair.to_string()
            }
        })
        .collect();

    if !modified {
        return url.to_string();
    }

    let mut masked = format!("{}?{}", base, parts.join("&"));
    if let Some(frag) = fragment {
        masked.push('#');
        masked.push_str(frag);
    }
    masked
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Restore hidden values in a caller-visible result.
///
/// Only object entries whose key is a hidden name and whose value is
/// exactly that name's placeholder are restored. Text that merely contains a
/// placeholder is left alone.
pub fn unmask(value: &mut Value, param_values: &ParamValues) {
    if param_values.is_empty() {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if let Some(original) = param_values.get(key) {
                    if child.as_str() == Some(placeholder(key).as_str()) {
                        *child = original.clone();
                        continue;
                    }
                }
                unmask(child, param_values);
            }
        }
        Value::Array(items) => {
            for item in items {
                unmask(item, param_values);
            }
        }
        _ => {}
    }
}

/// Remove every region selected by `redactions` from the proof copy of a
/// response. Returns the removed paths.
///
/// Overlapping selectors form a union: all selectors are resolved against
/// the untouched document first, locations covered by a selected ancestor
/// are dropped, and the rest are removed highest index first.
pub fn exclude_regions(
    response: &mut Value,
    redactions: &[JsonPath],
) -> Result<Vec<String>, RedactionError> {
    let mut targets: Vec<Vec<PathStep>> = Vec::new();
    for selector in redactions {
        targets.extend(selector.resolve(response)?);
    }

    targets.sort();
    targets.dedup();
    let targets: Vec<Vec<PathStep>> = targets
        .iter()
        .filter(|path| {
            !targets
                .iter()
                .any(|other| other.len() < path.len() && path.starts_with(other))
        })
        .cloned()
        .collect();

    let mut removed = Vec::with_capacity(targets.len());
    for path in targets.iter().rev() {
        if remove_at(response, path) {
            removed.push(render_path(path));
        }
    }
    removed.reverse();
    Ok(removed)
}

/// Copy of a caller-facing result for display, with every location named by
/// `paths` overwritten by `****`.
///
/// Display redaction is cosmetic, so paths that do not resolve are skipped
/// with a warning instead of failing the call. Returns the masked paths.
pub fn redact_for_display(result: &Value, paths: &BTreeMap<String, JsonPath>) -> (Value, Vec<String>) {
    let mut display = result.clone();
    let mut masked = Vec::new();
    for (label, selector) in paths {
        let locations = match selector.resolve(&display) {
            Ok(locations) => locations,
            Err(e) => {
                tracing::warn!("[REDACTION] Skipping display path {}: {}", label, e);
                continue;
            }
        };
        for location in locations {
            if let Some(slot) = value_at_mut(&mut display, &location) {
                *slot = Value::String(DISPLAY_MASK.to_string());
                masked.push(render_path(&location));
            }
        }
    }
    masked.sort();
    masked.dedup();
    (display, masked)
}

/// Keep only extracted values whose names a response match declares
pub fn disclose_extracted(
    extracted: BTreeMap<String, Value>,
    response_matches: &[ResponseMatch],
) -> BTreeMap<String, Value> {
    extracted
        .into_iter()
        .filter(|(name, _)| {
            let declared = response_matches
                .iter()
                .any(|m| m.named_groups().iter().any(|g| g == name));
            if !declared {
                tracing::warn!("[REDACTION] Dropping undeclared extracted value: {}", name);
            }
            declared
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hidden(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mask_body_top_level() {
        let mut values = ParamValues::new();
        let masked = mask_body(
            json!({"name": "book-flight", "passenger_name": "John Doe", "from": "NYC"}),
            &hidden(&["passenger_name", "cvv"]),
            &mut values,
        );
        assert_eq!(masked["passenger_name"], "{passenger_name}");
        assert_eq!(masked["from"], "NYC");
        assert_eq!(values.get("passenger_name"), Some(&json!("John Doe")));
        assert!(values.get("cvv").is_none());
    }

    #[test]
    fn test_mask_body_json_rpc_arguments() {
        let mut values = ParamValues::new();
        let masked = mask_body(
            json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {"name": "book-flight", "arguments": {"passenger_email": "john@example.com"}}
            }),
            &hidden(&["passenger_email"]),
            &mut values,
        );
        assert_eq!(masked["params"]["arguments"]["passenger_email"], "{passenger_email}");
        assert_eq!(values.get("passenger_email"), Some(&json!("john@example.com")));
    }

    #[test]
    fn test_mask_url_query() {
        let mut values = ParamValues::new();
        let masked = mask_url(
            "https://api.example.com/v1/weather?city=Paris&api_key=s3cr%20t&units=metric#top",
            &hidden(&["api_key"]),
            &mut values,
        );
        assert_eq!(
            masked,
            "https://api.example.com/v1/weather?city=Paris&api_key={api_key}&units=metric#top"
        );
        assert_eq!(values.get("api_key"), Some(&json!("s3cr t")));
    }

    #[test]
    fn test_mask_url_without_query_is_untouched() {
        let mut values = ParamValues::new();
        let url = "https://httpbin.org/json";
        assert_eq!(mask_url(url, &hidden(&["api_key"]), &mut values), url);
        assert!(values.is_empty());
    }

    #[test]
    fn test_repeated_query_key_keeps_first_value() {
        let mut values = ParamValues::new();
        let masked = mask_url(
            "https://api.example.com/search?tag=a&q=x&tag=b",
            &hidden(&["tag"]),
            &mut values,
        );
        assert_eq!(masked, "https://api.example.com/search?tag={tag}&q=x&tag={tag}");
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("tag"), Some(&json!("a")));
    }

    #[test]
    fn test_unmask_ignores_embedded_placeholders() {
        let mut values = ParamValues::new();
        values.insert("a", json!("alpha"));
        values.insert("b", json!("beta"));

        let mut result = json!({
            "a": "{a}",
            "b": "value mentions {a} literally",
            "nested": [{"a": "{a}"}, {"c": "{a}"}]
        });
        unmask(&mut result, &values);

        assert_eq!(
            result,
            json!({
                "a": "alpha",
                "b": "value mentions {a} literally",
                "nested": [{"a": "alpha"}, {"c": "{a}"}]
            })
        );
    }

    #[test]
    fn test_param_values_debug_hides_values() {
        let mut values = ParamValues::new();
        values.insert("passenger_name", json!("John Doe"));
        let printed = format!("{:?}", values);
        assert!(printed.contains("passenger_name"));
        assert!(!printed.contains("John Doe"));
    }

    #[test]
    fn test_exclude_overlapping_selectors_is_union() {
        let mut response = json!({
            "slideshow": {"title": "Sample", "slides": [1, 2]},
            "items": ["a", "b", "c", "d"],
            "keep": true
        });
        let selectors = vec![
            JsonPath::parse("$.slideshow.slides").unwrap(),
            JsonPath::parse("$.slideshow").unwrap(),
            JsonPath::parse("$.items[1]").unwrap(),
            JsonPath::parse("$.items[3]").unwrap(),
        ];

        let removed = exclude_regions(&mut response, &selectors).unwrap();

        assert_eq!(response, json!({"items": ["a", "c"], "keep": true}));
        assert_eq!(removed, vec!["$.items[1]", "$.items[3]", "$.slideshow"]);
    }

    #[test]
    fn test_exclude_shape_mismatch_fails() {
        let mut response = json!({"data": [1, 2]});
        let selectors = vec![JsonPath::parse("$.data.card_number").unwrap()];
        assert!(matches!(
            exclude_regions(&mut response, &selectors),
            Err(RedactionError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_display_redaction_masks_and_skips() {
        let mut paths = BTreeMap::new();
        paths.insert("email".to_string(), JsonPath::parse("$.passenger.email").unwrap());
        paths.insert("seats".to_string(), JsonPath::parse("$.seats[*].holder").unwrap());
        paths.insert("missing".to_string(), JsonPath::parse("$.loyalty.number").unwrap());
        paths.insert("wrong_shape".to_string(), JsonPath::parse("$.booking_id.code").unwrap());

        let result = json!({
            "booking_id": "BK-1042",
            "passenger": {"name": "John Doe", "email": "john@example.com"},
            "seats": [{"holder": "John Doe", "seat": "12A"}]
        });
        let (display, masked) = redact_for_display(&result, &paths);

        assert_eq!(
            display,
            json!({
                "booking_id": "BK-1042",
                "passenger": {"name": "John Doe", "email": "****"},
                "seats": [{"holder": "****", "seat": "12A"}]
            })
        );
        assert_eq!(masked, vec!["$.passenger.email", "$.seats[0].holder"]);
        assert_eq!(result["passenger"]["email"], "john@example.com");
    }

    #[test]
    fn test_disclose_extracted_drops_undeclared() {
        let matches = vec![ResponseMatch::regex("\"title\":\\s*\"(?<title>[^\"]+)\"").unwrap()];
        let mut extracted = BTreeMap::new();
        extracted.insert("title".to_string(), json!("Wake up to WonderWidgets!"));
        extracted.insert("author".to_string(), json!("Yours Truly"));

        let disclosed = disclose_extracted(extracted, &matches);
        assert_eq!(disclosed.len(), 1);
        assert_eq!(disclosed["title"], "Wake up to WonderWidgets!");
    }

    #[test]
    fn test_redaction_metadata() {
        let mut values = ParamValues::new();
        values.insert("cvv", json!("123"));
        let meta = RedactionMetadata::new(vec!["$.slideshow".into()], &values);
        assert_eq!(meta.redacted_field_count, 1);
        assert_eq!(meta.masked_parameters, vec!["cvv"]);
        assert!(meta.was_redacted);
        assert!(!RedactionMetadata::new(vec![], &ParamValues::new()).was_redacted);
    }
}
