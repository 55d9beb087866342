/// JSONPath-style selectors used by `redactions`
/// Supports the subset the proof service accepts: `$`, `.key`, `['key']`, `[n]`, `[*]` and `.*`

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::error::RedactionError;

/// One parsed selector segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// One step of a concrete location inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PartialOrd for PathStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathStep {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PathStep::Key(a), PathStep::Key(b)) => a.cmp(b),
            (PathStep::Index(a), PathStep::Index(b)) => a.cmp(b),
            (PathStep::Key(_), PathStep::Index(_)) => Ordering::Less,
            (PathStep::Index(_), PathStep::Key(_)) => Ordering::Greater,
        }
    }
}

/// Render a concrete location back to selector syntax, e.g. `$.data.items[2]`
pub fn render_path(steps: &[PathStep]) -> String {
    let mut out = String::from("$");
    for step in steps {
        match step {
            PathStep::Key(key) if is_plain_key(key) => {
                out.push('.');
                out.push_str(key);
            }
            PathStep::Key(key) => {
                out.push_str("['");
                out.push_str(&key.replace('\'', "\\'"));
                out.push_str("']");
            }
            PathStep::Index(i) => out.push_str(&format!("[{}]", i)),
        }
    }
    out
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A validated path selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse selector text. Errors are reported at configuration load.
    pub fn parse(selector: &str) -> Result<Self, RedactionError> {
        let invalid = |reason: &str| RedactionError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = selector.trim();
        let rest = trimmed
            .strip_prefix('$')
            .ok_or_else(|| invalid("selector must start with `$`"))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    let key: String = chars[start..i].iter().collect();
                    match key.as_str() {
                        "" => return Err(invalid("empty segment after `.`")),
                        "*" => segments.push(Segment::Wildcard),
                        _ if key.contains(']') => return Err(invalid("unexpected `]`")),
                        _ => segments.push(Segment::Key(key)),
                    }
                }
                '[' => {
                    i += 1;
                    let quote = match chars.get(i) {
                        Some(&c) if c == '\'' || c == '"' => Some(c),
                        _ => None,
                    };

                    if let Some(q) = quote {
                        i += 1;
                        let mut key = String::new();
                        loop {
                            match chars.get(i) {
                                None => return Err(invalid("unterminated quoted key")),
                                Some('\\') if chars.get(i + 1) == Some(&q) => {
                                    key.push(q);
                                    i += 2;
                                }
                                Some(&c) if c == q => {
                                    i += 1;
                                    break;
                                }
                                Some(&c) => {
                                    key.push(c);
                                    i += 1;
                                }
                            }
                        }
                        if chars.get(i) != Some(&']') {
                            return Err(invalid("expected `]` after quoted key"));
                        }
                        i += 1;
                        segments.push(Segment::Key(key));
                    } else {
                        let start = i;
                        while i < chars.len() && chars[i] != ']' {
                            i += 1;
                        }
                        if i >= chars.len() {
                            return Err(invalid("unterminated `[`"));
                        }
                        let inner: String = chars[start..i].iter().collect();
                        i += 1;
                        let inner = inner.trim();
                        if inner == "*" {
                            segments.push(Segment::Wildcard);
                        } else {
                            let index = inner
                                .parse::<usize>()
                                .map_err(|_| invalid("array index must be a non-negative integer"))?;
                            segments.push(Segment::Index(index));
                        }
                    }
                }
                other => {
                    return Err(invalid(&format!("unexpected character `{}`", other)));
                }
            }
        }

        Ok(Self {
            source: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve the selector to every concrete location it names in `doc`.
    ///
    /// A key or index that does not exist selects nothing. Walking through a
    /// value of the wrong kind (a key on an array, anything on a scalar) is a
    /// shape mismatch.
    pub fn resolve(&self, doc: &Value) -> Result<Vec<Vec<PathStep>>, RedactionError> {
        let mut found = Vec::new();
        self.walk(doc, 0, &mut Vec::new(), &mut found)?;
        Ok(found)
    }

    fn walk(
        &self,
        node: &Value,
        depth: usize,
        prefix: &mut Vec<PathStep>,
        found: &mut Vec<Vec<PathStep>>,
    ) -> Result<(), RedactionError> {
        let Some(segment) = self.segments.get(depth) else {
            found.push(prefix.clone());
            return Ok(());
        };

        match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => {
                if let Some(child) = map.get(key) {
                    prefix.push(PathStep::Key(key.clone()));
                    self.walk(child, depth + 1, prefix, found)?;
                    prefix.pop();
                }
                Ok(())
            }
            (Segment::Index(index), Value::Array(items)) => {
                if let Some(child) = items.get(*index) {
                    prefix.push(PathStep::Index(*index));
                    self.walk(child, depth + 1, prefix, found)?;
                    prefix.pop();
                }
                Ok(())
            }
            (Segment::Wildcard, Value::Object(map)) => {
                for (key, child) in map {
                    prefix.push(PathStep::Key(key.clone()));
                    self.walk(child, depth + 1, prefix, found)?;
                    prefix.pop();
                }
                Ok(())
            }
            (Segment::Wildcard, Value::Array(items)) => {
                for (index, child) in items.iter().enumerate() {
                    prefix.push(PathStep::Index(index));
                    self.walk(child, depth + 1, prefix, found)?;
                    prefix.pop();
                }
                Ok(())
            }
            // Absent regions are already excluded
            (_, Value::Null) => Ok(()),
            (_, other) => Err(RedactionError::ShapeMismatch {
                selector: self.source.clone(),
                at: render_path(prefix),
                found: kind_of(other),
            }),
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Remove the value at a concrete location. Returns whether anything was removed.
pub fn remove_at(doc: &mut Value, steps: &[PathStep]) -> bool {
    let Some((last, parents)) = steps.split_last() else {
        *doc = Value::Null;
        return true;
    };

    let mut current = doc;
    for step in parents {
        let next = match (step, current) {
            (PathStep::Key(key), Value::Object(map)) => map.get_mut(key),
            (PathStep::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        };
        match next {
            Some(child) => current = child,
            None => return false,
        }
    }

    match (last, current) {
        (PathStep::Key(key), Value::Object(map)) => map.remove(key).is_some(),
        (PathStep::Index(i), Value::Array(items)) if *i < items.len() => {
            items.remove(*i);
            true
        }
        _ => false,
    }
}

/// Mutable reference to the value at a concrete location
pub fn value_at_mut<'a>(doc: &'a mut Value, steps: &[PathStep]) -> Option<&'a mut Value> {
    steps.iter().try_fold(doc, |current, step| match (step, current) {
        (PathStep::Key(key), Value::Object(map)) => map.get_mut(key),
        (PathStep::Index(i), Value::Array(items)) => items.get_mut(*i),
        _ => None,
    })
}
