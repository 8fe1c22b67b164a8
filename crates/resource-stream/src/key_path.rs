//! # Key-Path Navigator
//!
//! Bracketed dotted paths (`address[geo][lat]`, `tags[0]`) addressing a field
//! inside a nested JSON value. Paths are parsed once, when an adapter or a
//! unique key is registered, so a malformed path is a
//! [`ConfigurationError`] at setup time and navigation itself never fails:
//! a missing segment simply resolves to `None`.
//!
//! Objects are indexed by key, arrays by a segment that parses as `usize`.

use crate::error::ConfigurationError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A parsed `head[seg1][seg2]...` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parses a bracket path.
    ///
    /// Whitespace inside brackets is trimmed (`a[ b ]` is `a[b]`). The head and
    /// every segment must be non-empty and brackets may not nest.
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let (head, mut rest) = match raw.find(|c: char| c == '[' || c == ']') {
            Some(i) => (&raw[..i], &raw[i..]),
            None => (raw, ""),
        };
        let head = head.trim();
        if head.is_empty() {
            return Err(ConfigurationError::EmptyHead(raw.to_string()));
        }

        let mut segments = vec![head.to_string()];
        while !rest.is_empty() {
            let Some(body) = rest.strip_prefix('[') else {
                return Err(if rest.starts_with(']') {
                    ConfigurationError::UnbalancedBrackets(raw.to_string())
                } else {
                    ConfigurationError::TrailingInput(raw.to_string())
                });
            };
            let close = body
                .find(']')
                .ok_or_else(|| ConfigurationError::UnbalancedBrackets(raw.to_string()))?;
            let segment = &body[..close];
            if segment.contains('[') {
                return Err(ConfigurationError::UnbalancedBrackets(raw.to_string()));
            }
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(ConfigurationError::EmptySegment(raw.to_string()));
            }
            segments.push(segment.to_string());
            rest = &body[close + 1..];
        }

        Ok(Self { segments })
    }

    /// A single-segment path, no parsing involved.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: vec![key.into()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// The segment naming the addressed field inside its container.
    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// The value at this path, or `None` if any segment is missing.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |container, segment| step(container, segment))
    }

    /// Every container visited on the way down, followed by the final value.
    ///
    /// The first element is `root` itself, so the result always has
    /// `segments().len() + 1` entries.
    pub fn trail<'a>(&self, root: &'a Value) -> Option<Vec<&'a Value>> {
        let mut trail = Vec::with_capacity(self.segments.len() + 1);
        trail.push(root);
        let mut pointer = root;
        for segment in &self.segments {
            pointer = step(pointer, segment)?;
            trail.push(pointer);
        }
        Some(trail)
    }

    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        let mut pointer = root;
        for segment in &self.segments {
            pointer = step_mut(pointer, segment)?;
        }
        Some(pointer)
    }

    /// The container holding the addressed field (it may not hold the field
    /// itself).
    pub fn parent_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        let mut pointer = root;
        for segment in &self.segments[..self.segments.len() - 1] {
            pointer = step_mut(pointer, segment)?;
        }
        Some(pointer)
    }
}

fn step<'a>(container: &'a Value, segment: &str) -> Option<&'a Value> {
    match container {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(container: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match container {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

impl FromStr for KeyPath {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.head())?;
        for segment in &self.segments[1..] {
            write!(f, "[{segment}]")?;
        }
        Ok(())
    }
}

impl Default for KeyPath {
    fn default() -> Self {
        Self::key("id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_path() {
        let path = KeyPath::parse("address[ geo ][lat]").unwrap();
        assert_eq!(path.segments(), ["address", "geo", "lat"]);
        assert_eq!(path.to_string(), "address[geo][lat]");
        assert_eq!(path.last(), "lat");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(matches!(
            KeyPath::parse("a[b"),
            Err(ConfigurationError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            KeyPath::parse("a]b"),
            Err(ConfigurationError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            KeyPath::parse("a[b[c]]"),
            Err(ConfigurationError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            KeyPath::parse("a[]"),
            Err(ConfigurationError::EmptySegment(_))
        ));
        assert!(matches!(
            KeyPath::parse("[a]"),
            Err(ConfigurationError::EmptyHead(_))
        ));
        assert!(matches!(
            KeyPath::parse("a[b]c"),
            Err(ConfigurationError::TrailingInput(_))
        ));
    }

    #[test]
    fn test_resolve_through_objects_and_arrays() {
        let doc = json!({"tags": [{"name": "rust"}, {"name": "tokio"}]});
        let path = KeyPath::parse("tags[1][name]").unwrap();
        assert_eq!(path.resolve(&doc), Some(&json!("tokio")));

        let missing = KeyPath::parse("tags[7][name]").unwrap();
        assert_eq!(missing.resolve(&doc), None);

        let through_scalar = KeyPath::parse("tags[0][name][x]").unwrap();
        assert_eq!(through_scalar.resolve(&doc), None);
    }

    #[test]
    fn test_trail_lists_every_container() {
        let doc = json!({"a": {"b": 3}});
        let trail = KeyPath::parse("a[b]").unwrap().trail(&doc).unwrap();
        assert_eq!(trail, vec![&doc, &json!({"b": 3}), &json!(3)]);
    }

    #[test]
    fn test_parent_mut_allows_writing_new_keys() {
        let mut doc = json!({"a": {"b": 3}});
        let path = KeyPath::parse("a[c]").unwrap();
        assert!(path.resolve(&doc).is_none());
        let parent = path.parent_mut(&mut doc).unwrap();
        parent["c"] = json!(4);
        assert_eq!(doc, json!({"a": {"b": 3, "c": 4}}));
    }
}
