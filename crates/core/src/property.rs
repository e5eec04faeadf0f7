//! Property values and property paths.
//!
//! Resource inputs and outputs are JSON object maps. During previews and
//! delete-before-replace probing, values that cannot be known yet are
//! represented by the unknown sentinel.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// A resource's inputs or outputs: a JSON object keyed by property name.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Sentinel standing in for a value that is not yet known.
pub const UNKNOWN_VALUE_SENTINEL: &str = "<unknown>";

/// A fresh unknown value.
#[must_use]
pub fn unknown() -> Value {
    Value::String(UNKNOWN_VALUE_SENTINEL.to_string())
}

/// Whether `value` is exactly the unknown sentinel.
#[must_use]
pub fn is_unknown(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == UNKNOWN_VALUE_SENTINEL)
}

/// Whether `value` contains the unknown sentinel anywhere inside it.
#[must_use]
pub fn contains_unknowns(value: &Value) -> bool {
    match value {
        Value::String(s) => s == UNKNOWN_VALUE_SENTINEL,
        Value::Array(items) => items.iter().any(contains_unknowns),
        Value::Object(map) => map.values().any(contains_unknowns),
        _ => false,
    }
}

/// One segment of a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

/// A parsed property path such as `a.b[0].c` or `a["odd.key"]`.
///
/// Paths address values inside a [`PropertyMap`] and drive `ignoreChanges`
/// and `replaceOnChanges` handling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// The path's segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The top-level key the path starts at.
    #[must_use]
    pub fn root_key(&self) -> &str {
        match &self.segments[0] {
            PathSegment::Key(k) => k,
            // The parser never produces a leading index.
            PathSegment::Index(_) => "",
        }
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// Looks up the value addressed by this path, if present.
    #[must_use]
    pub fn lookup<'a>(&self, map: &'a PropertyMap) -> Option<&'a Value> {
        let mut current: Option<&Value> = None;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Key(k), None) => map.get(k),
                (PathSegment::Key(k), Some(Value::Object(obj))) => obj.get(k),
                (PathSegment::Index(i), Some(Value::Array(items))) => items.get(*i),
                _ => return None,
            };
            current?;
        }
        current
    }

    /// Stores `value` at this path, creating intermediate objects for key
    /// segments. Returns false when the path cannot be materialized (an index
    /// segment that has no existing slot, or a segment that contradicts the
    /// shape already present).
    pub fn store(&self, map: &mut PropertyMap, value: Value) -> bool {
        let Some((PathSegment::Key(k), rest)) = self.segments.split_first() else {
            return false;
        };
        if rest.is_empty() {
            map.insert(k.clone(), value);
            return true;
        }
        let slot = map
            .entry(k.clone())
            .or_insert_with(|| Value::Object(PropertyMap::new()));
        store_in(slot, rest, value)
    }

    /// Removes and returns the value addressed by this path, if present.
    pub fn take(&self, map: &mut PropertyMap) -> Option<Value> {
        let Some((PathSegment::Key(k), rest)) = self.segments.split_first() else {
            return None;
        };
        if rest.is_empty() {
            return map.remove(k);
        }
        take_in(map.get_mut(k)?, rest)
    }
}

fn store_in(target: &mut Value, segments: &[PathSegment], value: Value) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return false;
    };
    match (segment, target) {
        (PathSegment::Key(k), Value::Object(obj)) => {
            if rest.is_empty() {
                obj.insert(k.clone(), value);
                return true;
            }
            let slot = obj
                .entry(k.clone())
                .or_insert_with(|| Value::Object(PropertyMap::new()));
            store_in(slot, rest, value)
        }
        (PathSegment::Index(i), Value::Array(items)) => {
            if rest.is_empty() {
                if *i < items.len() {
                    items[*i] = value;
                    true
                } else if *i == items.len() {
                    items.push(value);
                    true
                } else {
                    false
                }
            } else {
                match items.get_mut(*i) {
                    Some(slot) => store_in(slot, rest, value),
                    None => false,
                }
            }
        }
        _ => false,
    }
}

fn take_in(target: &mut Value, segments: &[PathSegment]) -> Option<Value> {
    let (segment, rest) = segments.split_first()?;
    match (segment, target) {
        (PathSegment::Key(k), Value::Object(obj)) => {
            if rest.is_empty() {
                obj.remove(k)
            } else {
                take_in(obj.get_mut(k)?, rest)
            }
        }
        (PathSegment::Index(i), Value::Array(items)) => {
            if rest.is_empty() {
                if *i < items.len() {
                    Some(items.remove(*i))
                } else {
                    None
                }
            } else {
                take_in(items.get_mut(*i)?, rest)
            }
        }
        _ => None,
    }
}

impl FromStr for PropertyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let err = |message: &str| Error::InvalidPropertyPath {
            path: s.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    if segments.is_empty() {
                        return Err(err("path may not start with '.'"));
                    }
                    i += 1;
                    if i >= chars.len() {
                        return Err(err("path may not end with '.'"));
                    }
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .ok_or_else(|| err("unterminated '['"))?
                        + i;
                    let inner: String = chars[i + 1..close].iter().collect();
                    if let Some(quoted) = inner.strip_prefix('"') {
                        let key = quoted
                            .strip_suffix('"')
                            .ok_or_else(|| err("unterminated quoted key"))?;
                        if key.is_empty() {
                            return Err(err("empty quoted key"));
                        }
                        segments.push(PathSegment::Key(key.to_string()));
                    } else {
                        let index: usize = inner
                            .parse()
                            .map_err(|_| err("index must be a non-negative integer"))?;
                        segments.push(PathSegment::Index(index));
                    }
                    i = close + 1;
                    continue;
                }
                _ => {}
            }

            if i >= chars.len() || chars[i] == '[' {
                continue;
            }
            let start = i;
            while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                i += 1;
            }
            let key: String = chars[start..i].iter().collect();
            if key.is_empty() {
                return Err(err("empty key segment"));
            }
            segments.push(PathSegment::Key(key));
        }

        if segments.is_empty() {
            return Err(err("empty path"));
        }
        if matches!(segments[0], PathSegment::Index(_)) {
            return Err(err("path must start with a key"));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(k) => {
                    if k.contains('.') || k.contains('[') {
                        write!(f, "[\"{k}\"]")?;
                    } else if i == 0 {
                        write!(f, "{k}")?;
                    } else {
                        write!(f, ".{k}")?;
                    }
                }
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// Parses every path in `paths`, attributing failures to the original text.
///
/// # Errors
///
/// Returns the first parse failure.
pub fn parse_paths(paths: &[String]) -> Result<Vec<PropertyPath>> {
    paths.iter().map(|p| p.parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> PropertyPath {
        s.parse().unwrap()
    }

    fn map(value: Value) -> PropertyMap {
        match value {
            Value::Object(m) => m,
            _ => PropertyMap::new(),
        }
    }

    #[test]
    fn parses_keys_indexes_and_quoted_keys() {
        let p = path("a.b[0][\"odd.key\"].c");
        assert_eq!(p.segments().len(), 5);
        assert_eq!(p.root_key(), "a");
        assert_eq!(p.to_string(), "a.b[0][\"odd.key\"].c");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", ".a", "a.", "a[", "a[x]", "[0].a", "a[\"unterminated]"] {
            assert!(bad.parse::<PropertyPath>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let m = map(json!({"a": {"b": [{"c": 42}]}}));
        assert_eq!(path("a.b[0].c").lookup(&m), Some(&json!(42)));
        assert_eq!(path("a.b[1].c").lookup(&m), None);
        assert_eq!(path("a.x").lookup(&m), None);
    }

    #[test]
    fn store_creates_intermediate_objects() {
        let mut m = map(json!({}));
        assert!(path("a.b.c").store(&mut m, json!(1)));
        assert_eq!(path("a.b.c").lookup(&m), Some(&json!(1)));
        // Index past the end of an existing array is rejected.
        let mut m = map(json!({"xs": [1]}));
        assert!(!path("xs[5]").store(&mut m, json!(2)));
        assert!(path("xs[1]").store(&mut m, json!(2)));
    }

    #[test]
    fn take_removes_the_addressed_value() {
        let mut m = map(json!({"a": {"b": 1}, "xs": [1, 2]}));
        assert_eq!(path("a.b").take(&mut m), Some(json!(1)));
        assert_eq!(path("a.b").take(&mut m), None);
        assert_eq!(path("xs[0]").take(&mut m), Some(json!(1)));
        assert_eq!(path("xs[0]").lookup(&m), Some(&json!(2)));
    }

    #[test]
    fn prefix_matching() {
        assert!(path("a.b").is_prefix_of(&path("a.b[0].c")));
        assert!(path("a").is_prefix_of(&path("a")));
        assert!(!path("a.b").is_prefix_of(&path("a.c")));
        assert!(!path("a.b.c").is_prefix_of(&path("a.b")));
    }

    #[test]
    fn unknown_detection_is_recursive() {
        assert!(is_unknown(&unknown()));
        assert!(!is_unknown(&json!("known")));
        assert!(contains_unknowns(&json!({"a": [{"b": UNKNOWN_VALUE_SENTINEL}]})));
        assert!(!contains_unknowns(&json!({"a": [1, "two"]})));
    }
}
