//! Balanced-delimiter scanning over free-form text.
//!
//! Model output mixes prose, markdown fences and one or more JSON documents.
//! [`balanced_span`] finds where one JSON object (or array) ends by tracking
//! nesting depth, ignoring delimiters inside string literals. [`ObjectScan`]
//! wraps it with the two knobs the extractor needs: where to start looking
//! and which keys a candidate must carry.
//!
//! All delimiters are ASCII, so scanning bytes never lands inside a
//! multi-byte character and every returned range is a valid `str` boundary.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::ops::Range;

/// Pair of delimiters a balanced span is measured with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `{` .. `}`
    Brace,
    /// `[` .. `]`
    Bracket,
}

impl Delimiter {
    pub fn open(self) -> u8 {
        match self {
            Delimiter::Brace => b'{',
            Delimiter::Bracket => b'[',
        }
    }

    pub fn close(self) -> u8 {
        match self {
            Delimiter::Brace => b'}',
            Delimiter::Bracket => b']',
        }
    }
}

/// Byte range of the balanced span opening at `start`.
///
/// `text[start]` must be the opening delimiter. Returns `None` when it is
/// not, or when the text ends before depth returns to zero.
pub fn balanced_span(text: &str, start: usize, delim: Delimiter) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&delim.open()) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &byte) in bytes.iter().enumerate().skip(start) {
        if escape_next {
            escape_next = false;
            continue;
        }

        if in_string {
            match byte {
                b'\\' => escape_next = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        if byte == b'"' {
            in_string = true;
        } else if byte == delim.open() {
            depth += 1;
        } else if byte == delim.close() {
            depth -= 1;
            if depth == 0 {
                return Some(start..i + 1);
            }
        }
    }

    None
}

/// Configurable search for one balanced JSON object in text.
///
/// ```
/// use school_match::scan::ObjectScan;
///
/// let text = "说明 ```json\n{\"matched_schools\": []}\n";
/// let found = ObjectScan::new()
///     .start_after("```")
///     .require_any(&["matched_schools"])
///     .parse(text)
///     .unwrap();
/// assert!(found.contains_key("matched_schools"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectScan<'a> {
    start_after: Option<&'a str>,
    required_keys: &'a [&'a str],
}

impl<'a> ObjectScan<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin the search after the first occurrence of `marker`.
    /// When the marker is absent the scan finds nothing.
    pub fn start_after(mut self, marker: &'a str) -> Self {
        self.start_after = Some(marker);
        self
    }

    /// Accept a parsed object only if it carries at least one of `keys`
    /// with a non-null value. An empty list accepts any object.
    pub fn require_any(mut self, keys: &'a [&'a str]) -> Self {
        self.required_keys = keys;
        self
    }

    /// The first balanced `{ .. }` span after the start point
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        let offset = match self.start_after {
            Some(marker) => text.find(marker)? + marker.len(),
            None => 0,
        };
        let open = offset + text[offset..].find('{')?;
        balanced_span(text, open, Delimiter::Brace).map(|span| &text[span])
    }

    /// Finds, parses and key-checks the first balanced object.
    pub fn parse(&self, text: &str) -> Result<Map<String, Value>> {
        let span = self
            .find(text)
            .ok_or_else(|| Error::extraction("no balanced object"))?;
        let object = parse_object(span)?;
        if self.accepts(&object) {
            Ok(object)
        } else {
            Err(Error::extraction(format!(
                "object has none of {:?}",
                self.required_keys
            )))
        }
    }

    pub fn accepts(&self, object: &Map<String, Value>) -> bool {
        self.required_keys.is_empty()
            || self
                .required_keys
                .iter()
                .any(|key| object.get(*key).is_some_and(|v| !v.is_null()))
    }
}

/// Parses `text` as a JSON object; arrays and scalars are extraction failures.
pub fn parse_object(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(Error::extraction(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::extraction(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
