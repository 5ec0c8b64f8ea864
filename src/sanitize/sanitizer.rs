// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Generic recursive sanitizer.
//!
//! # Depth
//!
//! A value's depth is the number of mappings enclosing it, so the fields of
//! the root document sit at depth 1. A mapping value found at
//! `depth >= max_depth` is flattened into a single level, which keeps every
//! mapping of the output at nesting level `<= max_depth`. Sequences do not
//! add depth.
//!
//! ```text
//! max_depth = 3
//!
//! {a: {b: {c: {d: 1, e: {f: 2}}}}}
//!  └ a (1) └ b (2) └ c (3, flattened) → {a: {b: {c: {d: 1, e_f: 2}}}}
//! ```

use serde::Serialize;

use crate::value::{format_date, Mapping, Value};

/// Field every sanitized document carries.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    /// Deepest mapping nesting level allowed in the output
    pub max_depth: usize,
    /// Drop null / empty string / empty sequence / empty mapping values
    pub remove_empty: bool,
    /// Attribute holding the store-native identity, renamed to `id`
    pub primary_key_field: String,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            remove_empty: true,
            primary_key_field: "_id".to_string(),
        }
    }
}

/// Depth-bounded, key-safe projection of a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SanitizedDocument(Mapping);

impl SanitizedDocument {
    pub fn new(fields: Mapping) -> Self {
        Self(fields)
    }

    /// The document's id, `None` when absent or blank.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn fields(&self) -> &Mapping {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Dotted-path lookup (`location.state`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.0.get(head)?;
        match rest {
            Some(rest) => value.get_path(rest),
            None => Some(value),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        Value::Mapping(self.0.clone()).to_json()
    }
}

/// Deterministic, side-effect-free record normalizer.
#[derive(Debug, Clone, Default)]
pub struct DocumentSanitizer {
    options: SanitizeOptions,
}

impl DocumentSanitizer {
    pub fn new(options: SanitizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SanitizeOptions {
        &self.options
    }

    /// Restrict a key to `[A-Za-z0-9_.-]`: other characters become `_`,
    /// runs of `_` collapse, leading/trailing `_` are stripped.
    ///
    /// ```
    /// use market_search::DocumentSanitizer;
    ///
    /// assert_eq!(DocumentSanitizer::sanitize_key("a b$c"), "a_b_c");
    /// assert_eq!(DocumentSanitizer::sanitize_key("__x__"), "x");
    /// ```
    pub fn sanitize_key(key: &str) -> String {
        let mut out = String::with_capacity(key.len());
        for c in key.chars() {
            let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            };
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        }
        out.trim_matches('_').to_string()
    }

    /// Trim strings and coerce the numeric-looking ones (`^\d+\.?\d*$`) to
    /// numbers. Non-finite numbers become null.
    pub fn sanitize_primitive(value: &Value) -> Value {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if looks_numeric(trimmed) {
                    if let Ok(n) = trimmed.parse::<f64>() {
                        if n.is_finite() {
                            return Value::Number(n);
                        }
                    }
                }
                Value::String(trimmed.to_string())
            }
            Value::Number(n) if !n.is_finite() => Value::Null,
            other => other.clone(),
        }
    }

    /// Null, empty string, empty sequence and empty mapping are empty.
    pub fn is_empty(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Sequence(items) => items.is_empty(),
            Value::Mapping(m) => m.is_empty(),
            _ => false,
        }
    }

    /// Sanitize one value found at `depth` (see module docs).
    pub fn sanitize_value(&self, value: &Value, depth: usize) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Self::sanitize_primitive(value),
            Value::Date(d) => Value::String(format_date(d)),
            Value::Ref(r) => Value::String(r.clone()),
            Value::Sequence(items) => Value::Sequence(self.sanitize_sequence(items, depth)),
            Value::Mapping(m) if depth >= self.options.max_depth => Value::Mapping(self.flatten(m)),
            Value::Mapping(m) => Value::Mapping(self.sanitize_fields(m, depth + 1)),
        }
    }

    /// Sanitize a whole document (its fields sit at depth 1).
    pub fn sanitize_mapping(&self, document: &Mapping) -> Mapping {
        self.sanitize_fields(document, 1)
    }

    fn sanitize_sequence(&self, items: &[Value], depth: usize) -> Vec<Value> {
        items
            .iter()
            .map(|item| self.sanitize_value(item, depth))
            .filter(|item| !self.drops(item))
            .collect()
    }

    fn sanitize_fields(&self, fields: &Mapping, depth: usize) -> Mapping {
        let primary_key = self.options.primary_key_field.as_str();
        let native_id = fields.get(primary_key).and_then(Value::to_id_string);

        let mut out = Mapping::new();
        if let Some(id) = &native_id {
            out.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }

        for (key, value) in fields {
            if key == primary_key {
                continue;
            }
            let clean_key = Self::sanitize_key(key);
            // The native identity wins over an explicit `id` attribute
            if clean_key.is_empty() || (clean_key == ID_FIELD && native_id.is_some()) {
                continue;
            }
            let clean_value = self.sanitize_value(value, depth);
            if self.drops(&clean_value) {
                continue;
            }
            out.insert(clean_key, clean_value);
        }
        out
    }

    /// Pre-order walk joining nested keys with `_`. Dates and sequences are leaves.
    fn flatten(&self, mapping: &Mapping) -> Mapping {
        let mut out = Mapping::new();
        self.flatten_into(mapping, None, &mut out);
        out
    }

    fn flatten_into(&self, mapping: &Mapping, prefix: Option<&str>, out: &mut Mapping) {
        for (key, value) in mapping {
            let segment = Self::sanitize_key(key);
            if segment.is_empty() {
                continue;
            }
            let joined = match prefix {
                Some(prefix) => format!("{prefix}_{segment}"),
                None => segment,
            };

            if let Value::Mapping(inner) = value {
                self.flatten_into(inner, Some(&joined), out);
                continue;
            }

            let leaf = self.flatten_leaf(value);
            if !self.drops(&leaf) {
                out.insert(joined, leaf);
            }
        }
    }

    fn flatten_leaf(&self, value: &Value) -> Value {
        match value {
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.flatten_leaf(item))
                    .filter(|item| !self.drops(item))
                    .collect(),
            ),
            // Already at the depth bound: a mapping here can only be kept as text
            Value::Mapping(m) => {
                let flat = Value::Mapping(self.flatten(m));
                if self.drops(&flat) {
                    Value::Null
                } else {
                    Value::String(flat.to_json().to_string())
                }
            }
            other => self.sanitize_value(other, self.options.max_depth),
        }
    }

    fn drops(&self, value: &Value) -> bool {
        self.options.remove_empty && Self::is_empty(value)
    }
}

/// `^\d+\.?\d*$` over ASCII digits.
fn looks_numeric(s: &str) -> bool {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let rest = &s[digits..];
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    rest.bytes().all(|b| b.is_ascii_digit())
}
