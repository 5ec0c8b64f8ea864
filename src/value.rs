// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tagged value union for arbitrarily nested listing attributes.
//!
//! Records coming out of the primary store are free-form: nested mappings,
//! dates, numeric-looking strings, store-native identity references. Instead
//! of inspecting `serde_json::Value` shapes at runtime, everything is lifted
//! into [`Value`] once and processed by structural recursion.
//!
//! # Extended JSON
//!
//! The persisted form keeps dates and identity references distinguishable
//! from plain strings, using the usual extended JSON wrappers:
//!
//! ```text
//! {"createdAt": {"$date": "2025-03-01T10:00:00.000Z"}, "_id": {"$oid": "65f1c0..."}}
//! ```
//!
//! The plain form (what [`serde::Serialize`] emits and what gets indexed)
//! renders dates as ISO-8601 strings and references as bare strings.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Key-ordered mapping. Ordering keeps serialization deterministic.
pub type Mapping = BTreeMap<String, Value>;

const DATE_TAG: &str = "$date";
const REF_TAG: &str = "$oid";

/// Largest integer an f64 represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    /// Store-native unique identifier (e.g. an object id)
    Ref(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

impl Value {
    /// Empty mapping.
    pub fn mapping() -> Self {
        Value::Mapping(Mapping::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Direct child lookup on a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Dotted-path lookup (`location.state`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, segment| current.get(segment))
    }

    /// Render an identity-like value as a string id.
    ///
    /// Strings, references and integral numbers qualify; empty strings do not.
    pub fn to_id_string(&self) -> Option<String> {
        match self {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Ref(r) if !r.is_empty() => Some(r.clone()),
            Value::Number(n) if n.is_finite() => Some(format_number(*n)),
            _ => None,
        }
    }

    /// Parse extended JSON into a value.
    ///
    /// `{"$date": "<rfc3339>"}` becomes [`Value::Date`] and `{"$oid": "<hex>"}`
    /// becomes [`Value::Ref`]. Malformed wrappers stay ordinary mappings.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::Sequence(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(JsonValue::String(raw)) = obj.get(DATE_TAG) {
                        if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
                            return Value::Date(date.with_timezone(&Utc));
                        }
                    }
                    if let Some(JsonValue::String(oid)) = obj.get(REF_TAG) {
                        return Value::Ref(oid.clone());
                    }
                }
                Value::Mapping(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Lossless JSON form used for persistence.
    pub fn to_extended_json(&self) -> JsonValue {
        match self {
            Value::Date(d) => tagged(DATE_TAG, format_date(d)),
            Value::Ref(r) => tagged(REF_TAG, r.clone()),
            Value::Sequence(items) => {
                JsonValue::Array(items.iter().map(Value::to_extended_json).collect())
            }
            Value::Mapping(m) => JsonValue::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_extended_json()))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    /// Plain JSON form (dates as ISO strings, references as strings).
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(format_date(d)),
            Value::Ref(r) => JsonValue::String(r.clone()),
            Value::Sequence(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Mapping(m) => {
                JsonValue::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn tagged(tag: &str, raw: String) -> JsonValue {
    let mut obj = serde_json::Map::new();
    obj.insert(tag.to_string(), JsonValue::String(raw));
    JsonValue::Object(obj)
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if is_integral(n) {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if is_integral(*n) => serializer.serialize_i64(*n as i64),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&format_date(d)),
            Value::Ref(r) => serializer.serialize_str(r),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(&json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Value::Mapping(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_extended_json_date_and_ref() {
        let value = Value::from(json!({
            "createdAt": {"$date": "2025-03-01T10:00:00.000Z"},
            "_id": {"$oid": "65f1c0ffee"},
            "title": "Wedding shoot"
        }));

        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(value.get("createdAt"), Some(&Value::Date(expected)));
        assert_eq!(value.get("_id"), Some(&Value::Ref("65f1c0ffee".into())));
        assert_eq!(value.get("title").and_then(Value::as_str), Some("Wedding shoot"));
    }

    #[test]
    fn test_malformed_date_wrapper_stays_mapping() {
        let value = Value::from(json!({"$date": "not a date"}));
        assert!(value.as_mapping().is_some());
    }

    #[test]
    fn test_extended_json_round_trip() {
        let original = json!({
            "createdAt": {"$date": "2025-03-01T10:00:00.000Z"},
            "nested": {"ids": [{"$oid": "abc"}, 3, "x"]}
        });
        let value = Value::from(original.clone());
        assert_eq!(value.to_extended_json(), original);
    }

    #[test]
    fn test_plain_json_renders_dates_and_integers() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut m = Mapping::new();
        m.insert("at".into(), Value::Date(date));
        m.insert("price".into(), Value::Number(100.0));
        m.insert("ratio".into(), Value::Number(0.5));
        m.insert("owner".into(), Value::Ref("u1".into()));

        let plain = serde_json::to_value(Value::Mapping(m)).unwrap();
        assert_eq!(
            plain,
            json!({"at": "2024-01-02T03:04:05.000Z", "price": 100, "ratio": 0.5, "owner": "u1"})
        );
    }

    #[test]
    fn test_get_path() {
        let value = Value::from(json!({"location": {"state": "CA"}}));
        assert_eq!(value.get_path("location.state").and_then(Value::as_str), Some("CA"));
        assert!(value.get_path("location.city").is_none());
        assert!(value.get_path("price.amount").is_none());
    }

    #[test]
    fn test_to_id_string() {
        assert_eq!(Value::from("  ss_1 ").to_id_string(), Some("ss_1".into()));
        assert_eq!(Value::Ref("oid".into()).to_id_string(), Some("oid".into()));
        assert_eq!(Value::Number(42.0).to_id_string(), Some("42".into()));
        assert_eq!(Value::from("").to_id_string(), None);
        assert_eq!(Value::Null.to_id_string(), None);
    }
}
