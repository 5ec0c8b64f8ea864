// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Post-sanitization document checks.

use serde::{Deserialize, Serialize};

use super::sanitizer::{SanitizedDocument, ID_FIELD};
use crate::value::{Mapping, Value};

/// What a sync run does with documents that fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Log the issues and index anyway
    #[default]
    Lenient,
    /// Abort the run before the index is touched
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Checks a document has an `id` and no mapping nested deeper than `max_depth`.
///
/// Nesting level counts mapping ancestors only; sequences are transparent.
#[derive(Debug, Clone)]
pub struct DocumentValidator {
    max_depth: usize,
}

impl DocumentValidator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn validate(&self, document: &SanitizedDocument) -> ValidationReport {
        self.validate_mapping(document.fields())
    }

    pub fn validate_mapping(&self, document: &Mapping) -> ValidationReport {
        let mut issues = Vec::new();

        let has_id = document
            .get(ID_FIELD)
            .and_then(Value::to_id_string)
            .is_some();
        if !has_id {
            issues.push("Document missing required 'id' field".to_string());
        }

        self.check_mapping(document, 0, "", &mut issues);

        ValidationReport {
            valid: issues.is_empty(),
            issues,
        }
    }

    fn check_mapping(&self, mapping: &Mapping, level: usize, path: &str, issues: &mut Vec<String>) {
        for (key, value) in mapping {
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            self.check_value(value, level, &child_path, issues);
        }
    }

    fn check_value(&self, value: &Value, level: usize, path: &str, issues: &mut Vec<String>) {
        match value {
            Value::Mapping(inner) => {
                if level + 1 > self.max_depth {
                    issues.push(format!("Object too deeply nested at path: {path}"));
                } else {
                    self.check_mapping(inner, level + 1, path, issues);
                }
            }
            Value::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.check_value(item, level, &format!("{path}[{i}]"), issues);
                }
            }
            _ => {}
        }
    }
}
