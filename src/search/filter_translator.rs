// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter expression translator
//!
//! Renders the Query AST into the engine-neutral filter grammar:
//!
//! ```text
//! field = "string"      - Equality (quotes and backslashes escaped)
//! field >= number       - Lower bound (inclusive)
//! field <= number       - Upper bound (inclusive)
//! a AND b               - Conjunction (literal " AND ")
//! ```

use super::query_builder::{FieldQuery, Query, QueryNode, QueryValue};

pub struct FilterTranslator;

impl FilterTranslator {
    pub fn translate(query: &Query) -> String {
        let mut predicates = Vec::new();
        Self::collect(&query.root, &mut predicates);
        predicates.join(" AND ")
    }

    fn collect(node: &QueryNode, out: &mut Vec<String>) {
        match node {
            QueryNode::Field(field) => Self::translate_field(field, out),
            QueryNode::And(nodes) => nodes.iter().for_each(|n| Self::collect(n, out)),
        }
    }

    // The value carries the comparison; Equals/Range only ever pair with Text/NumericRange
    fn translate_field(field: &FieldQuery, out: &mut Vec<String>) {
        match &field.value {
            QueryValue::Text(text) => {
                out.push(format!("{} = \"{}\"", field.field, Self::escape(text)));
            }
            QueryValue::NumericRange { min, max } => {
                if let Some(min) = min {
                    out.push(format!("{} >= {}", field.field, min));
                }
                if let Some(max) = max {
                    out.push(format!("{} <= {}", field.field, max));
                }
            }
        }
    }

    fn escape(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '"' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}
