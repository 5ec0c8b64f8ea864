// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RediSearch Translator
//!
//! Translates the Query AST and free-text terms to FT.SEARCH syntax.
//!
//! # RediSearch Query Syntax
//!
//! ```text
//! @field:{value}            - Tag equality (filterable text attributes)
//! @field:[min max]          - Numeric range, -inf/+inf for open sides
//! term1 term2               - Free text, all terms (implicit AND)
//! query1 query2             - AND (implicit)
//! (query1 query2)           - Grouping
//! *                         - Match everything
//! ```

use super::index_schema::IndexSchema;
use super::query_builder::{FieldQuery, Query, QueryNode, QueryValue};

/// RediSearch query translator
pub struct RediSearchTranslator;

impl RediSearchTranslator {
    /// Translate a filter to RediSearch syntax
    pub fn translate(query: &Query) -> String {
        Self::translate_node(&query.root)
    }

    /// Full FT.SEARCH query string: free-text terms AND the filter.
    pub fn search_query(text: &str, filter: Option<&Query>) -> String {
        let terms = Self::text_terms(text);
        let filter = filter.map(Self::translate);

        match (terms, filter) {
            (Some(terms), Some(filter)) => format!("{} {}", terms, filter),
            (Some(terms), None) => terms,
            (None, Some(filter)) => filter,
            (None, None) => "*".to_string(),
        }
    }

    /// Escaped free-text terms, `None` for blank input.
    pub fn text_terms(text: &str) -> Option<String> {
        let terms: Vec<String> = text
            .split_whitespace()
            .map(Self::escape_value)
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            None
        } else if terms.len() == 1 {
            terms.into_iter().next()
        } else {
            Some(format!("({})", terms.join(" ")))
        }
    }

    fn translate_node(node: &QueryNode) -> String {
        match node {
            QueryNode::Field(field_query) => Self::translate_field(field_query),
            QueryNode::And(nodes) => {
                let parts: Vec<String> = nodes.iter().map(Self::translate_node).collect();
                if parts.len() == 1 {
                    parts[0].clone()
                } else {
                    format!("({})", parts.join(" "))
                }
            }
        }
    }

    fn translate_field(field: &FieldQuery) -> String {
        let field_name = IndexSchema::alias(&field.field);

        match &field.value {
            QueryValue::Text(text) => {
                format!("@{}:{{{}}}", field_name, Self::escape_value(text))
            }
            QueryValue::NumericRange { min, max } => {
                let min_str = min.map(|v| v.to_string()).unwrap_or_else(|| "-inf".to_string());
                let max_str = max.map(|v| v.to_string()).unwrap_or_else(|| "+inf".to_string());
                format!("@{}:[{} {}]", field_name, min_str, max_str)
            }
        }
    }

    /// Escape every RediSearch punctuation char and spaces (single-term matching).
    fn escape_value(value: &str) -> String {
        let mut escaped = String::new();
        for c in value.chars() {
            if (c.is_ascii_punctuation() && c != '_') || c == ' ' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::QueryBuilder;

    #[test]
    fn test_tag_equality() {
        let query = Query::field_eq("category", "photography");
        assert_eq!(RediSearchTranslator::translate(&query), "@category:{photography}");
    }

    #[test]
    fn test_nested_attribute_alias() {
        let query = Query::field_eq("location.state", "New York");
        assert_eq!(
            RediSearchTranslator::translate(&query),
            "@location_state:{New\\ York}"
        );
    }

    #[test]
    fn test_numeric_range() {
        let query = Query::numeric_range("price", Some(100.0), Some(500.0));
        assert_eq!(RediSearchTranslator::translate(&query), "@price:[100 500]");
    }

    #[test]
    fn test_numeric_range_unbounded_max() {
        let query = Query::numeric_range("price", Some(0.0), None);
        assert_eq!(RediSearchTranslator::translate(&query), "@price:[0 +inf]");
    }

    #[test]
    fn test_numeric_range_unbounded_min() {
        let query = Query::numeric_range("price", None, Some(40.0));
        assert_eq!(RediSearchTranslator::translate(&query), "@price:[-inf 40]");
    }

    #[test]
    fn test_and_query() {
        let query = QueryBuilder::new()
            .field_eq("category", "music")
            .numeric_range("price", Some(25.0), Some(40.0))
            .build_and()
            .unwrap();
        assert_eq!(
            RediSearchTranslator::translate(&query),
            "(@category:{music} @price:[25 40])"
        );
    }

    #[test]
    fn test_escape_special_chars() {
        let query = Query::field_eq("sellerId", "user@example.com");
        assert_eq!(
            RediSearchTranslator::translate(&query),
            "@sellerId:{user\\@example\\.com}"
        );
    }

    #[test]
    fn test_search_query_combinations() {
        let filter = Query::numeric_range("price", Some(0.0), None);
        assert_eq!(RediSearchTranslator::search_query("", None), "*");
        assert_eq!(RediSearchTranslator::search_query("  ", Some(&filter)), "@price:[0 +inf]");
        assert_eq!(
            RediSearchTranslator::search_query("wedding photos", Some(&filter)),
            "(wedding photos) @price:[0 +inf]"
        );
        assert_eq!(RediSearchTranslator::search_query("dj", None), "dj");
    }

    #[test]
    fn test_text_terms_escape() {
        assert_eq!(RediSearchTranslator::text_terms("rock-n-roll"), Some("rock\\-n\\-roll".into()));
        assert_eq!(RediSearchTranslator::text_terms(""), None);
    }
}
