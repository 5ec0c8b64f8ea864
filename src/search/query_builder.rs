// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query Builder - AST for listing filters
//!
//! The planner never concatenates filter strings directly. It builds a typed
//! query that each backend renders in its own syntax.
//!
//! # Example
//!
//! ```rust
//! use market_search::search::{FilterTranslator, QueryBuilder};
//!
//! let query = QueryBuilder::new()
//!     .field_eq("category", "photography")
//!     .numeric_range("price", Some(100.0), Some(500.0))
//!     .build_and()
//!     .expect("two constraints");
//!
//! assert_eq!(
//!     FilterTranslator::translate(&query),
//!     r#"category = "photography" AND price >= 100 AND price <= 500"#
//! );
//! ```

use serde::{Deserialize, Serialize};

/// Filter query AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Root query node
    pub root: QueryNode,
}

impl Query {
    pub fn new(root: QueryNode) -> Self {
        Self { root }
    }

    /// Attribute equals a string value
    pub fn field_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(QueryNode::Field(FieldQuery {
            field: field.into(),
            operator: FieldOperator::Equals,
            value: QueryValue::Text(value.into()),
        }))
    }

    /// Attribute within an inclusive numeric range; `None` leaves that side open
    pub fn numeric_range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(QueryNode::Field(FieldQuery {
            field: field.into(),
            operator: FieldOperator::Range,
            value: QueryValue::NumericRange { min, max },
        }))
    }

    /// Combine with AND
    pub fn and(self, other: Query) -> Self {
        let mut nodes = self.root.into_conjuncts();
        nodes.extend(other.root.into_conjuncts());
        Self::new(QueryNode::And(nodes))
    }

    /// Every field constraint in evaluation order.
    pub fn constraints(&self) -> Vec<&FieldQuery> {
        let mut out = Vec::new();
        self.root.collect_fields(&mut out);
        out
    }
}

/// Query AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    /// Single attribute constraint
    Field(FieldQuery),
    /// Boolean AND of all children
    And(Vec<QueryNode>),
}

impl QueryNode {
    fn into_conjuncts(self) -> Vec<QueryNode> {
        match self {
            QueryNode::And(nodes) => nodes,
            field => vec![field],
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldQuery>) {
        match self {
            QueryNode::Field(field) => out.push(field),
            QueryNode::And(nodes) => nodes.iter().for_each(|n| n.collect_fields(out)),
        }
    }
}

/// Field query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Dotted attribute path (e.g., "category", "location.state")
    pub field: String,
    /// Comparison operator
    pub operator: FieldOperator,
    /// Query value
    pub value: QueryValue,
}

/// Field comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOperator {
    /// Exact match
    Equals,
    /// Inclusive numeric range
    Range,
}

/// Query value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    /// Text value
    Text(String),
    /// Numeric range [min, max]
    NumericRange { min: Option<f64>, max: Option<f64> },
}

/// Builder for conjunctive filters
#[derive(Debug, Default)]
pub struct QueryBuilder {
    nodes: Vec<QueryNode>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a field equals constraint
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.nodes.push(Query::field_eq(field, value).root);
        self
    }

    /// Add a field equals constraint when a value is present
    pub fn field_eq_opt(self, field: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.field_eq(field, value),
            None => self,
        }
    }

    /// Add a numeric range constraint; a range open on both sides adds nothing
    pub fn numeric_range(mut self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        if min.is_some() || max.is_some() {
            self.nodes.push(Query::numeric_range(field, min, max).root);
        }
        self
    }

    /// Build query with AND semantics. `None` when no constraint was added
    /// (the filter matches everything).
    pub fn build_and(self) -> Option<Query> {
        let mut nodes = self.nodes;
        match nodes.len() {
            0 => None,
            1 => nodes.pop().map(Query::new),
            _ => Some(Query::new(QueryNode::And(nodes))),
        }
    }
}
