// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process search engine.
//!
//! Evaluates the filter AST directly against sanitized documents. Text
//! matching is case-insensitive substring matching over the schema's
//! searchable attributes; every query term must match. The sort clause
//! orders results, match count breaks ties, then id.
//!
//! Adding documents to an unknown collection creates it without a schema
//! (every attribute searchable), the same way hosted engines auto-create.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tracing::warn;

use super::traits::{IndexCreation, IndexStats, SearchEngine, StorageError};
use crate::sanitize::SanitizedDocument;
use crate::search::{
    FieldQuery, IndexSchema, QueryNode, QueryValue, SearchHits, SearchRequest, SortOrder,
};
use crate::value::Value;

#[derive(Default)]
struct Collection {
    schema: Option<IndexSchema>,
    documents: BTreeMap<String, SanitizedDocument>,
}

#[derive(Default)]
pub struct InMemorySearchEngine {
    collections: DashMap<String, Collection>,
    requests: Mutex<Vec<(String, SearchRequest)>>,
    searches: AtomicU64,
}

impl InMemorySearchEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `search` calls served
    pub fn search_count(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    /// Most recent search request, with its index name
    pub fn last_request(&self) -> Option<(String, SearchRequest)> {
        self.requests.lock().last().cloned()
    }

    /// Documents currently in a collection, by id
    pub fn documents(&self, index: &str) -> Vec<SanitizedDocument> {
        self.collections
            .get(index)
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<SanitizedDocument> {
        self.collections
            .get(index)
            .and_then(|c| c.documents.get(id).cloned())
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.collections.contains_key(index)
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<IndexCreation, StorageError> {
        let mut collection = self.collections.entry(schema.name.clone()).or_default();
        if collection.schema.is_some() {
            return Ok(IndexCreation::AlreadyExists);
        }
        // Auto-created by an earlier add: the collection exists, only the schema is new
        let existed = !collection.documents.is_empty();
        collection.schema = Some(schema.clone());
        Ok(if existed {
            IndexCreation::AlreadyExists
        } else {
            IndexCreation::Created
        })
    }

    async fn delete_all(&self, index: &str) -> Result<(), StorageError> {
        if let Some(mut collection) = self.collections.get_mut(index) {
            collection.documents.clear();
        }
        Ok(())
    }

    async fn add_documents(
        &self,
        index: &str,
        documents: &[SanitizedDocument],
    ) -> Result<usize, StorageError> {
        let mut collection = self.collections.entry(index.to_string()).or_default();
        let mut submitted = 0;
        for document in documents {
            let Some(id) = document.id() else {
                warn!(index, "Skipping document without id");
                continue;
            };
            collection.documents.insert(id.to_string(), document.clone());
            submitted += 1;
        }
        Ok(submitted)
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchHits, StorageError> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push((index.to_string(), request.clone()));

        let collection = self
            .collections
            .get(index)
            .ok_or_else(|| StorageError::Backend(format!("index '{}' not found", index)))?;

        let terms: Vec<String> = request
            .text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut matched: Vec<(&SanitizedDocument, usize)> = collection
            .documents
            .values()
            .filter(|doc| {
                request
                    .filter
                    .as_ref()
                    .map_or(true, |q| matches_node(doc, &q.root))
            })
            .filter_map(|doc| {
                let score = text_score(doc, collection.schema.as_ref(), &terms)?;
                Some((doc, score))
            })
            .collect();

        matched.sort_by(|(a, score_a), (b, score_b)| {
            request
                .sort
                .iter()
                .map(|clause| {
                    let ordering = compare_values(a.get_path(&clause.field), b.get_path(&clause.field));
                    match clause.order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    }
                })
                .find(|o| *o != CmpOrdering::Equal)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| score_b.cmp(score_a))
                .then_with(|| a.id().cmp(&b.id()))
        });

        let total = matched.len() as u64;
        let hits: Vec<JsonValue> = matched
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|(doc, _)| doc.to_json())
            .collect();

        Ok(SearchHits { hits, total })
    }

    async fn stats(&self, index: &str) -> Result<IndexStats, StorageError> {
        // An index that was never created holds no documents
        let document_count = self
            .collections
            .get(index)
            .map(|c| c.documents.len() as u64)
            .unwrap_or(0);
        Ok(IndexStats {
            document_count,
            is_indexing: false,
        })
    }
}

fn matches_node(doc: &SanitizedDocument, node: &QueryNode) -> bool {
    match node {
        QueryNode::Field(field) => matches_field(doc, field),
        QueryNode::And(nodes) => nodes.iter().all(|n| matches_node(doc, n)),
    }
}

fn matches_field(doc: &SanitizedDocument, field: &FieldQuery) -> bool {
    let Some(value) = doc.get_path(&field.field) else {
        return false;
    };
    match &field.value {
        QueryValue::Text(expected) => equals_text(value, expected),
        QueryValue::NumericRange { min, max } => match value.as_f64() {
            Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
            None => false,
        },
    }
}

fn equals_text(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(_) => value.to_id_string().as_deref() == Some(expected),
        Value::Bool(b) => b.to_string() == expected,
        Value::Sequence(items) => items.iter().any(|item| equals_text(item, expected)),
        _ => false,
    }
}

/// Occurrence count of all terms, `None` when some term does not occur.
fn text_score(doc: &SanitizedDocument, schema: Option<&IndexSchema>, terms: &[String]) -> Option<usize> {
    if terms.is_empty() {
        return Some(0);
    }

    let mut text = String::new();
    match schema {
        Some(schema) => {
            for attribute in &schema.searchable {
                if let Some(value) = doc.get_path(attribute) {
                    collect_text(value, &mut text);
                }
            }
        }
        None => {
            for value in doc.fields().values() {
                collect_text(value, &mut text);
            }
        }
    }
    let text = text.to_lowercase();

    let mut score = 0;
    for term in terms {
        let occurrences = text.matches(term.as_str()).count();
        if occurrences == 0 {
            return None;
        }
        score += occurrences;
    }
    Some(score)
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        Value::Number(_) | Value::Ref(_) => {
            if let Some(s) = value.to_id_string() {
                out.push_str(&s);
                out.push(' ');
            }
        }
        Value::Sequence(items) => items.iter().for_each(|item| collect_text(item, out)),
        Value::Mapping(m) => m.values().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}

/// Numbers numerically, strings lexically; missing values sort last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.partial_cmp(y).unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}
