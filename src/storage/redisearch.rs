// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RediSearch-backed search engine (Redis Stack).
//!
//! Each sanitized document is a RedisJSON document under the index's key
//! prefix; the index is an `FT.CREATE .. ON JSON` over that prefix:
//!
//! ```text
//! JSON.SET {ns}services:ss_abc $ '{"id":"ss_abc","title":"Portraits",...}'
//! FT.CREATE {ns}idx:services ON JSON PREFIX 1 {ns}services: SCHEMA
//!     $.price AS price NUMERIC SORTABLE
//!     $.category AS category TAG SORTABLE
//!     ...
//! FT.SEARCH {ns}idx:services '(wedding photo) @category:{photography}'
//!     SORTBY createdAt DESC LIMIT 0 10 DIALECT 2
//! ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Value as RedisValue;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::traits::{IndexCreation, IndexStats, SearchEngine, StorageError};
use crate::sanitize::SanitizedDocument;
use crate::search::{IndexSchema, RediSearchTranslator, SearchHits, SearchRequest};

/// Documents written per pipeline round trip.
const WRITE_CHUNK: usize = 500;
/// SCAN page size when clearing an index.
const SCAN_COUNT: usize = 1000;

fn backend(e: redis::RedisError) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn is_unknown_index(e: &redis::RedisError) -> bool {
    let message = e.to_string().to_ascii_lowercase();
    message.contains("unknown index") || message.contains("no such index")
}

pub struct RediSearchEngine {
    connection: ConnectionManager,
    /// Redis key namespace shared with the cache and lock
    prefix: String,
}

impl RediSearchEngine {
    pub fn new(connection: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            connection,
            prefix: prefix.into(),
        }
    }

    fn index_name(&self, index: &str) -> String {
        IndexSchema::ft_index_name(&self.prefix, index)
    }

    fn document_key(&self, index: &str, id: &str) -> String {
        format!("{}{}", IndexSchema::key_prefix(&self.prefix, index), id)
    }

    /// FT.SEARCH arguments after the index name.
    fn search_args(request: &SearchRequest) -> Vec<String> {
        let mut args = vec![RediSearchTranslator::search_query(
            &request.text,
            request.filter.as_ref(),
        )];

        // RediSearch sorts on a single field
        if let Some(sort) = request.sort.first() {
            args.push("SORTBY".into());
            args.push(IndexSchema::alias(&sort.field));
            args.push(sort.order.to_string().to_uppercase());
        }

        args.extend([
            "LIMIT".to_string(),
            request.offset.to_string(),
            request.limit.to_string(),
            "DIALECT".to_string(),
            "2".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl SearchEngine for RediSearchEngine {
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<IndexCreation, StorageError> {
        let mut conn = self.connection.clone();
        let args = schema.to_ft_create_args(&self.prefix);

        let created: Result<(), redis::RedisError> =
            redis::cmd("FT.CREATE").arg(&args).query_async(&mut conn).await;

        match created {
            Ok(()) => Ok(IndexCreation::Created),
            Err(e) if e.to_string().contains("Index already exists") => {
                Ok(IndexCreation::AlreadyExists)
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn delete_all(&self, index: &str) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", IndexSchema::key_prefix(&self.prefix, index));
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;

            if !keys.is_empty() {
                deleted += keys.len();
                redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(backend)?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(index, deleted, "Cleared index documents");
        Ok(())
    }

    async fn add_documents(
        &self,
        index: &str,
        documents: &[SanitizedDocument],
    ) -> Result<usize, StorageError> {
        let mut conn = self.connection.clone();
        let mut submitted = 0;

        for chunk in documents.chunks(WRITE_CHUNK) {
            let mut pipeline = redis::pipe();
            for doc in chunk {
                let Some(id) = doc.id() else {
                    warn!(index, "Skipping document without id");
                    continue;
                };
                let json = serde_json::to_string(&doc.to_json())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                pipeline
                    .cmd("JSON.SET")
                    .arg(self.document_key(index, id))
                    .arg("$")
                    .arg(json)
                    .ignore();
                submitted += 1;
            }
            pipeline
                .query_async::<()>(&mut conn)
                .await
                .map_err(backend)?;
        }

        Ok(submitted)
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchHits, StorageError> {
        let mut conn = self.connection.clone();

        let reply: RedisValue = redis::cmd("FT.SEARCH")
            .arg(self.index_name(index))
            .arg(Self::search_args(request))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        parse_search_reply(&reply)
    }

    async fn stats(&self, index: &str) -> Result<IndexStats, StorageError> {
        let mut conn = self.connection.clone();

        let reply: Result<RedisValue, redis::RedisError> = redis::cmd("FT.INFO")
            .arg(self.index_name(index))
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(info) => Ok(parse_info_reply(&info)),
            // Not created yet: nothing indexed
            Err(e) if is_unknown_index(&e) => Ok(IndexStats::default()),
            Err(e) => Err(backend(e)),
        }
    }
}

fn as_text(value: &RedisValue) -> Option<String> {
    match value {
        RedisValue::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        RedisValue::SimpleString(s) => Some(s.clone()),
        RedisValue::Int(n) => Some(n.to_string()),
        RedisValue::Double(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u64(value: &RedisValue) -> Option<u64> {
    match value {
        RedisValue::Int(n) => u64::try_from(*n).ok(),
        // num_docs is reported as a string on some server versions
        other => as_text(other).and_then(|s| s.parse::<f64>().ok()).map(|n| n as u64),
    }
}

/// Flatten a RESP2 key/value array or a RESP3 map into pairs.
fn pairs(value: &RedisValue) -> Vec<(&RedisValue, &RedisValue)> {
    match value {
        RedisValue::Array(items) => items.chunks_exact(2).map(|kv| (&kv[0], &kv[1])).collect(),
        RedisValue::Map(entries) => entries.iter().map(|(k, v)| (k, v)).collect(),
        _ => Vec::new(),
    }
}

/// `[total, key1, [field, value, ..], key2, [..], ..]`
fn parse_search_reply(reply: &RedisValue) -> Result<SearchHits, StorageError> {
    let RedisValue::Array(items) = reply else {
        return Err(StorageError::Backend("unexpected FT.SEARCH reply".into()));
    };
    let Some((total, rest)) = items.split_first() else {
        return Ok(SearchHits::default());
    };
    let total = as_u64(total)
        .ok_or_else(|| StorageError::Backend("FT.SEARCH reply without total".into()))?;

    let mut hits = Vec::new();
    for entry in rest.chunks_exact(2) {
        let document = pairs(&entry[1])
            .into_iter()
            .find(|(field, _)| as_text(field).as_deref() == Some("$"))
            .and_then(|(_, value)| as_text(value));

        let Some(raw) = document else {
            continue;
        };
        let json: JsonValue = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        // DIALECT 2 wraps the root in an array
        let json = match json {
            JsonValue::Array(mut items) if items.len() == 1 => items.remove(0),
            other => other,
        };
        hits.push(json);
    }

    Ok(SearchHits { hits, total })
}

fn parse_info_reply(info: &RedisValue) -> IndexStats {
    let mut stats = IndexStats::default();
    for (key, value) in pairs(info) {
        match as_text(key).as_deref() {
            Some("num_docs") => stats.document_count = as_u64(value).unwrap_or(0),
            Some("indexing") => stats.is_indexing = as_u64(value).unwrap_or(0) != 0,
            _ => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{QueryBuilder, SortClause, SortOrder};
    use serde_json::json;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_search_args() {
        let request = SearchRequest {
            text: "wedding photo".into(),
            filter: QueryBuilder::new().field_eq("category", "photography").build_and(),
            offset: 20,
            limit: 10,
            sort: vec![SortClause {
                field: "createdAt".into(),
                order: SortOrder::Desc,
            }],
        };

        assert_eq!(
            RediSearchEngine::search_args(&request),
            vec![
                "(wedding photo) @category:{photography}",
                "SORTBY",
                "createdAt",
                "DESC",
                "LIMIT",
                "20",
                "10",
                "DIALECT",
                "2",
            ]
        );
    }

    #[test]
    fn test_search_args_match_all() {
        let request = SearchRequest {
            text: String::new(),
            filter: None,
            offset: 0,
            limit: 5,
            sort: vec![],
        };
        assert_eq!(
            RediSearchEngine::search_args(&request),
            vec!["*", "LIMIT", "0", "5", "DIALECT", "2"]
        );
    }

    #[test]
    fn test_parse_search_reply() {
        let reply = RedisValue::Array(vec![
            RedisValue::Int(42),
            bulk("services:ss_1"),
            RedisValue::Array(vec![bulk("$"), bulk(r#"[{"id":"ss_1","price":100}]"#)]),
            bulk("services:ss_2"),
            RedisValue::Array(vec![bulk("$"), bulk(r#"{"id":"ss_2"}"#)]),
        ]);

        let hits = parse_search_reply(&reply).unwrap();
        assert_eq!(hits.total, 42);
        assert_eq!(hits.hits, vec![json!({"id": "ss_1", "price": 100}), json!({"id": "ss_2"})]);
    }

    #[test]
    fn test_parse_empty_search_reply() {
        let reply = RedisValue::Array(vec![RedisValue::Int(0)]);
        assert_eq!(parse_search_reply(&reply).unwrap(), SearchHits::default());
        assert!(parse_search_reply(&RedisValue::Nil).is_err());
    }

    #[test]
    fn test_parse_info_reply() {
        let info = RedisValue::Array(vec![
            bulk("index_name"),
            bulk("idx:services"),
            bulk("num_docs"),
            bulk("17"),
            bulk("indexing"),
            RedisValue::Int(1),
        ]);
        assert_eq!(
            parse_info_reply(&info),
            IndexStats {
                document_count: 17,
                is_indexing: true
            }
        );
    }
}
