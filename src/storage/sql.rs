// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL primary store (SQLite or MySQL through sqlx `Any`).
//!
//! Free-form attributes live in a JSON `payload` column. Attributes the
//! pipeline mutates or orders by get their own columns so that updates are
//! single statements:
//!
//! ```sql
//! CREATE TABLE listings (
//!   id VARCHAR(255) PRIMARY KEY,
//!   payload LONGTEXT NOT NULL,     -- extended JSON, minus the columns below
//!   category VARCHAR(255),         -- DISTINCT for category listing
//!   created_at VARCHAR(32),        -- ISO-8601, orders "latest"
//!   views BIGINT,                  -- SET views = COALESCE(views, 0) + ?
//!   confirmed_bookings BIGINT,
//!   popularity_score DOUBLE,
//!   average_rating DOUBLE,
//!   review_count DOUBLE
//! )
//!
//! CREATE TABLE reviews (
//!   id BIGINT AUTO_INCREMENT PRIMARY KEY,
//!   listing_id VARCHAR(255) NOT NULL,
//!   rater_id VARCHAR(255) NOT NULL,
//!   rating DOUBLE NOT NULL,
//!   comment TEXT,
//!   created_at VARCHAR(32) NOT NULL
//! )
//! ```
//!
//! Rating statistics are a `COUNT`/`AVG` grouping over `reviews`, recomputed
//! from scratch on every call.
//!
//! ## sqlx Any Driver Quirks
//!
//! TEXT is used instead of a native JSON type, and LONGTEXT may come back as
//! bytes on MySQL, so text columns are read as `String` first, then as
//! `Vec<u8>`.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyConnection;
use sqlx::{AnyPool, Row};
use tracing::info;

use super::traits::{RecordStore, StorageError};
use crate::listing::{
    Counter, ListingRecord, RatingRecord, RatingStats, AVERAGE_RATING, CONFIRMED_BOOKINGS,
    POPULARITY_SCORE, REVIEW_COUNT, VIEWS,
};
use crate::resilience::retry::{retry, RetryConfig};
use crate::value::{format_date, Mapping, Value};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Integer counter attributes and their columns.
const COUNTER_COLUMNS: [(&str, &str); 2] = [
    (VIEWS, "views"),
    (CONFIRMED_BOOKINGS, "confirmed_bookings"),
];

/// Derived score attributes and their columns.
const SCORE_COLUMNS: [(&str, &str); 3] = [
    (POPULARITY_SCORE, "popularity_score"),
    (AVERAGE_RATING, "average_rating"),
    (REVIEW_COUNT, "review_count"),
];

const SELECT_LISTING: &str = "SELECT id, payload, views, confirmed_bookings, popularity_score, \
     average_rating, review_count FROM listings";

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn counter_column(counter: Counter) -> &'static str {
    match counter {
        Counter::Views => "views",
        Counter::ConfirmedBookings => "confirmed_bookings",
    }
}

pub struct SqlRecordStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlRecordStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create the tables when missing.
    pub async fn connect(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };

        // WAL: readers don't block the writer
        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        info!(sqlite = is_sqlite, "SQL record store ready");
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements: [&str; 3] = if self.is_sqlite {
            [
                r#"
                CREATE TABLE IF NOT EXISTS listings (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    category TEXT,
                    created_at TEXT,
                    views INTEGER,
                    confirmed_bookings INTEGER,
                    popularity_score REAL,
                    average_rating REAL,
                    review_count REAL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS reviews (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    listing_id TEXT NOT NULL,
                    rater_id TEXT NOT NULL,
                    rating REAL NOT NULL,
                    comment TEXT,
                    created_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_reviews_listing ON reviews (listing_id)",
            ]
        } else {
            [
                r#"
                CREATE TABLE IF NOT EXISTS listings (
                    id VARCHAR(255) PRIMARY KEY,
                    payload LONGTEXT NOT NULL,
                    category VARCHAR(255),
                    created_at VARCHAR(32),
                    views BIGINT,
                    confirmed_bookings BIGINT,
                    popularity_score DOUBLE,
                    average_rating DOUBLE,
                    review_count DOUBLE,
                    INDEX idx_category (category),
                    INDEX idx_created_at (created_at)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS reviews (
                    id BIGINT AUTO_INCREMENT PRIMARY KEY,
                    listing_id VARCHAR(255) NOT NULL,
                    rater_id VARCHAR(255) NOT NULL,
                    rating DOUBLE NOT NULL,
                    comment TEXT,
                    created_at VARCHAR(32) NOT NULL,
                    INDEX idx_reviews_listing (listing_id)
                )
                "#,
                // Indexes are declared inline on MySQL
                "SELECT 1",
            ]
        };

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(backend)
            })
            .await?;
        }

        Ok(())
    }

    fn upsert_sql(&self) -> &'static str {
        if self.is_sqlite {
            "INSERT INTO listings (id, payload, category, created_at, views, confirmed_bookings, \
                popularity_score, average_rating, review_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                payload = excluded.payload, \
                category = excluded.category, \
                created_at = excluded.created_at, \
                views = excluded.views, \
                confirmed_bookings = excluded.confirmed_bookings, \
                popularity_score = excluded.popularity_score, \
                average_rating = excluded.average_rating, \
                review_count = excluded.review_count"
        } else {
            "INSERT INTO listings (id, payload, category, created_at, views, confirmed_bookings, \
                popularity_score, average_rating, review_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
                payload = VALUES(payload), \
                category = VALUES(category), \
                created_at = VALUES(created_at), \
                views = VALUES(views), \
                confirmed_bookings = VALUES(confirmed_bookings), \
                popularity_score = VALUES(popularity_score), \
                average_rating = VALUES(average_rating), \
                review_count = VALUES(review_count)"
        }
    }
}

/// Column projection of one listing.
struct ListingRow {
    payload: String,
    category: Option<String>,
    created_at: Option<String>,
    counters: [Option<i64>; 2],
    scores: [Option<f64>; 3],
}

impl ListingRow {
    fn from_record(record: &ListingRecord) -> Result<Self, StorageError> {
        let mut payload = record.attributes.clone();
        let counters = COUNTER_COLUMNS.map(|(attribute, _)| {
            payload.remove(attribute).map(|_| record.number(attribute) as i64)
        });
        let scores = SCORE_COLUMNS.map(|(attribute, _)| {
            payload.remove(attribute).map(|_| record.number(attribute))
        });

        Ok(Self {
            payload: encode_payload(&payload)?,
            category: record.category().map(str::to_string),
            created_at: record.created_at().map(|d| format_date(&d)),
            counters,
            scores,
        })
    }
}

fn encode_payload(payload: &Mapping) -> Result<String, StorageError> {
    serde_json::to_string(&Value::Mapping(payload.clone()).to_extended_json())
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_payload(raw: &str) -> Result<Mapping, StorageError> {
    let json: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
    match Value::from_json(&json) {
        Value::Mapping(m) => Ok(m),
        _ => Err(StorageError::Serialization("listing payload is not an object".into())),
    }
}

/// Read a text column as String (SQLite TEXT) or bytes (MySQL LONGTEXT).
fn text_column(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<String, _>(column).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(column)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

fn record_from_row(row: &AnyRow) -> Result<ListingRecord, StorageError> {
    let id = text_column(row, "id")
        .ok_or_else(|| StorageError::Backend("listing row without id".into()))?;
    let payload = text_column(row, "payload")
        .ok_or_else(|| StorageError::Backend(format!("listing '{}' has no payload", id)))?;
    let mut attributes = decode_payload(&payload)?;

    for (attribute, column) in COUNTER_COLUMNS {
        if let Some(n) = row.try_get::<Option<i64>, _>(column).ok().flatten() {
            attributes.insert(attribute.to_string(), Value::from(n));
        }
    }
    for (attribute, column) in SCORE_COLUMNS {
        if let Some(n) = row.try_get::<Option<f64>, _>(column).ok().flatten() {
            attributes.insert(attribute.to_string(), Value::Number(n));
        }
    }

    Ok(ListingRecord::new(id, attributes))
}

/// A value bound to one of the numeric attribute columns.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnValue {
    Integer(Option<i64>),
    Real(Option<f64>),
}

/// Null clears the column; anything else reads the way `ListingRecord::number` does.
fn column_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) if n.is_finite() => Some(*n),
        Value::String(s) => Some(s.trim().parse().unwrap_or(0.0)),
        _ => Some(0.0),
    }
}

/// Split updates into column assignments and payload attributes.
/// Counter columns appear only when the caller names them.
fn split_fields(fields: &Mapping) -> (Vec<(&'static str, ColumnValue)>, Mapping) {
    let mut columns = Vec::new();
    let mut payload = Mapping::new();

    for (key, value) in fields {
        if let Some((_, column)) = COUNTER_COLUMNS.iter().find(|(attribute, _)| *attribute == key.as_str()) {
            let n = column_number(value).map(|n| n as i64);
            columns.push((*column, ColumnValue::Integer(n)));
        } else if let Some((_, column)) = SCORE_COLUMNS.iter().find(|(attribute, _)| *attribute == key.as_str()) {
            columns.push((*column, ColumnValue::Real(column_number(value))));
        } else {
            payload.insert(key.clone(), value.clone());
        }
    }
    (columns, payload)
}

fn column_update_sql(columns: &[(&'static str, ColumnValue)]) -> Option<String> {
    if columns.is_empty() {
        return None;
    }
    let assignments: Vec<String> = columns.iter().map(|(column, _)| format!("{column} = ?")).collect();
    Some(format!("UPDATE listings SET {} WHERE id = ?", assignments.join(", ")))
}

fn bind_columns<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    columns: &[(&'static str, ColumnValue)],
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    for (_, value) in columns {
        query = match *value {
            ColumnValue::Integer(n) => query.bind(n),
            ColumnValue::Real(n) => query.bind(n),
        };
    }
    query
}

/// Read-merge-write of the payload inside the caller's write transaction.
/// Only the payload, its derived columns and the named columns are written.
async fn merge_payload(
    conn: &mut AnyConnection,
    id: &str,
    columns: &[(&'static str, ColumnValue)],
    fields: &Mapping,
    lock_clause: &str,
) -> Result<bool, StorageError> {
    let Some(row) = sqlx::query(&format!("SELECT payload FROM listings WHERE id = ?{lock_clause}"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?
    else {
        return Ok(false);
    };

    let raw = text_column(&row, "payload")
        .ok_or_else(|| StorageError::Backend(format!("listing '{}' has no payload", id)))?;
    let mut payload = decode_payload(&raw)?;
    for (key, value) in fields {
        payload.insert(key.clone(), value.clone());
    }
    let merged = ListingRecord::new(id, payload);

    let mut assignments: Vec<String> = ["payload = ?", "category = ?", "created_at = ?"]
        .iter()
        .map(|a| a.to_string())
        .collect();
    assignments.extend(columns.iter().map(|(column, _)| format!("{column} = ?")));
    let sql = format!("UPDATE listings SET {} WHERE id = ?", assignments.join(", "));

    let query = sqlx::query(&sql)
        .bind(encode_payload(&merged.attributes)?)
        .bind(merged.category().map(str::to_string))
        .bind(merged.created_at().map(|d| format_date(&d)));
    bind_columns(query, columns)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    Ok(true)
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn get(&self, id: &str) -> Result<Option<ListingRecord>, StorageError> {
        let row = sqlx::query(&format!("{SELECT_LISTING} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert(&self, record: &ListingRecord) -> Result<(), StorageError> {
        let row = ListingRow::from_record(record)?;
        let [views, bookings] = row.counters;
        let [popularity, rating, reviews] = row.scores;

        sqlx::query(self.upsert_sql())
            .bind(&record.id)
            .bind(&row.payload)
            .bind(&row.category)
            .bind(&row.created_at)
            .bind(views)
            .bind(bookings)
            .bind(popularity)
            .bind(rating)
            .bind(reviews)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ListingRecord>, StorageError> {
        let rows = sqlx::query(&format!("{SELECT_LISTING} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn increment_counter(
        &self,
        id: &str,
        counter: Counter,
        by: i64,
    ) -> Result<Option<i64>, StorageError> {
        let column = counter_column(counter);
        // Write first: the row lock is held until commit, so the read below
        // sees this increment and no concurrent one
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(&format!(
            "UPDATE listings SET {column} = COALESCE({column}, 0) + ? WHERE id = ?"
        ))
        .bind(by)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query(&format!("SELECT {column} FROM listings WHERE id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let value: i64 = row.try_get(column).map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(Some(value))
    }

    async fn set_fields(&self, id: &str, fields: &Mapping) -> Result<bool, StorageError> {
        let (columns, payload_fields) = split_fields(fields);

        if payload_fields.is_empty() {
            // Column attributes only: one statement, nothing read back
            let Some(sql) = column_update_sql(&columns) else {
                return Ok(self.get(id).await?.is_some());
            };
            let updated = bind_columns(sqlx::query(&sql), &columns)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
            // MySQL may report 0 affected rows when the values did not change
            return Ok(updated.rows_affected() > 0 || self.get(id).await?.is_some());
        }

        if self.is_sqlite {
            // IMMEDIATE takes the write lock up front, so a concurrent writer
            // makes this wait in the busy handler instead of failing the upgrade
            let mut conn = self.pool.acquire().await.map_err(backend)?;
            sqlx::query("BEGIN IMMEDIATE")
                .execute(&mut *conn)
                .await
                .map_err(backend)?;

            let merged = merge_payload(&mut *conn, id, &columns, &payload_fields, "").await;
            let end = if merged.is_ok() { "COMMIT" } else { "ROLLBACK" };
            if let Err(e) = sqlx::query(end).execute(&mut *conn).await {
                // Never hand a connection with an open transaction back to the pool
                conn.close_on_drop();
                merged?;
                return Err(backend(e));
            }
            merged
        } else {
            let mut tx = self.pool.begin().await.map_err(backend)?;
            let merged = merge_payload(&mut *tx, id, &columns, &payload_fields, " FOR UPDATE").await?;
            tx.commit().await.map_err(backend)?;
            Ok(merged)
        }
    }

    async fn insert_rating(&self, rating: &RatingRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO reviews (listing_id, rater_id, rating, comment, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&rating.listing_id)
        .bind(&rating.rater_id)
        .bind(rating.rating)
        .bind(&rating.comment)
        .bind(format_date(&rating.created_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn rating_stats(&self, listing_id: &str) -> Result<Option<RatingStats>, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt, AVG(rating) AS mean FROM reviews \
             WHERE listing_id = ? GROUP BY listing_id",
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let count: i64 = row.try_get("cnt").map_err(backend)?;
        let mean: f64 = row.try_get("mean").map_err(backend)?;
        Ok(Some(RatingStats {
            count: count as u64,
            mean,
        }))
    }

    async fn latest(&self, limit: usize) -> Result<Vec<ListingRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "{SELECT_LISTING} ORDER BY created_at DESC, id ASC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn categories(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT DISTINCT category FROM listings \
             WHERE category IS NOT NULL AND category <> '' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .iter()
            .filter_map(|row| text_column(row, "category"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    async fn store() -> (SqlRecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("market.db").display());
        let store = SqlRecordStore::connect(&url).await.unwrap();
        (store, dir)
    }

    fn listing(id: &str, attrs: serde_json::Value) -> ListingRecord {
        ListingRecord::from_json(id, attrs)
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let (store, _dir) = store().await;
        let record = listing(
            "ss_1",
            json!({
                "title": "Portraits",
                "location": {"city": "Reno", "coordinates": {"coordinates": [-119.8, 39.5]}},
                "createdAt": {"$date": "2025-04-01T10:00:00.000Z"},
                "sellerId": {"$oid": "65f1"},
                "views": 4,
                "averageRating": 4.5
            }),
        );
        store.upsert(&record).await.unwrap();

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_absent_counters_stay_absent() {
        let (store, _dir) = store().await;
        store.upsert(&listing("ss_1", json!({"title": "x"}))).await.unwrap();

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert!(fetched.get("views").is_none());
        assert!(fetched.get("popularityScore").is_none());
    }

    #[tokio::test]
    async fn test_increment_counter() {
        let (store, _dir) = store().await;
        store.upsert(&listing("ss_1", json!({"title": "x"}))).await.unwrap();

        assert_eq!(store.increment_counter("ss_1", Counter::Views, 1).await.unwrap(), Some(1));
        assert_eq!(store.increment_counter("ss_1", Counter::Views, 1).await.unwrap(), Some(2));
        assert_eq!(
            store.increment_counter("ss_1", Counter::ConfirmedBookings, 1).await.unwrap(),
            Some(1)
        );
        assert_eq!(store.increment_counter("nope", Counter::Views, 1).await.unwrap(), None);

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched.counter(Counter::Views), 2);
        assert_eq!(fetched.counter(Counter::ConfirmedBookings), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_not_lost() {
        let (store, _dir) = store().await;
        let store = Arc::new(store);
        store.upsert(&listing("ss_1", json!({"title": "x"}))).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.increment_counter("ss_1", Counter::Views, 1).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched.counter(Counter::Views), 20);
    }

    #[tokio::test]
    async fn test_set_fields_concurrent_with_increments() {
        let (store, _dir) = store().await;
        let store = Arc::new(store);
        store.upsert(&listing("ss_1", json!({"title": "x"}))).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let s = store.clone();
            tasks.push(tokio::spawn(async move {
                s.increment_counter("ss_1", Counter::ConfirmedBookings, 1).await.map(|_| ())
            }));
            let s = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut fields = Mapping::new();
                fields.insert("averageRating".into(), Value::Number(4.0));
                // Every other update also merges a payload attribute
                if i % 2 == 0 {
                    fields.insert("badge".into(), Value::from(format!("b{i}")));
                }
                s.set_fields("ss_1", &fields).await.map(|found| assert!(found))
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched.counter(Counter::ConfirmedBookings), 20);
        assert_eq!(fetched.number("averageRating"), 4.0);
        assert_eq!(fetched.get("title"), Some(&Value::from("x")));
        assert!(fetched.get("badge").is_some());
    }

    #[tokio::test]
    async fn test_set_fields_leaves_counters_alone() {
        let (store, _dir) = store().await;
        store
            .upsert(&listing("ss_1", json!({"title": "x", "views": 3})))
            .await
            .unwrap();

        // A score-only update never rewrites a counter it was not given
        store.increment_counter("ss_1", Counter::Views, 2).await.unwrap();
        let mut fields = Mapping::new();
        fields.insert("popularityScore".into(), Value::Number(2.5));
        assert!(store.set_fields("ss_1", &fields).await.unwrap());
        assert!(!store.set_fields("nope", &fields).await.unwrap());

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched.counter(Counter::Views), 5);
        assert_eq!(fetched.number("popularityScore"), 2.5);
    }

    #[tokio::test]
    async fn test_set_fields_merges() {
        let (store, _dir) = store().await;
        store
            .upsert(&listing("ss_1", json!({"title": "x", "views": 3})))
            .await
            .unwrap();

        let mut fields = Mapping::new();
        fields.insert("popularityScore".into(), Value::Number(1.5));
        fields.insert("badge".into(), Value::from("top"));
        assert!(store.set_fields("ss_1", &fields).await.unwrap());
        assert!(!store.set_fields("nope", &fields).await.unwrap());

        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched.number("popularityScore"), 1.5);
        assert_eq!(fetched.get("badge"), Some(&Value::from("top")));
        assert_eq!(fetched.counter(Counter::Views), 3);
        assert_eq!(fetched.get("title"), Some(&Value::from("x")));
    }

    #[tokio::test]
    async fn test_rating_aggregation() {
        let (store, _dir) = store().await;
        assert_eq!(store.rating_stats("ss_1").await.unwrap(), None);

        for (rater, value) in [("u1", 4.0), ("u2", 5.0), ("u3", 3.0)] {
            store
                .insert_rating(&RatingRecord {
                    listing_id: "ss_1".into(),
                    rater_id: rater.into(),
                    rating: value,
                    comment: Some("ok".into()),
                    created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                })
                .await
                .unwrap();
        }

        let stats = store.rating_stats("ss_1").await.unwrap().unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.mean - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_latest_and_categories() {
        let (store, _dir) = store().await;
        store
            .upsert(&listing("a", json!({"category": "music", "createdAt": "2025-01-01T00:00:00.000Z"})))
            .await
            .unwrap();
        store
            .upsert(&listing("b", json!({"category": "art", "createdAt": "2025-03-01T00:00:00.000Z"})))
            .await
            .unwrap();
        store
            .upsert(&listing("c", json!({"category": "", "createdAt": "2025-02-01T00:00:00.000Z"})))
            .await
            .unwrap();

        let latest: Vec<_> = store.latest(2).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(latest, vec!["b", "c"]);
        assert_eq!(store.categories().await.unwrap(), vec!["art", "music"]);
        assert_eq!(store.all().await.unwrap().len(), 3);
    }
}
