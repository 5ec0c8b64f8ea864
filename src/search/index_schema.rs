// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index Schema
//!
//! Fixed declaration of searchable, filterable and sortable attributes for
//! one index collection. Reapplying it is idempotent.
//!
//! # RediSearch Index Creation
//!
//! Each declared attribute becomes one or two RediSearch fields. Aliases
//! replace `.` with `_` since RediSearch field names cannot contain dots.
//!
//! ```text
//! FT.CREATE idx:services
//!   ON JSON
//!   PREFIX 1 services:
//!   SCHEMA
//!     $.title AS title TEXT
//!     $.category AS category TAG
//!     $.category AS category_text TEXT
//!     $.price AS price NUMERIC SORTABLE
//!     $.createdAt AS createdAt TEXT SORTABLE NOINDEX
//! ```

use std::collections::BTreeSet;

/// Search index definition
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    /// Collection name
    pub name: String,
    /// Attribute holding the document identity
    pub primary_key: String,
    /// Attributes matched by free-text queries
    pub searchable: Vec<String>,
    /// Attributes usable in filter expressions
    pub filterable: Vec<String>,
    /// Attributes usable in sort clauses
    pub sortable: Vec<String>,
    /// Attributes holding numbers (range filters, numeric sort)
    pub numeric: BTreeSet<String>,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            searchable: Vec::new(),
            filterable: Vec::new(),
            sortable: Vec::new(),
            numeric: BTreeSet::new(),
        }
    }

    /// The marketplace listing schema.
    pub fn listings(name: impl Into<String>) -> Self {
        Self::new(name)
            .searchable([
                "title",
                "description",
                "tags",
                "location.city",
                "location.state",
                "sellerId",
                "category",
            ])
            .filterable(["price", "category", "location.state", "location.city", "sellerId"])
            .sortable(["createdAt", "price", "popularityScore", "averageRating"])
            .numeric(["price", "popularityScore", "averageRating"])
    }

    pub fn searchable<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn filterable<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn sortable<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn numeric<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn is_searchable(&self, attribute: &str) -> bool {
        self.searchable.iter().any(|a| a == attribute)
    }

    pub fn is_filterable(&self, attribute: &str) -> bool {
        self.filterable.iter().any(|a| a == attribute)
    }

    pub fn is_sortable(&self, attribute: &str) -> bool {
        self.sortable.iter().any(|a| a == attribute)
    }

    pub fn is_numeric(&self, attribute: &str) -> bool {
        self.numeric.contains(attribute)
    }

    /// RediSearch field name for an attribute path.
    pub fn alias(attribute: &str) -> String {
        attribute.replace('.', "_")
    }

    /// Every declared attribute once, in declaration order.
    pub fn attributes(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.searchable
            .iter()
            .chain(&self.filterable)
            .chain(&self.sortable)
            .map(String::as_str)
            .filter(|a| seen.insert(*a))
            .collect()
    }

    /// RediSearch fields derived from the attribute lists.
    pub fn fields(&self) -> Vec<SearchField> {
        let mut fields = Vec::new();
        for attribute in self.attributes() {
            let sortable = self.is_sortable(attribute);
            let searchable = self.is_searchable(attribute);

            if self.is_numeric(attribute) {
                fields.push(SearchField::new(attribute, SearchFieldType::Numeric).sortable(sortable));
            } else if self.is_filterable(attribute) {
                fields.push(SearchField::new(attribute, SearchFieldType::Tag).sortable(sortable));
                if searchable {
                    fields.push(
                        SearchField::new(attribute, SearchFieldType::Text)
                            .with_alias(format!("{}_text", Self::alias(attribute))),
                    );
                }
            } else if searchable {
                fields.push(SearchField::new(attribute, SearchFieldType::Text).sortable(sortable));
            } else {
                // Sort-only text attribute (ISO timestamps sort lexically)
                fields.push(
                    SearchField::new(attribute, SearchFieldType::Text)
                        .sortable(true)
                        .no_index(),
                );
            }
        }
        fields
    }

    /// Text fields a free-text query runs against.
    pub fn text_fields(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .filter(|f| f.field_type == SearchFieldType::Text && !f.no_index)
            .map(|f| f.alias)
            .collect()
    }

    /// Generate FT.CREATE args with the given redis key namespace
    ///
    /// The namespace is prepended to both the index name and the key prefix
    /// to match the actual key structure in Redis.
    pub fn to_ft_create_args(&self, redis_prefix: &str) -> Vec<String> {
        let mut args = vec![
            Self::ft_index_name(redis_prefix, &self.name),
            "ON".to_string(),
            "JSON".to_string(),
            "PREFIX".to_string(),
            "1".to_string(),
            Self::key_prefix(redis_prefix, &self.name),
            "SCHEMA".to_string(),
        ];

        for field in self.fields() {
            args.extend(field.to_schema_args());
        }

        args
    }

    /// `{namespace}idx:{index}`
    pub fn ft_index_name(redis_prefix: &str, index: &str) -> String {
        format!("{redis_prefix}idx:{index}")
    }

    /// `{namespace}{index}:` - every document key of the index starts with it
    pub fn key_prefix(redis_prefix: &str, index: &str) -> String {
        format!("{redis_prefix}{index}:")
    }
}

/// Search field definition
#[derive(Debug, Clone, PartialEq)]
pub struct SearchField {
    /// Attribute path in the document (dotted)
    pub attribute: String,
    /// Field name used in queries
    pub alias: String,
    /// Field type
    pub field_type: SearchFieldType,
    /// Whether the field is sortable
    pub sortable: bool,
    /// Whether to exclude from indexing (SORTABLE-only fields)
    pub no_index: bool,
}

impl SearchField {
    fn new(attribute: &str, field_type: SearchFieldType) -> Self {
        Self {
            attribute: attribute.to_string(),
            alias: IndexSchema::alias(attribute),
            field_type,
            sortable: false,
            no_index: false,
        }
    }

    fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    fn no_index(mut self) -> Self {
        self.no_index = true;
        self
    }

    fn with_alias(mut self, alias: String) -> Self {
        self.alias = alias;
        self
    }

    /// JSONPath of the attribute (`location.state` → `$.location.state`)
    pub fn json_path(&self) -> String {
        format!("$.{}", self.attribute)
    }

    fn to_schema_args(&self) -> Vec<String> {
        let mut args = vec![
            self.json_path(),
            "AS".to_string(),
            self.alias.clone(),
            self.field_type.to_string(),
        ];

        if self.sortable {
            args.push("SORTABLE".to_string());
        }

        if self.no_index {
            args.push("NOINDEX".to_string());
        }

        args
    }
}

/// Search field types used by the listing index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFieldType {
    /// Full-text searchable field
    Text,
    /// Numeric field (supports range queries)
    Numeric,
    /// Tag field (exact match)
    Tag,
}

impl std::fmt::Display for SearchFieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchFieldType::Text => write!(f, "TEXT"),
            SearchFieldType::Numeric => write!(f, "NUMERIC"),
            SearchFieldType::Tag => write!(f, "TAG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listings_preset() {
        let schema = IndexSchema::listings("services");
        assert_eq!(schema.primary_key, "id");
        assert!(schema.is_searchable("location.city"));
        assert!(schema.is_filterable("location.state"));
        assert!(schema.is_sortable("createdAt"));
        assert!(schema.is_numeric("price"));
        assert!(!schema.is_sortable("title"));
    }

    #[test]
    fn test_attributes_deduplicated() {
        let schema = IndexSchema::new("x")
            .searchable(["title", "category"])
            .filterable(["category", "price"])
            .sortable(["price"]);
        assert_eq!(schema.attributes(), vec!["title", "category", "price"]);
    }

    #[test]
    fn test_ft_create_full_command() {
        let schema = IndexSchema::new("services")
            .searchable(["title", "location.city"])
            .filterable(["location.city", "price"])
            .sortable(["price", "createdAt"])
            .numeric(["price"]);

        let args = schema.to_ft_create_args("market:");
        assert_eq!(args[0], "market:idx:services");
        assert_eq!(args[6], "SCHEMA");

        let cmd = format!("FT.CREATE {}", args.join(" "));
        assert!(cmd.contains("ON JSON"));
        assert!(cmd.contains("PREFIX 1 market:services:"));
        assert!(cmd.contains("$.title AS title TEXT"));
        assert!(cmd.contains("$.location.city AS location_city TAG"));
        assert!(cmd.contains("$.location.city AS location_city_text TEXT"));
        assert!(cmd.contains("$.price AS price NUMERIC SORTABLE"));
        assert!(cmd.contains("$.createdAt AS createdAt TEXT SORTABLE NOINDEX"));
    }

    #[test]
    fn test_text_fields() {
        let schema = IndexSchema::listings("services");
        let text = schema.text_fields();
        assert!(text.contains(&"title".to_string()));
        assert!(text.contains(&"category_text".to_string()));
        assert!(!text.contains(&"createdAt".to_string()));
        assert!(!text.contains(&"category".to_string()));
    }

    #[test]
    fn test_alias() {
        assert_eq!(IndexSchema::alias("location.state"), "location_state");
        assert_eq!(IndexSchema::alias("price"), "price");
    }
}
