// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Listing-specific projection applied before the generic pass.
//!
//! - identity: `_id`, then `id`, then `serviceId`, then the record key
//! - `location` rebuilt as `{city, state, country, lat, lng}`; a GeoJSON
//!   `[lng, lat]` pair wins over explicit `lat`/`lng`
//! - `availability` rebuilt as `{days, timeSlots}`
//! - `tags`/`images` keep non-empty strings (and numbers, which is what
//!   numeric-looking tags become after one pass)
//! - string `price` parsed as a number, dropped when unparseable
//! - top-level `coordinates` dropped

use tracing::debug;

use super::sanitizer::{DocumentSanitizer, SanitizedDocument, ID_FIELD};
use crate::listing::ListingRecord;
use crate::value::{Mapping, Value};

const SERVICE_ID: &str = "serviceId";
const LOCATION: &str = "location";
const AVAILABILITY: &str = "availability";
const COORDINATES: &str = "coordinates";
const PRICE: &str = "price";
const LIST_FIELDS: [&str; 2] = ["tags", "images"];
const PLACE_FIELDS: [&str; 3] = ["city", "state", "country"];

impl DocumentSanitizer {
    /// Project and sanitize one listing into its index form.
    ///
    /// The result always carries a string `id`.
    pub fn sanitize_record(&self, record: &ListingRecord) -> SanitizedDocument {
        let (id, projected) = project_listing(record, &self.options().primary_key_field);
        let mut fields = self.sanitize_mapping(&projected);
        // The generic pass may coerce a numeric-looking id; identity stays textual
        fields.insert(ID_FIELD.to_string(), Value::String(id));
        SanitizedDocument::new(fields)
    }

    pub fn sanitize_records(&self, records: &[ListingRecord]) -> Vec<SanitizedDocument> {
        let documents: Vec<_> = records.iter().map(|r| self.sanitize_record(r)).collect();
        debug!(count = documents.len(), "Sanitized listing records");
        documents
    }
}

fn project_listing(record: &ListingRecord, primary_key: &str) -> (String, Mapping) {
    let attributes = &record.attributes;

    let id = [primary_key, ID_FIELD, SERVICE_ID]
        .iter()
        .find_map(|key| attributes.get(*key).and_then(Value::to_id_string))
        .unwrap_or_else(|| record.id.clone());

    let mut projected: Mapping = attributes
        .iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            key != primary_key && key != LOCATION && key != AVAILABILITY && key != COORDINATES
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    projected.insert(ID_FIELD.to_string(), Value::String(id.clone()));

    if let Some(Value::Mapping(location)) = attributes.get(LOCATION) {
        projected.insert(LOCATION.to_string(), Value::Mapping(project_location(location)));
    }

    if let Some(availability) = attributes.get(AVAILABILITY).filter(|v| !v.is_null()) {
        projected.insert(AVAILABILITY.to_string(), project_availability(availability));
    }

    for field in LIST_FIELDS {
        if let Some(Value::Sequence(items)) = projected.get(field) {
            let kept = items.iter().filter(|item| is_listable(item)).cloned().collect();
            projected.insert(field.to_string(), Value::Sequence(kept));
        }
    }

    if let Some(Value::String(raw)) = projected.get(PRICE) {
        let price = match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Null,
        };
        projected.insert(PRICE.to_string(), price);
    }

    (id, projected)
}

fn project_location(location: &Mapping) -> Mapping {
    let mut out = Mapping::new();
    for field in PLACE_FIELDS {
        if let Some(value) = location.get(field) {
            out.insert(field.to_string(), value.clone());
        }
    }

    let mut lat = location.get("lat").cloned();
    let mut lng = location.get("lng").cloned();

    match location.get(COORDINATES) {
        Some(Value::Mapping(coordinates)) => {
            if let Some(v) = coordinates.get("lat") {
                lat = Some(v.clone());
            }
            if let Some(v) = coordinates.get("lng") {
                lng = Some(v.clone());
            }
            if let Some((point_lng, point_lat)) = coordinates.get(COORDINATES).and_then(point) {
                lng = Some(point_lng);
                lat = Some(point_lat);
            }
        }
        Some(pair @ Value::Sequence(_)) => {
            if let Some((point_lng, point_lat)) = point(pair) {
                lng = Some(point_lng);
                lat = Some(point_lat);
            }
        }
        _ => {}
    }

    if let Some(lat) = lat {
        out.insert("lat".to_string(), lat);
    }
    if let Some(lng) = lng {
        out.insert("lng".to_string(), lng);
    }
    out
}

/// GeoJSON point order: `[lng, lat]`.
fn point(value: &Value) -> Option<(Value, Value)> {
    match value.as_sequence()? {
        [lng, lat, ..] => Some((lng.clone(), lat.clone())),
        _ => None,
    }
}

fn project_availability(availability: &Value) -> Value {
    let list = |key: &str| match availability.get(key) {
        Some(items @ Value::Sequence(_)) => items.clone(),
        _ => Value::Sequence(Vec::new()),
    };
    let mut out = Mapping::new();
    out.insert("days".to_string(), list("days"));
    out.insert("timeSlots".to_string(), list("timeSlots"));
    Value::Mapping(out)
}

fn is_listable(item: &Value) -> bool {
    match item {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.is_finite(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sanitize(attributes: serde_json::Value) -> SanitizedDocument {
        DocumentSanitizer::default().sanitize_record(&ListingRecord::from_json("ss_key", attributes))
    }

    #[test]
    fn test_identity_precedence() {
        assert_eq!(sanitize(json!({"_id": {"$oid": "oid1"}, "serviceId": "ss_1"})).id(), Some("oid1"));
        assert_eq!(sanitize(json!({"id": "plain", "serviceId": "ss_1"})).id(), Some("plain"));
        assert_eq!(sanitize(json!({"serviceId": "ss_1"})).id(), Some("ss_1"));
        assert_eq!(sanitize(json!({"title": "x"})).id(), Some("ss_key"));
    }

    #[test]
    fn test_numeric_looking_id_stays_text() {
        let doc = sanitize(json!({"id": "12345"}));
        assert_eq!(doc.get("id"), Some(&Value::from("12345")));
    }

    #[test]
    fn test_geojson_location() {
        let doc = sanitize(json!({
            "location": {
                "city": "Austin",
                "state": "TX",
                "zip": "73301",
                "coordinates": {"type": "Point", "coordinates": [-97.74, 30.27]}
            }
        }));

        assert_eq!(doc.get_path("location.lat"), Some(&Value::Number(30.27)));
        assert_eq!(doc.get_path("location.lng"), Some(&Value::Number(-97.74)));
        assert_eq!(doc.get_path("location.city"), Some(&Value::from("Austin")));
        // Only the projected location fields survive
        assert!(doc.get_path("location.zip").is_none());
        assert!(doc.get_path("location.coordinates").is_none());
    }

    #[test]
    fn test_explicit_coordinates() {
        let doc = sanitize(json!({"location": {"coordinates": {"lat": 1.5, "lng": 2.5}}}));
        assert_eq!(doc.get_path("location.lat"), Some(&Value::Number(1.5)));
        assert_eq!(doc.get_path("location.lng"), Some(&Value::Number(2.5)));
    }

    #[test]
    fn test_non_mapping_location_dropped() {
        let doc = sanitize(json!({"location": "somewhere", "title": "t"}));
        assert!(doc.get("location").is_none());
    }

    #[test]
    fn test_top_level_coordinates_dropped() {
        let doc = sanitize(json!({"coordinates": [1, 2], "title": "t"}));
        assert!(doc.get("coordinates").is_none());
    }

    #[test]
    fn test_availability_projection() {
        let doc = sanitize(json!({
            "availability": {"days": ["mon", "tue"], "timeSlots": "bad", "note": "x"}
        }));
        assert_eq!(
            doc.get("availability"),
            Some(&Value::from(json!({"days": ["mon", "tue"]})))
        );

        // Both lists empty: removed as an empty mapping
        let doc = sanitize(json!({"availability": {"note": "x"}}));
        assert!(doc.get("availability").is_none());
    }

    #[test]
    fn test_tags_and_images_filtered() {
        let doc = sanitize(json!({
            "tags": ["wedding", "", "  ", null, {"x": 1}, "outdoor"],
            "images": ["a.jpg", 5]
        }));
        assert_eq!(doc.get("tags"), Some(&Value::from(json!(["wedding", "outdoor"]))));
        assert_eq!(doc.get("images"), Some(&Value::from(json!(["a.jpg", 5]))));
    }

    #[test]
    fn test_price_parsing() {
        assert_eq!(sanitize(json!({"price": " 99.5 "})).get("price"), Some(&Value::Number(99.5)));
        assert_eq!(sanitize(json!({"price": 40})).get("price"), Some(&Value::Number(40.0)));
        assert!(sanitize(json!({"price": "call me"})).get("price").is_none());
    }

    #[test]
    fn test_created_at_rendered_as_iso() {
        let doc = sanitize(json!({"createdAt": {"$date": "2025-06-01T12:00:00Z"}}));
        assert_eq!(doc.get("createdAt"), Some(&Value::from("2025-06-01T12:00:00.000Z")));
    }

    #[test]
    fn test_record_sanitization_idempotent() {
        let sanitizer = DocumentSanitizer::default();
        let record = ListingRecord::from_json(
            "ss_1",
            json!({
                "_id": {"$oid": "65f1"},
                "title": "  Portraits ",
                "price": "120",
                "tags": ["12", "studio"],
                "location": {"city": "Reno", "coordinates": {"coordinates": [-119.8, 39.5]}},
                "availability": {"days": ["sat"]},
                "meta": {"a": {"b": {"c": {"d": 1}}}}
            }),
        );

        let once = sanitizer.sanitize_record(&record);
        let again = sanitizer.sanitize_record(&ListingRecord::new("ss_1", once.fields().clone()));
        assert_eq!(once, again);
    }
}
