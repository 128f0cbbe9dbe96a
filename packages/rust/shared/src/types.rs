//! Core domain types: rows flowing through the pipelines and search hits.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output field holding the event timestamp.
pub const TIME_FIELD: &str = "_time";

/// Output field holding the JSON dump of the whole hit.
pub const RAW_FIELD: &str = "_raw";

/// Output fields carrying backend metadata, in emission order.
pub const META_FIELDS: [&str; 4] = ["es_index", "es_type", "es_id", "es_score"];

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// The value of one field in a [`Record`]: a single scalar or an ordered list
/// of scalars.
///
/// Scalars are JSON values that are neither arrays nor objects. Containers
/// nested inside a list are kept as compact JSON text so the value stays flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FieldValue {
    Scalar(Value),
    Multi(Vec<Value>),
}

impl FieldValue {
    /// Build a scalar from anything convertible into a JSON value.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::from(value.into())
    }

    /// Whether this value holds more than one scalar slot.
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// Render a scalar as plain text, used for index/type/id routing.
    ///
    /// Strings are returned verbatim, other scalars in their JSON form.
    /// Multivalue fields and nulls have no single textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Scalar(Value::String(s)) => Some(s.clone()),
            Self::Scalar(Value::Null) | Self::Multi(_) => None,
            Self::Scalar(other) => Some(other.to_string()),
        }
    }

    /// Combine two values into one multivalue in encounter order.
    pub fn append(self, other: FieldValue) -> FieldValue {
        let mut values = self.into_values();
        values.extend(other.into_values());
        Self::Multi(values)
    }

    fn into_values(self) -> Vec<Value> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::Multi(vs) => vs,
        }
    }
}

fn flat_scalar(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar,
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Multi(items.into_iter().map(flat_scalar).collect()),
            other => Self::Scalar(flat_scalar(other)),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Scalar(v) => v,
            FieldValue::Multi(vs) => Value::Array(vs),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One row flowing through the pipeline: field name → value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, FieldValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut FieldValue> {
        self.0.get_mut(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Set a field, replacing any previous value in place.
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    /// Remove a field, keeping the order of the remaining ones.
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.shift_remove(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Builder-style insert, handy for constructing rows in tests and drivers.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, FieldValue::from(value.into()));
        self
    }
}

impl IntoIterator for Record {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<(String, FieldValue)> for Record {
    fn extend<T: IntoIterator<Item = (String, FieldValue)>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

// ---------------------------------------------------------------------------
// MatchedDocument
// ---------------------------------------------------------------------------

/// One hit returned by the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedDocument {
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Document body, usually a nested JSON object.
    #[serde(rename = "_source", default)]
    pub source: serde_json::Map<String, Value>,
    /// The hit exactly as the backend returned it, including keys such as
    /// `sort` or `_version` that are not modelled above.
    #[serde(skip)]
    pub raw: Option<Value>,
}

impl MatchedDocument {
    /// Decode a hit and keep the original JSON alongside it.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let mut hit: Self = serde_json::from_value(value.clone())?;
        hit.raw = Some(value);
        Ok(hit)
    }

    /// Metadata values paired with their output field names, skipping absent ones.
    pub fn metadata(&self) -> Vec<(&'static str, FieldValue)> {
        let values = [
            self.index.clone().map(Value::from),
            self.doc_type.clone().map(Value::from),
            self.id.clone().map(Value::from),
            self.score.map(Value::from),
        ];
        META_FIELDS
            .into_iter()
            .zip(values)
            .filter_map(|(name, value)| value.map(|v| (name, FieldValue::Scalar(v))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_value_from_json() {
        assert_eq!(FieldValue::from(json!(5)), FieldValue::Scalar(json!(5)));
        assert_eq!(
            FieldValue::from(json!(["a", 1])),
            FieldValue::Multi(vec![json!("a"), json!(1)])
        );
        assert_eq!(
            FieldValue::from(json!([{"k": 1}])),
            FieldValue::Multi(vec![json!(r#"{"k":1}"#)])
        );
    }

    #[test]
    fn append_keeps_encounter_order() {
        let v = FieldValue::scalar(1)
            .append(FieldValue::scalar(2))
            .append(FieldValue::scalar(3));
        assert_eq!(v, FieldValue::Multi(vec![json!(1), json!(2), json!(3)]));
    }

    #[test]
    fn record_serializes_in_insertion_order() {
        let record = Record::new().with("zeta", 1).with("alpha", "x");
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"zeta":1,"alpha":"x"}"#);
    }

    #[test]
    fn record_deserializes_lists_as_multi() {
        let record: Record =
            serde_json::from_str(r#"{"host":"web-1","tags":["a","b"]}"#).expect("deserialize");
        assert_eq!(record.get("host"), Some(&FieldValue::scalar("web-1")));
        assert!(record.get("tags").is_some_and(FieldValue::is_multi));
    }

    #[test]
    fn as_text_renders_routing_values() {
        assert_eq!(FieldValue::scalar("logs-1").as_text().as_deref(), Some("logs-1"));
        assert_eq!(FieldValue::scalar(42).as_text().as_deref(), Some("42"));
        assert_eq!(FieldValue::from(json!(["a", "b"])).as_text(), None);
    }

    #[test]
    fn matched_document_keeps_raw_hit() {
        let value = json!({
            "_index": "logs",
            "_id": "1",
            "_score": null,
            "_version": 3,
            "sort": [1709287200000_i64],
            "_source": {"a": 1}
        });
        let hit = MatchedDocument::from_value(value.clone()).expect("decode hit");

        assert_eq!(hit.score, None);
        assert_eq!(hit.source.get("a"), Some(&json!(1)));
        assert_eq!(hit.raw, Some(value));
    }

    #[test]
    fn matched_document_metadata_skips_absent() {
        let hit: MatchedDocument = serde_json::from_value(json!({
            "_index": "logs",
            "_id": "abc",
            "_score": 1.5,
            "_source": {"msg": "hi"}
        }))
        .expect("deserialize hit");

        let names: Vec<_> = hit.metadata().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["es_index", "es_id", "es_score"]);
    }
}
