//! Structured search query model and its Elasticsearch JSON rendering.

use serde_json::{Value, json};

use esbridge_shared::FieldValue;

/// One clause of the boolean AND query.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Free-text `query_string` clause.
    QueryString(String),
    /// Inclusive epoch-seconds range on a timestamp field.
    Range { field: String, gte: i64, lte: i64 },
    /// Match a field against a record value. A multivalue matches any of its values.
    Match { field: String, value: FieldValue },
}

impl Clause {
    fn to_json(&self) -> Value {
        match self {
            Self::QueryString(query) => json!({ "query_string": { "query": query } }),
            Self::Range { field, gte, lte } => json!({
                "range": {
                    field.as_str(): { "gte": gte, "lte": lte, "format": "epoch_second" }
                }
            }),
            Self::Match {
                field,
                value: FieldValue::Scalar(v),
            } => json!({ "match": { field.as_str(): v } }),
            Self::Match {
                field,
                value: FieldValue::Multi(values),
            } => {
                let should: Vec<Value> = values
                    .iter()
                    .map(|v| json!({ "match": { field.as_str(): v } }))
                    .collect();
                json!({ "bool": { "should": should, "minimum_should_match": 1 } })
            }
        }
    }
}

/// A boolean AND of clauses, optionally sorted ascending by one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub must: Vec<Clause>,
    pub sort_field: Option<String>,
}

impl Query {
    /// Render as the `query`/`sort` portion of a search body.
    pub fn to_json(&self) -> Value {
        let must: Vec<Value> = self.must.iter().map(Clause::to_json).collect();
        let mut body = json!({ "query": { "bool": { "must": must } } });

        if let Some(field) = &self.sort_field {
            body["sort"] = json!([{ field.as_str(): { "order": "asc" } }]);
        }

        body
    }
}
