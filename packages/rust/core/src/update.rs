//! Partial updates driven by edited records.
//!
//! A record names its target document through the routing fields
//! (`index_field`, `stype_field`, `id_field`); whatever remains after the
//! derived and internal fields are stripped becomes the `doc` of a partial
//! update.

use serde::Serialize;
use tracing::{debug, instrument};

use esbridge_search::{SearchBackend, UpdateRequest};
use esbridge_shared::{
    EffectiveConfig, EsBridgeError, META_FIELDS, RAW_FIELD, Record, Result, TIME_FIELD,
};

use crate::merge::hit_fields;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Body of a partial update: `{"doc": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatePayload {
    pub doc: Record,
}

/// Where an update goes and what it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTarget {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub payload: UpdatePayload,
}

/// Derive the update target and payload for one record.
///
/// Record routing values override the configured index and first document
/// type. `ordinal` is the 1-based position of the record in its stream and
/// only feeds error messages.
pub fn build_update(config: &EffectiveConfig, record: &Record, ordinal: usize) -> Result<UpdateTarget> {
    let index = match routing_text(record, &config.index_field, ordinal)? {
        Some(index) => index,
        None => config
            .index
            .clone()
            .ok_or_else(|| EsBridgeError::MissingRoutingField {
                record: ordinal,
                target: "index",
                option: "index",
                field: config.index_field.clone(),
            })?,
    };

    let doc_type = match routing_text(record, &config.stype_field, ordinal)? {
        Some(doc_type) => doc_type,
        None => config
            .stype
            .as_ref()
            .and_then(|types| types.first().cloned())
            .ok_or_else(|| EsBridgeError::MissingRoutingField {
                record: ordinal,
                target: "document type",
                option: "stype",
                field: config.stype_field.clone(),
            })?,
    };

    let id = routing_text(record, &config.id_field, ordinal)?.ok_or_else(|| {
        EsBridgeError::MissingIdField {
            record: ordinal,
            field: config.id_field.clone(),
        }
    })?;

    let stripped = [
        TIME_FIELD,
        RAW_FIELD,
        config.index_field.as_str(),
        config.stype_field.as_str(),
        config.id_field.as_str(),
    ];
    let doc = record
        .iter()
        .filter(|(field, _)| {
            !stripped.contains(&field.as_str()) && !META_FIELDS.contains(&field.as_str())
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    Ok(UpdateTarget {
        index,
        doc_type,
        id,
        payload: UpdatePayload { doc },
    })
}

/// A routing value rendered as text, `None` when the record lacks the field.
fn routing_text(record: &Record, field: &str, ordinal: usize) -> Result<Option<String>> {
    let Some(value) = record.get(field) else {
        return Ok(None);
    };
    value.as_text().map(Some).ok_or_else(|| {
        EsBridgeError::validation(format!(
            "record {ordinal}: routing field '{field}' must hold a single non-null value"
        ))
    })
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Apply the update for one record and return the row built from the
/// updated document.
#[instrument(skip_all, fields(record = ordinal))]
pub async fn update_record<B: SearchBackend>(
    backend: &B,
    config: &EffectiveConfig,
    record: &Record,
    ordinal: usize,
) -> Result<Record> {
    let target = build_update(config, record, ordinal)?;
    debug!(
        index = %target.index,
        doc_type = %target.doc_type,
        id = %target.id,
        fields = target.payload.doc.len(),
        "applying partial update"
    );

    let payload = serde_json::to_value(&target.payload)
        .map_err(|e| EsBridgeError::validation(format!("record {ordinal}: {e}")))?;

    let request = UpdateRequest {
        index: target.index,
        doc_type: target.doc_type,
        id: target.id,
        payload,
        includes: config.fields.clone(),
        excludes: config.exclude_fields.clone(),
        refresh: config.force_refresh,
    };

    let updated = backend.update(&request).await?;
    hit_fields(config, &updated.document, Some(&updated.raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBackend, config, hit};
    use esbridge_shared::FieldValue;
    use serde_json::json;

    fn edited_record() -> Record {
        Record::new()
            .with("_time", "2024-03-01T10:00:00.000000Z")
            .with("_raw", "{}")
            .with("es_index", "logs-2024")
            .with("es_type", "event")
            .with("es_id", "abc")
            .with("status", "closed")
            .with("owner", "bob")
    }

    #[test]
    fn payload_keeps_only_content_fields() {
        let target = build_update(&config(), &edited_record(), 1).unwrap();

        assert_eq!(target.index, "logs-2024");
        assert_eq!(target.doc_type, "event");
        assert_eq!(target.id, "abc");

        let doc: Vec<_> = target.payload.doc.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(doc, vec!["status", "owner"]);
        assert_eq!(
            serde_json::to_value(&target.payload).unwrap(),
            json!({"doc": {"status": "closed", "owner": "bob"}})
        );
    }

    #[test]
    fn configured_routing_used_when_record_lacks_it() {
        let mut cfg = config();
        cfg.index = Some("fallback".into());
        cfg.stype = Some(vec!["first".into(), "second".into()]);
        let record = Record::new().with("es_id", 7).with("status", "open");

        let target = build_update(&cfg, &record, 1).unwrap();
        assert_eq!(target.index, "fallback");
        assert_eq!(target.doc_type, "first");
        assert_eq!(target.id, "7");
    }

    #[test]
    fn record_routing_overrides_config_and_is_consumed() {
        let mut cfg = config();
        cfg.index = Some("fallback".into());
        cfg.index_field = "target_index".into();
        let record = Record::new()
            .with("target_index", "override")
            .with("es_type", "event")
            .with("es_id", "1")
            .with("status", "open");

        let target = build_update(&cfg, &record, 1).unwrap();
        assert_eq!(target.index, "override");
        assert!(!target.payload.doc.contains("target_index"));
    }

    #[test]
    fn missing_index_is_a_routing_error() {
        let record = Record::new().with("es_type", "event").with("es_id", "1");
        let err = build_update(&config(), &record, 4).unwrap_err();
        match err {
            EsBridgeError::MissingRoutingField { record, target, .. } => {
                assert_eq!(record, 4);
                assert_eq!(target, "index");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_id_is_an_error() {
        let record = Record::new().with("es_index", "logs").with("es_type", "event");
        let err = build_update(&config(), &record, 2).unwrap_err();
        assert!(matches!(err, EsBridgeError::MissingIdField { record: 2, .. }));
    }

    #[test]
    fn multivalue_routing_is_rejected() {
        let record = Record::new()
            .with("es_index", json!(["a", "b"]))
            .with("es_type", "event")
            .with("es_id", "1");
        let err = build_update(&config(), &record, 1).unwrap_err();
        assert!(matches!(err, EsBridgeError::Validation { .. }));
    }

    #[tokio::test]
    async fn update_record_sends_request_and_builds_row() {
        let mut cfg = config();
        cfg.force_refresh = true;
        cfg.include_es = true;

        let mut updated = hit(json!({"@timestamp": "2024-03-01T10:00:00.5Z", "status": "closed"}));
        updated.score = None;
        let backend = FakeBackend::with_update(updated);

        let row = update_record(&backend, &cfg, &edited_record(), 1).await.unwrap();

        let requests = backend.updates();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "abc");
        assert!(requests[0].refresh);
        assert_eq!(
            requests[0].payload,
            json!({"doc": {"status": "closed", "owner": "bob"}})
        );

        assert_eq!(
            row.get("_time"),
            Some(&FieldValue::scalar("1709287200.500000"))
        );
        assert_eq!(row.get("status"), Some(&FieldValue::scalar("closed")));
        assert!(row.contains("es_id"));
        assert!(!row.contains("es_score"));
    }
}
