//! Combine an input record with the documents it matched.

use std::mem;

use chrono::Utc;
use serde_json::Value;

use esbridge_shared::time::decode_document_timestamp;
use esbridge_shared::{
    EffectiveConfig, EsBridgeError, FieldValue, MatchedDocument, RAW_FIELD, Record, Result,
    TIME_FIELD,
};

use crate::flatten::flatten_fields;

/// Turn one hit into output fields: `_time`, the flattened source, then the
/// optional `es_*` metadata and `_raw` dump.
///
/// `raw` is the payload to dump as `_raw`; when absent the hit itself is used.
pub fn hit_fields(
    config: &EffectiveConfig,
    hit: &MatchedDocument,
    raw: Option<&Value>,
) -> Result<Record> {
    let mut out = Record::new();

    if config.no_timestamp {
        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        out.insert(TIME_FIELD, FieldValue::scalar(now));
    } else if let Some(ts) = hit.source.get(&config.tsfield) {
        let time = if config.convert_timestamp {
            FieldValue::scalar(decode_document_timestamp(ts)?)
        } else {
            FieldValue::from(ts.clone())
        };
        out.insert(TIME_FIELD, time);
    }

    out.extend(flatten_fields(
        hit.source.iter().filter(|(key, _)| **key != config.tsfield),
    ));

    if config.include_es {
        out.extend(
            hit.metadata()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value)),
        );
    }

    if config.include_raw {
        let dump = match raw {
            Some(raw) => raw.to_string(),
            None => serde_json::to_string(hit).map_err(|e| {
                EsBridgeError::validation(format!("cannot serialize hit for {RAW_FIELD}: {e}"))
            })?,
        };
        out.insert(RAW_FIELD, FieldValue::scalar(dump));
    }

    Ok(out)
}

/// Merge `record` with its matches.
///
/// Fan-out (default) emits one copy of the record per match, overlaid with the
/// match's fields. Fan-in (`return_mv`) folds every match into a single record,
/// turning repeated fields into multivalues.
pub fn merge(
    config: &EffectiveConfig,
    record: &Record,
    matches: &[MatchedDocument],
) -> Result<Vec<Record>> {
    if config.return_mv {
        let mut acc = record.clone();
        for hit in matches {
            accumulate(&mut acc, hit_fields(config, hit, hit.raw.as_ref())?);
        }
        return Ok(vec![acc]);
    }

    matches
        .iter()
        .map(|hit| {
            let mut row = record.clone();
            row.extend(hit_fields(config, hit, hit.raw.as_ref())?);
            Ok(row)
        })
        .collect()
}

fn accumulate(acc: &mut Record, fields: Record) {
    for (field, value) in fields {
        match acc.get_mut(&field) {
            Some(existing) => {
                let previous = mem::replace(existing, FieldValue::Multi(Vec::new()));
                *existing = previous.append(value);
            }
            None => acc.insert(field, value),
        }
    }
}
