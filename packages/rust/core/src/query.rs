//! Build search queries from the effective config and the current record.

use esbridge_search::{Clause, Query};
use esbridge_shared::{EffectiveConfig, EsBridgeError, Record, Result};

/// The query shared by every search: free text, plus the time range and sort
/// unless timestamps are disabled.
pub fn base_query(config: &EffectiveConfig) -> Query {
    if config.no_timestamp {
        return Query {
            must: vec![Clause::QueryString(config.query.clone())],
            sort_field: None,
        };
    }

    Query {
        must: vec![
            Clause::Range {
                field: config.tsfield.clone(),
                gte: config.earliest,
                lte: config.latest,
            },
            Clause::QueryString(config.query.clone()),
        ],
        sort_field: Some(config.tsfield.clone()),
    }
}

/// The correlation query for one record: [`base_query`] plus one match clause
/// per correlation field, valued from the record.
pub fn build_query(config: &EffectiveConfig, record: &Record, ordinal: usize) -> Result<Query> {
    let mut query = base_query(config);

    for field in &config.correlate_fields {
        let value = record
            .get(field)
            .ok_or_else(|| EsBridgeError::MissingCorrelationField {
                record: ordinal,
                field: field.clone(),
            })?;

        query.must.push(Clause::Match {
            field: field.clone(),
            value: value.clone(),
        });
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::config;
    use esbridge_shared::FieldValue;

    #[test]
    fn correlation_fields_read_from_record() {
        let mut cfg = config();
        cfg.correlate_fields = vec!["user".into(), "host".into()];
        let record = Record::new().with("user", "alice").with("host", "web-1");

        let query = build_query(&cfg, &record, 1).unwrap();

        assert_eq!(query.sort_field.as_deref(), Some("@timestamp"));
        assert_eq!(query.must.len(), 4);
        assert_eq!(
            query.must[0],
            Clause::Range {
                field: "@timestamp".into(),
                gte: cfg.earliest,
                lte: cfg.latest,
            }
        );
        assert_eq!(query.must[1], Clause::QueryString("*".into()));
        assert_eq!(
            query.must[2],
            Clause::Match {
                field: "user".into(),
                value: FieldValue::scalar("alice"),
            }
        );
    }

    #[test]
    fn no_timestamp_emits_only_free_text() {
        let mut cfg = config();
        cfg.no_timestamp = true;
        cfg.query = "status:500".into();

        let query = base_query(&cfg);
        assert_eq!(query.must, vec![Clause::QueryString("status:500".into())]);
        assert!(query.sort_field.is_none());
    }

    #[test]
    fn no_timestamp_still_matches_correlation_fields() {
        let mut cfg = config();
        cfg.no_timestamp = true;
        cfg.correlate_fields = vec!["user".into()];
        let record = Record::new().with("user", "alice");

        let query = build_query(&cfg, &record, 1).unwrap();
        assert_eq!(
            query.must,
            vec![
                Clause::QueryString("*".into()),
                Clause::Match {
                    field: "user".into(),
                    value: FieldValue::scalar("alice"),
                },
            ]
        );
        assert!(query.sort_field.is_none());
    }

    #[test]
    fn missing_correlation_field_is_an_error() {
        let mut cfg = config();
        cfg.correlate_fields = vec!["user".into()];
        let record = Record::new().with("host", "web-1");

        let err = build_query(&cfg, &record, 7).unwrap_err();
        match err {
            EsBridgeError::MissingCorrelationField { record, field } => {
                assert_eq!(record, 7);
                assert_eq!(field, "user");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
