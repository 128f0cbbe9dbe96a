//! Persisted endpoint configuration and effective-config resolution.
//!
//! The persisted store lives at `~/.esbridge/esbridge.json` and maps an
//! endpoint string (an address list or a short name) to stored settings.
//! Invocation options override stored values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EsBridgeError, Result};
use crate::time::{self, TimeExpression};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "esbridge.json";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".esbridge";

pub const DEFAULT_HOST: &str = "127.0.0.1:9200";
pub const DEFAULT_TSFIELD: &str = "@timestamp";
pub const DEFAULT_QUERY: &str = "*";
pub const DEFAULT_LIMIT: usize = 10_000;
pub const DEFAULT_LOOKBACK_SECS: i64 = 86_400;
pub const DEFAULT_INDEX_FIELD: &str = "es_index";
pub const DEFAULT_STYPE_FIELD: &str = "es_type";
pub const DEFAULT_ID_FIELD: &str = "es_id";

// ---------------------------------------------------------------------------
// Persisted store (matching esbridge.json schema)
// ---------------------------------------------------------------------------

/// Settings stored for one endpoint key. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredEndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_ssl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_certs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsfield: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlate_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stype: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_es: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_raw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_timestamp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_timestamp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_mv: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_refresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stype_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
}

/// The whole persisted store, keyed by endpoint string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedConfig {
    pub endpoints: BTreeMap<String, StoredEndpointConfig>,
}

impl PersistedConfig {
    pub fn get(&self, endpoint: &str) -> Option<&StoredEndpointConfig> {
        self.endpoints.get(endpoint)
    }
}

// ---------------------------------------------------------------------------
// Invocation options (parsed by the CLI, all optional)
// ---------------------------------------------------------------------------

/// Per-invocation options. `None` means "not given", so the value falls
/// through to the persisted entry and then to the default.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// Endpoint address list (`host:port,host:port`) or persisted key.
    pub eaddr: Option<String>,
    pub correlate_fields: Option<String>,
    pub return_mv: Option<bool>,
    pub index: Option<String>,
    pub scan: Option<bool>,
    pub stype: Option<String>,
    pub tsfield: Option<String>,
    pub query: Option<String>,
    pub fields: Option<String>,
    pub exclude_fields: Option<String>,
    pub limit: Option<usize>,
    pub include_es: Option<bool>,
    pub include_raw: Option<bool>,
    pub use_ssl: Option<bool>,
    pub verify_certs: Option<bool>,
    pub no_timestamp: Option<bool>,
    pub convert_timestamp: Option<bool>,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    /// Time window supplied by the host pipeline, used when `earliest` /
    /// `latest` are not given explicitly.
    pub window_start: Option<i64>,
    pub window_end: Option<i64>,
    pub index_field: Option<String>,
    pub stype_field: Option<String>,
    pub id_field: Option<String>,
    pub force_refresh: Option<bool>,
}

// ---------------------------------------------------------------------------
// Effective config (runtime, merged from store + options)
// ---------------------------------------------------------------------------

/// Fully resolved configuration, read-only for the rest of the invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub hosts: Vec<String>,
    pub use_ssl: bool,
    pub verify_certs: bool,
    pub tsfield: String,
    pub correlate_fields: Vec<String>,
    pub fields: Option<Vec<String>>,
    pub exclude_fields: Option<Vec<String>>,
    pub index: Option<String>,
    pub stype: Option<Vec<String>>,
    pub query: String,
    pub limit: usize,
    pub earliest: i64,
    pub latest: i64,
    pub scan: bool,
    pub include_es: bool,
    pub include_raw: bool,
    pub no_timestamp: bool,
    pub convert_timestamp: bool,
    pub return_mv: bool,
    pub force_refresh: bool,
    pub index_field: String,
    pub stype_field: String,
    pub id_field: String,
}

/// Split a comma-separated option into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Merge invocation options over the persisted store and built-in defaults.
pub fn resolve(opts: &InvocationOptions, persisted: &PersistedConfig) -> Result<EffectiveConfig> {
    let eaddr = opts.eaddr.as_deref().unwrap_or(DEFAULT_HOST);

    let (stored, hosts) = match persisted.get(eaddr) {
        Some(stored) => {
            tracing::debug!(endpoint = eaddr, "using persisted endpoint config");
            let hosts = stored
                .hosts
                .clone()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_HOST.to_string()]);
            (stored.clone(), hosts)
        }
        None => (StoredEndpointConfig::default(), split_list(eaddr)),
    };

    if hosts.is_empty() {
        return Err(EsBridgeError::validation(format!(
            "endpoint '{eaddr}' contains no host addresses"
        )));
    }

    let use_ssl = opts.use_ssl.or(stored.use_ssl).unwrap_or(false);
    let verify_certs = use_ssl && opts.verify_certs.or(stored.verify_certs).unwrap_or(false);

    // A timestamp field recorded for the endpoint is authoritative.
    let tsfield = stored
        .tsfield
        .clone()
        .or_else(|| opts.tsfield.clone())
        .unwrap_or_else(|| DEFAULT_TSFIELD.to_string());

    let list = |given: &Option<String>, stored: &Option<Vec<String>>| {
        given.as_deref().map(split_list).or_else(|| stored.clone())
    };

    let mut fields = list(&opts.fields, &stored.fields);
    if let Some(fields) = fields.as_mut() {
        if !fields.contains(&tsfield) {
            fields.push(tsfield.clone());
        }
    }

    let limit = opts.limit.or(stored.limit).unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(EsBridgeError::validation("limit must be greater than zero"));
    }

    let (earliest, latest) = resolve_window(opts)?;

    Ok(EffectiveConfig {
        hosts,
        use_ssl,
        verify_certs,
        correlate_fields: list(&opts.correlate_fields, &stored.correlate_fields)
            .unwrap_or_default(),
        fields,
        exclude_fields: list(&opts.exclude_fields, &stored.exclude_fields),
        index: opts.index.clone().or(stored.index),
        stype: list(&opts.stype, &stored.stype).filter(|s| !s.is_empty()),
        query: opts
            .query
            .clone()
            .or(stored.query)
            .unwrap_or_else(|| DEFAULT_QUERY.to_string()),
        limit,
        earliest,
        latest,
        scan: opts.scan.or(stored.scan).unwrap_or(true),
        include_es: opts.include_es.or(stored.include_es).unwrap_or(false),
        include_raw: opts.include_raw.or(stored.include_raw).unwrap_or(false),
        no_timestamp: opts.no_timestamp.or(stored.no_timestamp).unwrap_or(false),
        convert_timestamp: opts
            .convert_timestamp
            .or(stored.convert_timestamp)
            .unwrap_or(true),
        return_mv: opts.return_mv.or(stored.return_mv).unwrap_or(false),
        force_refresh: opts.force_refresh.or(stored.force_refresh).unwrap_or(false),
        index_field: opts
            .index_field
            .clone()
            .or(stored.index_field)
            .unwrap_or_else(|| DEFAULT_INDEX_FIELD.to_string()),
        stype_field: opts
            .stype_field
            .clone()
            .or(stored.stype_field)
            .unwrap_or_else(|| DEFAULT_STYPE_FIELD.to_string()),
        id_field: opts
            .id_field
            .clone()
            .or(stored.id_field)
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string()),
        tsfield,
    })
}

/// Resolve `(earliest, latest)` in epoch seconds.
///
/// `latest` is an instant; `earliest` is a look-back subtracted from `latest`.
fn resolve_window(opts: &InvocationOptions) -> Result<(i64, i64)> {
    let latest = match opts.latest.as_deref() {
        Some(expr) => match time::parse(expr)? {
            TimeExpression::LookBack(secs) => {
                look_back(chrono::Utc::now().timestamp(), secs, expr)?
            }
            other => other.seconds(),
        },
        None => opts
            .window_end
            .unwrap_or_else(|| chrono::Utc::now().timestamp()),
    };

    let earliest = match opts.earliest.as_deref() {
        Some(expr) => match time::parse(expr)? {
            TimeExpression::LookBack(secs) | TimeExpression::Epoch(secs) => {
                look_back(latest, secs, expr)?
            }
            TimeExpression::Now(_) | TimeExpression::Absolute(_) => {
                return Err(EsBridgeError::time_expr(
                    expr,
                    "earliest must be a look-back such as now-4h or a number of seconds",
                ));
            }
        },
        None => match opts.window_start {
            Some(start) => start,
            None => look_back(latest, DEFAULT_LOOKBACK_SECS, "now-24h")?,
        },
    };

    Ok((earliest, latest))
}

/// `from - secs`, for a non-negative look-back that stays in range.
fn look_back(from: i64, secs: i64, expr: &str) -> Result<i64> {
    if secs < 0 {
        return Err(EsBridgeError::time_expr(expr, "look-back must not be negative"));
    }
    from.checked_sub(secs)
        .ok_or_else(|| EsBridgeError::time_expr(expr, "window start out of range"))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.esbridge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| EsBridgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.esbridge/esbridge.json`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the persisted store from the default location. Missing file → empty store.
pub fn load_config() -> Result<PersistedConfig> {
    load_config_from(&config_file_path()?)
}

/// Load the persisted store from a specific path. Missing file → empty store.
pub fn load_config_from(path: &Path) -> Result<PersistedConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(PersistedConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| EsBridgeError::io(path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| EsBridgeError::config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(json: &str) -> PersistedConfig {
        serde_json::from_str(json).expect("parse store")
    }

    fn opts(eaddr: &str) -> InvocationOptions {
        InvocationOptions {
            eaddr: Some(eaddr.into()),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_endpoint_is_split_into_hosts() {
        let cfg = resolve(&opts("es1:9200, es2:9200"), &PersistedConfig::default()).unwrap();
        assert_eq!(cfg.hosts, vec!["es1:9200", "es2:9200"]);
        assert_eq!(cfg.tsfield, DEFAULT_TSFIELD);
        assert_eq!(cfg.query, "*");
        assert_eq!(cfg.limit, DEFAULT_LIMIT);
        assert!(cfg.scan);
        assert!(cfg.convert_timestamp);
        assert!(!cfg.use_ssl && !cfg.verify_certs);
    }

    #[test]
    fn stored_use_ssl_applies_unless_overridden() {
        let persisted = store(r#"{"es1": {"hosts": ["10.0.0.1:9200"], "use_ssl": true}}"#);

        let cfg = resolve(&opts("es1"), &persisted).unwrap();
        assert!(cfg.use_ssl);
        assert_eq!(cfg.hosts, vec!["10.0.0.1:9200"]);

        let mut explicit = opts("es1");
        explicit.use_ssl = Some(false);
        let cfg = resolve(&explicit, &persisted).unwrap();
        assert!(!cfg.use_ssl);
    }

    #[test]
    fn verify_certs_forced_off_without_ssl() {
        let persisted = store(r#"{"es1": {"verify_certs": true}}"#);
        let cfg = resolve(&opts("es1"), &persisted).unwrap();
        assert!(!cfg.verify_certs);

        let mut with_ssl = opts("es1");
        with_ssl.use_ssl = Some(true);
        assert!(resolve(&with_ssl, &persisted).unwrap().verify_certs);

        with_ssl.verify_certs = Some(false);
        assert!(!resolve(&with_ssl, &persisted).unwrap().verify_certs);
    }

    #[test]
    fn stored_tsfield_is_authoritative() {
        let persisted = store(r#"{"es1": {"tsfield": "event_time"}}"#);
        let mut o = opts("es1");
        o.tsfield = Some("other".into());
        assert_eq!(resolve(&o, &persisted).unwrap().tsfield, "event_time");

        let mut o = opts("es2");
        o.tsfield = Some("other".into());
        assert_eq!(resolve(&o, &persisted).unwrap().tsfield, "other");
    }

    #[test]
    fn stored_entry_without_hosts_uses_default_host() {
        let persisted = store(r#"{"prod": {"index": "logs"}}"#);
        let cfg = resolve(&opts("prod"), &persisted).unwrap();
        assert_eq!(cfg.hosts, vec![DEFAULT_HOST]);
        assert_eq!(cfg.index.as_deref(), Some("logs"));
    }

    #[test]
    fn inclusion_list_gets_timestamp_field() {
        let mut o = opts("es1");
        o.fields = Some("host,user".into());
        let cfg = resolve(&o, &PersistedConfig::default()).unwrap();
        assert_eq!(
            cfg.fields,
            Some(vec!["host".into(), "user".into(), "@timestamp".into()])
        );

        o.fields = Some("@timestamp,host".into());
        let cfg = resolve(&o, &PersistedConfig::default()).unwrap();
        assert_eq!(cfg.fields, Some(vec!["@timestamp".into(), "host".into()]));
        assert_eq!(cfg.exclude_fields, None);
    }

    #[test]
    fn invocation_overrides_stored_scalars() {
        let persisted = store(r#"{"es1": {"index": "a", "limit": 5, "return_mv": true}}"#);
        let mut o = opts("es1");
        o.index = Some("b".into());
        let cfg = resolve(&o, &persisted).unwrap();
        assert_eq!(cfg.index.as_deref(), Some("b"));
        assert_eq!(cfg.limit, 5);
        assert!(cfg.return_mv);
    }

    #[test]
    fn earliest_is_subtracted_from_latest() {
        let mut o = opts("es1");
        o.latest = Some("1000000".into());
        o.earliest = Some("now-1h".into());
        let cfg = resolve(&o, &PersistedConfig::default()).unwrap();
        assert_eq!(cfg.latest, 1_000_000);
        assert_eq!(cfg.earliest, 1_000_000 - 3_600);
    }

    #[test]
    fn bare_integer_earliest_is_a_look_back() {
        let mut o = opts("es1");
        o.latest = Some("1000000".into());
        o.earliest = Some("600".into());
        let cfg = resolve(&o, &PersistedConfig::default()).unwrap();
        assert_eq!((cfg.earliest, cfg.latest), (1_000_000 - 600, 1_000_000));
    }

    #[test]
    fn negative_or_overflowing_look_back_is_rejected() {
        for earliest in ["-500", "-9223372036854775808"] {
            let mut o = opts("es1");
            o.latest = Some("1000".into());
            o.earliest = Some(earliest.into());
            let err = resolve(&o, &PersistedConfig::default()).unwrap_err();
            assert!(
                matches!(err, EsBridgeError::InvalidTimeExpression { .. }),
                "{earliest}: {err}"
            );
        }

        let mut o = opts("es1");
        o.latest = Some("-9223372036854775808".into());
        o.earliest = Some("now-1s".into());
        let err = resolve(&o, &PersistedConfig::default()).unwrap_err();
        assert!(matches!(err, EsBridgeError::InvalidTimeExpression { .. }));

        let mut o = opts("es1");
        o.window_end = Some(i64::MIN);
        let err = resolve(&o, &PersistedConfig::default()).unwrap_err();
        assert!(matches!(err, EsBridgeError::InvalidTimeExpression { .. }));
    }

    #[test]
    fn default_window_is_last_day() {
        let cfg = resolve(&opts("es1"), &PersistedConfig::default()).unwrap();
        assert_eq!(cfg.latest - cfg.earliest, DEFAULT_LOOKBACK_SECS);
    }

    #[test]
    fn host_window_used_when_not_explicit() {
        let mut o = opts("es1");
        o.window_start = Some(100);
        o.window_end = Some(200);
        let cfg = resolve(&o, &PersistedConfig::default()).unwrap();
        assert_eq!((cfg.earliest, cfg.latest), (100, 200));
    }

    #[test]
    fn absolute_earliest_is_rejected() {
        let mut o = opts("es1");
        o.earliest = Some("2016-11-18T23:45:00".into());
        let err = resolve(&o, &PersistedConfig::default()).unwrap_err();
        assert!(matches!(err, EsBridgeError::InvalidTimeExpression { .. }));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let mut o = opts("es1");
        o.limit = Some(0);
        assert!(resolve(&o, &PersistedConfig::default()).is_err());
    }

    #[test]
    fn missing_config_file_is_empty_store() {
        let path = std::env::temp_dir().join("esbridge-test-does-not-exist.json");
        let loaded = load_config_from(&path).unwrap();
        assert!(loaded.endpoints.is_empty());
    }

    #[test]
    fn malformed_config_file_is_config_error() {
        let path = std::env::temp_dir().join(format!("esbridge-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").expect("write temp file");
        let err = load_config_from(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, EsBridgeError::ConfigLoad { .. }));
    }
}
