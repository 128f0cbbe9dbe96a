//! reqwest-based Elasticsearch client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

use esbridge_shared::{EffectiveConfig, EsBridgeError, MatchedDocument, Result};

use crate::{RetrievalMode, SearchBackend, SearchRequest, UpdateRequest, UpdatedDocument};

/// Default timeout in seconds for a single HTTP request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Port assumed when a host entry names none.
const DEFAULT_PORT: u16 = 9200;

/// Scroll context lifetime kept alive between scan pages.
const SCROLL_KEEPALIVE: &str = "1m";

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("esbridge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Connection settings for [`SearchClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Host entries: `host`, `host:port` or a full `http(s)://` URL.
    pub hosts: Vec<String>,
    pub use_ssl: bool,
    pub verify_certs: bool,
    pub timeout_secs: u64,
}

impl From<&EffectiveConfig> for ClientSettings {
    fn from(config: &EffectiveConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            use_ssl: config.use_ssl,
            verify_certs: config.verify_certs,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Turn a host entry into a base URL with a trailing slash.
fn host_url(host: &str, use_ssl: bool) -> Result<Url> {
    let has_scheme = host.contains("://");
    let raw = if has_scheme {
        host.to_string()
    } else {
        let scheme = if use_ssl { "https" } else { "http" };
        format!("{scheme}://{host}")
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| EsBridgeError::validation(format!("invalid host '{host}': {e}")))?;

    if !has_scheme && url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|_| EsBridgeError::validation(format!("invalid host '{host}'")))?;
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    /// Kept as raw JSON so each document carries its untouched hit.
    #[serde(default)]
    hits: Vec<Value>,
}

// ---------------------------------------------------------------------------
// SearchClient
// ---------------------------------------------------------------------------

/// One connection handle per invocation, shared read-only across records.
///
/// Requests rotate over the configured hosts; a failed request is not retried
/// on another host.
pub struct SearchClient {
    client: Client,
    hosts: Vec<Url>,
    next_host: AtomicUsize,
}

impl SearchClient {
    /// Build a client for the given hosts and TLS settings.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let hosts = settings
            .hosts
            .iter()
            .map(|h| host_url(h, settings.use_ssl))
            .collect::<Result<Vec<_>>>()?;

        if hosts.is_empty() {
            return Err(EsBridgeError::validation("no search hosts configured"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(settings.use_ssl && !settings.verify_certs)
            .build()
            .map_err(|e| EsBridgeError::backend_with("failed to build HTTP client", e))?;

        debug!(hosts = ?hosts.iter().map(Url::as_str).collect::<Vec<_>>(), "search client ready");

        Ok(Self {
            client,
            hosts,
            next_host: AtomicUsize::new(0),
        })
    }

    /// Build an endpoint URL on the next host from raw path segments.
    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let slot = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        let mut url = self.hosts[slot].clone();
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|_| EsBridgeError::backend(format!("host {base} cannot be a base URL")))?
            .pop_if_empty()
            .extend(segments.iter().map(AsRef::as_ref));
        Ok(url)
    }

    /// Send a request and decode a successful JSON response.
    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| EsBridgeError::backend_with(format!("{what}: request failed"), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EsBridgeError::backend_with(format!("{what}: unreadable response"), e))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<Value>(&text)
                .map(|body| error_reason(&body))
                .unwrap_or(text);
            return Err(EsBridgeError::backend(format!("{what}: HTTP {status}: {reason}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| EsBridgeError::backend_with(format!("{what}: response is not JSON"), e))
    }

    /// Single bounded search request.
    async fn search_once(&self, request: &SearchRequest) -> Result<Vec<MatchedDocument>> {
        let mut segments = request.target_segments();
        segments.push("_search".to_string());
        let url = self.endpoint(segments.as_slice())?;
        let what = format!("POST {url}");

        let body = self
            .send_json(self.client.post(url).json(&request.body()), &what)
            .await?;
        let parsed: SearchResponse = decode(body, &what)?;
        documents(parsed.hits.hits, &what)
    }

    /// Scroll through every hit, `size` per page, then release the scroll context.
    async fn scan(&self, request: &SearchRequest) -> Result<Vec<MatchedDocument>> {
        let mut segments = request.target_segments();
        segments.push("_search".to_string());
        let mut url = self.endpoint(segments.as_slice())?;
        url.query_pairs_mut().append_pair("scroll", SCROLL_KEEPALIVE);
        let what = format!("POST {url}");

        let body = self
            .send_json(self.client.post(url).json(&request.body()), &what)
            .await?;
        let mut page: SearchResponse = decode(body, &what)?;

        let mut pages = 1usize;
        let mut scroll_id = page.scroll_id.take();

        // The scroll context is released whether or not paging succeeded.
        let outcome = async {
            let mut hits = Vec::new();
            let mut what = what;
            while !page.hits.hits.is_empty() {
                hits.extend(documents(std::mem::take(&mut page.hits.hits), &what)?);

                let Some(id) = scroll_id.clone() else { break };
                let url = self.endpoint(&["_search", "scroll"])?;
                what = format!("POST {url}");
                let body = self
                    .send_json(
                        self.client
                            .post(url)
                            .json(&json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": id })),
                        &what,
                    )
                    .await?;
                page = decode(body, &what)?;
                pages += 1;
                if let Some(next) = page.scroll_id.take() {
                    scroll_id = Some(next);
                }
            }
            Ok::<_, EsBridgeError>(hits)
        }
        .await;

        if let Some(id) = scroll_id {
            self.clear_scroll(&id).await;
        }

        let hits = outcome?;
        debug!(hits = hits.len(), pages, "scan finished");
        Ok(hits)
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let url = match self.endpoint(&["_search", "scroll"]) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "could not build clear-scroll URL");
                return;
            }
        };
        let what = format!("DELETE {url}");
        let request = self
            .client
            .request(Method::DELETE, url)
            .json(&json!({ "scroll_id": [scroll_id] }));

        if let Err(e) = self.send_json(request, &what).await {
            warn!(error = %e, "failed to clear scroll context");
        }
    }
}

impl SearchBackend for SearchClient {
    #[instrument(skip_all, fields(index = ?request.index, mode = ?request.mode, size = request.size))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<MatchedDocument>> {
        match request.mode {
            RetrievalMode::Search => self.search_once(request).await,
            RetrievalMode::Scan => self.scan(request).await,
        }
    }

    #[instrument(skip_all, fields(index = %request.index, id = %request.id))]
    async fn update(&self, request: &UpdateRequest) -> Result<UpdatedDocument> {
        let mut url = self.endpoint(&[
            request.index.as_str(),
            request.doc_type.as_str(),
            request.id.as_str(),
            "_update",
        ])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("_source", "true");
            if request.refresh {
                query.append_pair("refresh", "true");
            }
            if let Some(includes) = &request.includes {
                query.append_pair("_source_includes", &includes.join(","));
            }
            if let Some(excludes) = &request.excludes {
                query.append_pair("_source_excludes", &excludes.join(","));
            }
        }
        let what = format!("POST {url}");

        let raw = self
            .send_json(self.client.post(url).json(&request.payload), &what)
            .await?;

        let str_field = |key: &str| raw.get(key).and_then(Value::as_str).map(String::from);
        let source = raw
            .pointer("/get/_source")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let document = MatchedDocument {
            index: str_field("_index"),
            doc_type: str_field("_type"),
            id: str_field("_id"),
            score: None,
            source,
            raw: Some(raw.clone()),
        };

        debug!(result = ?raw.get("result"), "document updated");
        Ok(UpdatedDocument { document, raw })
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value, what: &str) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| EsBridgeError::backend_with(format!("{what}: unexpected response shape"), e))
}

fn documents(hits: Vec<Value>, what: &str) -> Result<Vec<MatchedDocument>> {
    hits.into_iter()
        .map(|hit| {
            MatchedDocument::from_value(hit).map_err(|e| {
                EsBridgeError::backend_with(format!("{what}: unexpected hit shape"), e)
            })
        })
        .collect()
}

/// Pull a human-readable reason out of an Elasticsearch error body.
fn error_reason(body: &Value) -> String {
    body.pointer("/error/reason")
        .or_else(|| body.pointer("/error/type"))
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str().map(String::from).or_else(|| Some(v.to_string())))
        .unwrap_or_else(|| body.to_string())
}
