//! Elasticsearch access for esbridge.
//!
//! This crate provides:
//! - [`query`]: the boolean query model the pipelines build
//! - [`SearchBackend`]: the seam the pipeline drivers call through
//! - [`SearchClient`]: the reqwest implementation (bounded search, scroll
//!   scan, partial update)

mod client;
pub mod query;

use std::future::Future;

use serde_json::{Value, json};

use esbridge_shared::{EffectiveConfig, MatchedDocument, Result};

pub use client::{ClientSettings, SearchClient};
pub use query::{Clause, Query};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// How hits are retrieved for one logical search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// One request, capped at `size` hits.
    Search,
    /// Scroll through every matching hit, `size` hits per page.
    Scan,
}

/// A search against one index/type selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub index: Option<String>,
    pub doc_types: Vec<String>,
    pub size: usize,
    pub includes: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,
    pub mode: RetrievalMode,
}

impl SearchRequest {
    /// A request carrying the index, type, projection and paging settings of `config`.
    pub fn from_config(config: &EffectiveConfig, query: Query) -> Self {
        Self {
            query,
            index: config.index.clone(),
            doc_types: config.stype.clone().unwrap_or_default(),
            size: config.limit,
            includes: config.fields.clone(),
            excludes: config.exclude_fields.clone(),
            mode: if config.scan {
                RetrievalMode::Scan
            } else {
                RetrievalMode::Search
            },
        }
    }

    /// Full request body: query, sort, size and source filtering.
    pub fn body(&self) -> Value {
        let mut body = self.query.to_json();
        body["size"] = json!(self.size);

        if self.includes.is_some() || self.excludes.is_some() {
            let mut source = json!({});
            if let Some(includes) = &self.includes {
                source["includes"] = json!(includes);
            }
            if let Some(excludes) = &self.excludes {
                source["excludes"] = json!(excludes);
            }
            body["_source"] = source;
        }

        body
    }

    /// Path segments before `_search`: `[index]`, `[index, types]`, or
    /// `[_all, types]` when only types are given.
    pub fn target_segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        match (&self.index, self.doc_types.is_empty()) {
            (Some(index), _) => segments.push(index.clone()),
            (None, false) => segments.push("_all".to_string()),
            (None, true) => {}
        }
        if !self.doc_types.is_empty() {
            segments.push(self.doc_types.join(","));
        }
        segments
    }
}

/// A partial update of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    /// `{"doc": {...}}`
    pub payload: Value,
    pub includes: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,
    /// Make the change visible to search immediately.
    pub refresh: bool,
}

/// The document as returned by the update call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedDocument {
    /// Top-level metadata plus the returned `get._source`.
    pub document: MatchedDocument,
    /// The raw update response.
    pub raw: Value,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The search backend the pipelines talk to.
///
/// Each call is one logical network operation; implementations never retry.
pub trait SearchBackend {
    /// Run a search and return its hits in backend order.
    fn search(&self, request: &SearchRequest) -> impl Future<Output = Result<Vec<MatchedDocument>>>;

    /// Apply a partial update and return the updated document.
    fn update(&self, request: &UpdateRequest) -> impl Future<Output = Result<UpdatedDocument>>;
}
