//! Correlation and update pipelines for esbridge.
//!
//! This crate turns input rows into search queries, merges the matching
//! documents back into rows, builds partial updates from edited rows, and
//! drives all of it over newline-delimited JSON streams.

pub mod flatten;
pub mod merge;
pub mod pipeline;
pub mod query;
pub mod rows;
pub mod update;

pub use flatten::flatten;
pub use merge::{hit_fields, merge};
pub use pipeline::{
    ProgressReporter, RunSummary, SilentProgress, correlate_record, run_correlate, run_search,
    run_update,
};
pub use query::{base_query, build_query};
pub use rows::{RowReader, RowWriter};
pub use update::{UpdatePayload, UpdateTarget, build_update, update_record};
