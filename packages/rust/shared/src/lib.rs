//! Shared types, error model, time handling and configuration for esbridge.
//!
//! This crate is the foundation depended on by all other esbridge crates.
//! It provides:
//! - [`EsBridgeError`]: the unified error type
//! - Domain types ([`Record`], [`FieldValue`], [`MatchedDocument`])
//! - Time expressions and document timestamp decoding ([`time`])
//! - Configuration ([`PersistedConfig`], [`InvocationOptions`], [`EffectiveConfig`])

pub mod config;
pub mod error;
pub mod time;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    EffectiveConfig, InvocationOptions, PersistedConfig, StoredEndpointConfig, config_dir,
    config_file_path, load_config, load_config_from, resolve as resolve_config, split_list,
};
pub use error::{EsBridgeError, Result};
pub use types::{FieldValue, META_FIELDS, MatchedDocument, RAW_FIELD, Record, TIME_FIELD};
