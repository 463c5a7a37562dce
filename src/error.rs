//! Error taxonomy for document loading, tree access, and dispatch.

use std::path::PathBuf;

use thiserror::Error;

use crate::key::SectionKey;

/// Errors surfaced by the confab configuration system.
///
/// Load and parse failures are never recovered internally; they surface to
/// the caller of `load`/`reload`. Hook failures abort the dispatch walk that
/// raised them (fail-fast) and reach the caller of `configure_all`/`install`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as YAML: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse {path} as JSON: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("layered load failed: {0}")]
    Layered(#[source] Box<figment::Error>),

    #[error("document root of {path} is not a mapping")]
    TopLevelNotMapping { path: String },

    #[error("type mismatch at '{at}': expected {expected}, found {found}")]
    TypeMismatch {
        at: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid section key '{0}': keys are non-empty ASCII word characters")]
    InvalidKey(String),

    #[error("document has no backing path")]
    NoSource,

    #[error("YAML serialization failed: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("JSON serialization failed: {0}")]
    SerializeJson(#[source] serde_json::Error),

    #[error("section at '{at}' could not be deserialized: {source}")]
    Extract {
        at: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration hook for section '{key}' failed: {source}")]
    Dispatch {
        key: SectionKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type ConfigResult<T> = Result<T, ConfigError>;
