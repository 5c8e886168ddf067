//! Configuration loading with `${VAR}` placeholder resolution.
//!
//! Reads `../config/app.config.json` relative to the current working
//! directory (or `PACE42_CONFIG`), substitutes environment placeholders,
//! validates the required fields, and hands back an immutable `Arc<Config>`.
//!
//! - **load** — [`ConfigLoader`], the file-source seam, required-field checks.
//! - **placeholder** — pure `${NAME}` substitution over a JSON tree.
//! - **raw** — serde target shape of the JSON file.
//! - **types** — fully-resolved config handed to the rest of the service.

mod load;
mod placeholder;
mod raw;
mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use load::{
    expand_home, load_env_files, load_from, validate_required, ConfigLoader, ConfigSource,
    FileSource, Overrides, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, ENVIRONMENT_ENV, ENV_FILE_PATH,
    LOG_LEVEL_ENV,
};
pub use placeholder::{resolve_placeholders, Resolved};
pub use types::*;

/// Failure to produce a resolved [`Config`]. All variants are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required config field: {field}")]
    MissingField { field: &'static str },

    #[error("unexpected config shape in {}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
