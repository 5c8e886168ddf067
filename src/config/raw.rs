//! Raw JSON shape — `serde` target after placeholder resolution.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawConfig {
    pub app: RawApp,
    pub api: RawApi,
    #[serde(default)]
    pub agent_service: RawAgentService,
    pub database: RawDatabase,
    /// `mcp.<name>` — one entry per external tool process.
    #[serde(default)]
    pub mcp: BTreeMap<String, RawTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawApp {
    pub name: String,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawApi {
    pub port: Numeric,
    pub host: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub cors: RawCors,
    #[serde(default)]
    pub rate_limit: RawRateLimit,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawCors {
    pub origin: Option<OneOrMany>,
    #[serde(default)]
    pub credentials: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawRateLimit {
    pub window_ms: Option<Numeric>,
    pub max_requests: Option<Numeric>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawAgentService {
    pub url: Option<String>,
    /// Milliseconds.
    pub timeout: Option<Numeric>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawDatabase {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawTool {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Milliseconds.
    pub timeout: Option<Numeric>,
}

/// A number that may arrive as a JSON number or, after `${VAR}`
/// substitution, as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum Numeric {
    Int(u64),
    Text(String),
}

impl Numeric {
    pub fn to_u64(&self, field: &'static str) -> Result<u64, ConfigError> {
        match self {
            Numeric::Int(n) => Ok(*n),
            Numeric::Text(s) => s.trim().parse().map_err(|e| ConfigError::Invalid {
                field,
                reason: format!("'{s}' is not a non-negative integer: {e}"),
            }),
        }
    }
}

/// `"*"` or `["http://a", "http://b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}
