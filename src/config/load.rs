//! Config file reading, required-field checks, and the memoized loader.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::placeholder::{resolve_placeholders, Resolved};
use super::raw::RawConfig;
use super::types::*;
use super::ConfigError;

/// Config path relative to the process working directory.
pub const DEFAULT_CONFIG_PATH: &str = "../config/app.config.json";
/// Overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "PACE42_CONFIG";
/// Overrides `app.environment`.
pub const ENVIRONMENT_ENV: &str = "PACE42_ENV";
/// Overrides `app.logLevel`.
pub const LOG_LEVEL_ENV: &str = "PACE42_LOG_LEVEL";
/// Optional dotenv file next to the config.
pub const ENV_FILE_PATH: &str = "../config/.env";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CORS_ORIGIN: &str = "*";
const DEFAULT_RATE_WINDOW_MS: u64 = 15 * 60 * 1000;
const DEFAULT_RATE_MAX_REQUESTS: u64 = 100;
const DEFAULT_AGENT_URL: &str = "http://localhost:5001";
const DEFAULT_AGENT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_DATABASE_KIND: &str = "sqlite";
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 60_000;

/// Where config text comes from. The loader reads through this so callers
/// can substitute an in-memory source.
pub trait ConfigSource: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Reads from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl ConfigSource for FileSource {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// Env-var overrides applied after validation.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub environment: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    /// Read `PACE42_ENV` and `PACE42_LOG_LEVEL`.
    pub fn from_env() -> Self {
        Self {
            environment: env::var(ENVIRONMENT_ENV).ok(),
            log_level: env::var(LOG_LEVEL_ENV).ok(),
        }
    }
}

/// Load `../config/.env`, then `./.env`. Both are optional and neither
/// overrides a variable that is already set. Returns the files that were read.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    let shared = Path::new(ENV_FILE_PATH);
    if dotenvy::from_path(shared).is_ok() {
        loaded.push(shared.to_path_buf());
    }
    if let Ok(local) = dotenvy::dotenv() {
        loaded.push(local);
    }
    loaded
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads, resolves, and validates the config at most once.
///
/// The first successful [`load`](Self::load) is cached; later calls return
/// the same `Arc` without touching the source again. Failures are not
/// cached.
pub struct ConfigLoader<S = FileSource> {
    path: PathBuf,
    source: S,
    overrides: Overrides,
    lookup: EnvLookup,
    cached: OnceLock<Arc<Config>>,
}

impl ConfigLoader<FileSource> {
    /// Loader for `path` on the local filesystem, resolving placeholders
    /// from the process environment.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_source(path, FileSource)
    }

    /// Loader for `PACE42_CONFIG` (or [`DEFAULT_CONFIG_PATH`]) with env-var
    /// overrides picked up from the process environment.
    pub fn from_env() -> Self {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::new(path).with_overrides(Overrides::from_env())
    }
}

impl<S: ConfigSource> ConfigLoader<S> {
    pub fn with_source(path: impl Into<PathBuf>, source: S) -> Self {
        Self {
            path: path.into(),
            source,
            overrides: Overrides::default(),
            lookup: Arc::new(|name: &str| env::var(name).ok()),
            cached: OnceLock::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Replace the process-environment lookup used for `${NAME}` resolution.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Return the cached config, loading it on first call.
    pub fn load(&self) -> Result<Arc<Config>, ConfigError> {
        if let Some(config) = self.cached.get() {
            return Ok(Arc::clone(config));
        }
        let config = Arc::new(load_from(
            &self.path,
            &self.source,
            &*self.lookup,
            &self.overrides,
        )?);
        // First writer wins if two threads raced through the miss above.
        Ok(Arc::clone(self.cached.get_or_init(|| config)))
    }
}

/// Uncached loader — accepts an explicit source, lookup, and overrides.
/// Tests pass these directly instead of mutating env vars.
pub fn load_from<S: ConfigSource + ?Sized>(
    path: &Path,
    source: &S,
    lookup: &dyn Fn(&str) -> Option<String>,
    overrides: &Overrides,
) -> Result<Config, ConfigError> {
    let resolved_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let text = source.read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound {
            path: resolved_path.clone(),
        },
        _ => ConfigError::Read {
            path: resolved_path.clone(),
            source: e,
        },
    })?;

    let tree: Value = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
        path: resolved_path.clone(),
        source: e,
    })?;

    let Resolved { value, unresolved } = resolve_placeholders(tree, lookup);
    for name in &unresolved {
        warn!(
            var = %name,
            path = %resolved_path.display(),
            "environment variable not set; keeping placeholder"
        );
    }

    validate_required(&value)?;

    let raw: RawConfig =
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::Schema {
            path: resolved_path.clone(),
            source: e,
        })?;

    let config = build(raw, value, resolved_path, unresolved, overrides)?;
    debug!(
        app = %config.app.name,
        environment = %config.app.environment,
        source = %config.source.display(),
        "config resolved"
    );
    Ok(config)
}

/// Check the required fields in order `app.name` → `api.port` →
/// `database.path`, stopping at the first one missing.
///
/// A field of the wrong JSON type counts as present here; the typed
/// conversion reports it.
pub fn validate_required(tree: &Value) -> Result<(), ConfigError> {
    if !text_present(tree.pointer("/app/name")) {
        return Err(ConfigError::MissingField { field: "app.name" });
    }
    if !port_present(tree.pointer("/api/port")) {
        return Err(ConfigError::MissingField { field: "api.port" });
    }
    if !text_present(tree.pointer("/database/path")) {
        return Err(ConfigError::MissingField {
            field: "database.path",
        });
    }
    Ok(())
}

fn text_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn port_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn build(
    raw: RawConfig,
    tree: Value,
    source: PathBuf,
    unresolved: Vec<String>,
    overrides: &Overrides,
) -> Result<Config, ConfigError> {
    let port = u16::try_from(raw.api.port.to_u64("api.port")?)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ConfigError::Invalid {
            field: "api.port",
            reason: "must be between 1 and 65535".into(),
        })?;

    let environment_str = overrides
        .environment
        .clone()
        .or(raw.app.environment)
        .unwrap_or_default();
    let environment = if environment_str.is_empty() {
        Environment::default()
    } else {
        environment_str.parse().unwrap_or_else(|e| {
            warn!("{e}; falling back to {}", Environment::default());
            Environment::default()
        })
    };

    let log_level = overrides
        .log_level
        .clone()
        .or(raw.app.log_level)
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    crate::logger::parse_level(&log_level).map_err(|_| ConfigError::Invalid {
        field: "app.logLevel",
        reason: format!("unrecognised log level '{log_level}'"),
    })?;

    let window_ms = match &raw.api.rate_limit.window_ms {
        Some(n) => n.to_u64("api.rateLimit.windowMs")?,
        None => DEFAULT_RATE_WINDOW_MS,
    };
    let max_requests = match &raw.api.rate_limit.max_requests {
        Some(n) => n.to_u64("api.rateLimit.maxRequests")?,
        None => DEFAULT_RATE_MAX_REQUESTS,
    };
    let max_requests = u32::try_from(max_requests).map_err(|_| ConfigError::Invalid {
        field: "api.rateLimit.maxRequests",
        reason: format!("{max_requests} is too large"),
    })?;

    let agent_timeout_ms = match &raw.agent_service.timeout {
        Some(n) => n.to_u64("agentService.timeout")?,
        None => DEFAULT_AGENT_TIMEOUT_MS,
    };

    let mut tools = BTreeMap::new();
    for (name, tool) in raw.mcp {
        let timeout_ms = match &tool.timeout {
            Some(n) => n.to_u64("mcp.timeout")?,
            None => DEFAULT_TOOL_TIMEOUT_MS,
        };
        tools.insert(
            name,
            ToolConfig {
                command: tool.command,
                args: tool.args,
                timeout: Duration::from_millis(timeout_ms),
            },
        );
    }

    Ok(Config {
        app: AppConfig {
            name: raw.app.name,
            version: raw
                .app
                .version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            environment,
            log_level,
        },
        api: ApiConfig {
            port,
            host: raw.api.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            base_url: raw
                .api
                .base_url
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            cors: CorsConfig {
                origins: raw
                    .api
                    .cors
                    .origin
                    .map(|o| o.into_vec())
                    .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]),
                credentials: raw.api.cors.credentials,
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_millis(window_ms),
                max_requests,
            },
        },
        agent_service: AgentServiceConfig {
            url: raw
                .agent_service
                .url
                .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string()),
            timeout: Duration::from_millis(agent_timeout_ms),
        },
        database: DatabaseConfig {
            kind: raw
                .database
                .kind
                .unwrap_or_else(|| DEFAULT_DATABASE_KIND.to_string()),
            path: expand_home(&raw.database.path),
        },
        tools,
        tree,
        source,
        unresolved,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
