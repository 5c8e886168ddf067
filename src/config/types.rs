//! Fully-resolved configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

/// Deployment mode. Only [`Environment::Development`] exposes internal
/// detail (stack traces) in HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Application identity (`app` section).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    pub log_level: String,
}

/// Cross-origin policy (`api.cors`).
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any origin.
    pub origins: Vec<String>,
    pub credentials: bool,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.origins.iter().any(|o| o == "*")
    }
}

/// Fixed-window request limit per client address (`api.rateLimit`).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    /// Requests allowed per window. `0` disables limiting.
    pub max_requests: u32,
}

/// HTTP listener settings (`api` section).
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
    /// Public URL the API is reachable at.
    pub base_url: String,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
}

impl ApiConfig {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Python agent service endpoint (`agentService` section).
#[derive(Debug, Clone)]
pub struct AgentServiceConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Storage location (`database` section).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Backend kind, e.g. `"sqlite"`.
    pub kind: String,
    /// Already expanded, no `~`.
    pub path: PathBuf,
}

/// External tool process descriptor (`mcp.<name>`).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Fully-resolved service configuration. Immutable once loaded; shared as
/// `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub agent_service: AgentServiceConfig,
    pub database: DatabaseConfig,
    /// Tool descriptors keyed by name (e.g. `"garmin"`).
    pub tools: BTreeMap<String, ToolConfig>,
    pub(super) tree: Value,
    pub(super) source: PathBuf,
    pub(super) unresolved: Vec<String>,
}

impl Config {
    /// Returns `true` when error responses may include stack traces.
    pub fn is_development(&self) -> bool {
        self.app.environment == Environment::Development
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    /// Look up a value in the resolved JSON tree by JSON pointer, e.g.
    /// `"/api/cors/origin"`. Covers keys the typed schema does not model.
    pub fn lookup(&self, pointer: &str) -> Option<&Value> {
        self.tree.pointer(pointer)
    }

    /// Absolute path the config was read from.
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Placeholder variables that were not set at load time.
    pub fn unresolved_placeholders(&self) -> &[String] {
        &self.unresolved
    }
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — production mode, no rate limit, any origin.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            app: AppConfig {
                name: "pace42-test".into(),
                version: "0.0.0-test".into(),
                environment: Environment::Production,
                log_level: "info".into(),
            },
            api: ApiConfig {
                port: 3000,
                host: "127.0.0.1".into(),
                base_url: "http://localhost:3000".into(),
                cors: CorsConfig {
                    origins: vec!["*".into()],
                    credentials: false,
                },
                rate_limit: RateLimitConfig {
                    window: Duration::from_secs(60),
                    max_requests: 0,
                },
            },
            agent_service: AgentServiceConfig {
                url: "http://localhost:0".into(),
                timeout: Duration::from_secs(1),
            },
            database: DatabaseConfig {
                kind: "sqlite".into(),
                path: PathBuf::from("/tmp/pace42-test.db"),
            },
            tools: BTreeMap::new(),
            tree: Value::Null,
            source: PathBuf::from("/tmp/app.config.json"),
            unresolved: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("development".parse(), Ok(Environment::Development));
        assert_eq!("DEV".parse(), Ok(Environment::Development));
        assert_eq!(" prod ".parse(), Ok(Environment::Production));
        assert_eq!("test".parse(), Ok(Environment::Test));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn only_development_is_development() {
        let mut cfg = Config::test_default();
        assert!(!cfg.is_development());
        cfg.app.environment = Environment::Development;
        assert!(cfg.is_development());
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = Config::test_default();
        assert_eq!(cfg.api.bind_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn wildcard_origin_detected() {
        let cors = CorsConfig {
            origins: vec!["http://a".into(), "*".into()],
            credentials: false,
        };
        assert!(cors.allows_any_origin());
    }
}
