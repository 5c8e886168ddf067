//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, before the config is loaded, so placeholder
//! warnings are visible. Once the configured level is known, apply it with
//! [`LogHandle::set_level`].

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::error::AppError;

/// Handle to the installed filter, used to swap in the configured level.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogHandle {
    /// Replace the active filter with `level`. A no-op when `RUST_LOG` was
    /// set at init, so the operator's choice wins.
    pub fn set_level(&self, level: &str) -> Result<(), AppError> {
        if self.env_override {
            return Ok(());
        }
        let filter = EnvFilter::try_new(level)
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?;
        self.filter
            .reload(filter)
            .map_err(|e| AppError::Logger(format!("failed to reload filter: {e}")))
    }
}

/// Build the filter for `level`.
///
/// If `prefer_level` is `true`, `level` takes precedence and `RUST_LOG` is only
/// used as a fallback when `level` is invalid. If `prefer_level` is `false`,
/// `RUST_LOG` takes precedence and `level` is the fallback.
fn build_filter(level: &str, prefer_level: bool) -> Result<EnvFilter, AppError> {
    if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => Ok(filter),
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            }),
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    }
}

/// Initialise the global tracing subscriber, writing to stderr.
///
/// `level` accepts standard level strings: `"error"`, `"warn"`, `"info"`,
/// `"debug"`, `"trace"`, or any `EnvFilter` directive.
pub fn init(level: &str, prefer_level: bool) -> Result<LogHandle, AppError> {
    let env_override = !prefer_level && std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let filter = build_filter(level, prefer_level)?;
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(LogHandle {
        filter: handle,
        env_override,
    })
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values. The config loader checks `app.logLevel` with this
/// before [`LogHandle::set_level`] ever sees it.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_levels_parse() {
        for l in &["error", "warn", "info", "debug", "trace"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
        assert!(parse_level("INFO_LEVEL").is_err());
    }

    #[test]
    fn preferred_level_builds_filter() {
        assert!(build_filter("debug", true).is_ok());
        assert!(build_filter("pace42_api=trace,info", true).is_ok());
    }

    #[test]
    fn init_info_succeeds_or_already_init() {
        // May already be set by a prior test run in the same process — both outcomes are fine.
        match init("info", true) {
            Ok(handle) => {
                assert!(handle.set_level("debug").is_ok());
            }
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
