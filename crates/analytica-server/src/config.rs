//! Environment-driven configuration.
//!
//! Unknown or unparsable values are Configuration errors and abort startup;
//! boolean variables accept case-insensitive `true`/`false`, and any other
//! non-empty value coerces to `false` with a warning.

use analytica_core::{AnalyticalError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Test,
    Production,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Development => "development",
            RunMode::Test => "test",
            RunMode::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub run_mode: RunMode,
    pub log_level: tracing::Level,
    pub research_api_key: Option<String>,
    pub research_cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub cache_default_ttl: Duration,
    pub cache_max_size: usize,
    pub cache_cleanup_interval: Duration,
    pub cache_refresh_threshold: f64,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    pub metrics_rate_limit: u32,
    pub max_metrics_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<ServerConfig> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig> {
        let run_mode = match lookup("RUN_MODE").as_deref() {
            None | Some("development") => RunMode::Development,
            Some("test") => RunMode::Test,
            Some("production") => RunMode::Production,
            Some(other) => {
                return Err(AnalyticalError::configuration(format!(
                    "RUN_MODE must be one of development/test/production, got '{other}'"
                ))
                .with_context("variable", "RUN_MODE"));
            }
        };

        let log_level = match lookup("LOG_LEVEL").as_deref() {
            None | Some("INFO") => tracing::Level::INFO,
            Some("DEBUG") => tracing::Level::DEBUG,
            Some("WARN") => tracing::Level::WARN,
            Some("ERROR") => tracing::Level::ERROR,
            Some(other) => {
                return Err(AnalyticalError::configuration(format!(
                    "LOG_LEVEL must be one of DEBUG/INFO/WARN/ERROR, got '{other}'"
                ))
                .with_context("variable", "LOG_LEVEL"));
            }
        };

        Ok(ServerConfig {
            run_mode,
            log_level,
            research_api_key: lookup("RESEARCH_API_KEY").filter(|key| !key.is_empty()),
            research_cache_enabled: parse_bool(&lookup, "ENABLE_RESEARCH_CACHE", true),
            cache_dir: lookup("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache")),
            cache_default_ttl: Duration::from_millis(parse_num(
                &lookup,
                "CACHE_DEFAULT_TTL_MS",
                300_000u64,
            )?),
            cache_max_size: parse_num(&lookup, "CACHE_MAX_SIZE", 1000usize)?,
            cache_cleanup_interval: Duration::from_millis(parse_num(
                &lookup,
                "CACHE_CLEANUP_INTERVAL_MS",
                60_000u64,
            )?),
            cache_refresh_threshold: {
                let threshold = parse_num(&lookup, "CACHE_REFRESH_THRESHOLD", 0.75f64)?;
                if !(0.0..=1.0).contains(&threshold) || threshold == 0.0 {
                    return Err(AnalyticalError::configuration(format!(
                        "CACHE_REFRESH_THRESHOLD must be in (0, 1], got {threshold}"
                    ))
                    .with_context("variable", "CACHE_REFRESH_THRESHOLD"));
                }
                threshold
            },
            rate_limit_max_requests: parse_num(&lookup, "RATE_LIMIT_MAX_REQUESTS", 10usize)?,
            rate_limit_window: Duration::from_millis(parse_num(
                &lookup,
                "RATE_LIMIT_WINDOW_MS",
                1000u64,
            )?),
            metrics_enabled: parse_bool(&lookup, "METRICS_ENABLED", true),
            metrics_port: parse_num(&lookup, "METRICS_PORT", 9464u16)?,
            metrics_rate_limit: parse_num(&lookup, "METRICS_RATE_LIMIT", 60u32)?,
            max_metrics_bytes: parse_num(&lookup, "MAX_METRICS_BYTES", 1024 * 1024)?,
        })
    }
}

fn parse_num<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            AnalyticalError::configuration(format!("{name} has invalid value '{raw}'"))
                .with_context("variable", name.to_string())
        }),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match lookup(name) {
        None => default,
        Some(raw) if raw.is_empty() => default,
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => {
                tracing::warn!(
                    variable = name,
                    value = other,
                    "unrecognized boolean value, treating as false"
                );
                false
            }
        },
    }
}
