use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub const DEFAULT_SOURCE_BASE_URL: &str = "https://www.rightmove.co.uk";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files; useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup, no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("HOUSEDB_ENV", "development"))?;
    let log_level = or_default("HOUSEDB_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("HOUSEDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("HOUSEDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("HOUSEDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let source_base_url = or_default("HOUSEDB_SOURCE_BASE_URL", DEFAULT_SOURCE_BASE_URL)
        .trim_end_matches('/')
        .to_string();
    if !source_base_url.starts_with("http://") && !source_base_url.starts_with("https://") {
        return Err(ConfigError::InvalidEnvVar {
            var: "HOUSEDB_SOURCE_BASE_URL".to_string(),
            reason: format!("expected an http(s) origin, got '{source_base_url}'"),
        });
    }

    let scraper_request_timeout_secs = parse_u64("HOUSEDB_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_retry_attempts = parse_u32("HOUSEDB_SCRAPER_RETRY_ATTEMPTS", "3")?;
    let scraper_retry_backoff_ms = parse_u64("HOUSEDB_SCRAPER_RETRY_BACKOFF_MS", "1000")?;
    let scraper_max_backoff_ms = parse_u64("HOUSEDB_SCRAPER_MAX_BACKOFF_MS", "60000")?;
    let scraper_inter_request_delay_ms =
        parse_u64("HOUSEDB_SCRAPER_INTER_REQUEST_DELAY_MS", "250")?;
    let scraper_user_agent = or_default("HOUSEDB_SCRAPER_USER_AGENT", DEFAULT_USER_AGENT);
    let scraper_accept = or_default("HOUSEDB_SCRAPER_ACCEPT", DEFAULT_ACCEPT);
    let scraper_accept_language =
        or_default("HOUSEDB_SCRAPER_ACCEPT_LANGUAGE", DEFAULT_ACCEPT_LANGUAGE);
    let scraper_max_properties = parse_usize("HOUSEDB_SCRAPER_MAX_PROPERTIES", "50")?;
    let scraper_freshness_days = parse_u32("HOUSEDB_SCRAPER_FRESHNESS_DAYS", "7")?;
    let scraper_sessions = parse_usize("HOUSEDB_SCRAPER_SESSIONS", "1")?;
    if scraper_sessions == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "HOUSEDB_SCRAPER_SESSIONS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        source_base_url,
        scraper_request_timeout_secs,
        scraper_retry_attempts,
        scraper_retry_backoff_ms,
        scraper_max_backoff_ms,
        scraper_inter_request_delay_ms,
        scraper_user_agent,
        scraper_accept,
        scraper_accept_language,
        scraper_max_properties,
        scraper_freshness_days,
        scraper_sessions,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "HOUSEDB_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
