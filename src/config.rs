//! Environment-driven configuration for the menu enrichment service.
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Runtime settings, sourced from the process environment.
///
/// Defaults:
/// - `DATABASE_URL`: `sqlite://data/menulens.db`
/// - `PORT`: `8080`
/// - `AI_BASE_URL`: `https://api.openai.com/`
/// - `WORKER_COUNT`: `4`
/// - `ENRICH_CONCURRENCY`: `4`
/// - `AI_TIMEOUT_SECS`: `60`
/// - `MAX_UPLOAD_BYTES`: `10485760` (10 MiB)
///
/// `AI_API_KEY` has no default; a missing key is a fatal startup error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub ai_api_key: String,
    pub ai_base_url: String,
    pub worker_count: usize,
    pub enrich_concurrency: usize,
    pub ai_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables. Used directly by tests.
    pub fn from_vars<I>(vars: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let get = |key: &str| vars.get(key).map(String::as_str).filter(|v| !v.trim().is_empty());

        let cfg = Config {
            database_url: get("DATABASE_URL")
                .unwrap_or("sqlite://data/menulens.db")
                .to_string(),
            port: parse(get("PORT"), 8080, "PORT must be a valid port number")?,
            ai_api_key: get("AI_API_KEY")
                .ok_or(ConfigError::Missing("AI_API_KEY"))?
                .to_string(),
            ai_base_url: get("AI_BASE_URL")
                .unwrap_or("https://api.openai.com/")
                .to_string(),
            worker_count: parse(get("WORKER_COUNT"), 4, "WORKER_COUNT must be an integer")?,
            enrich_concurrency: parse(
                get("ENRICH_CONCURRENCY"),
                4,
                "ENRICH_CONCURRENCY must be an integer",
            )?,
            ai_timeout_secs: parse(
                get("AI_TIMEOUT_SECS"),
                60,
                "AI_TIMEOUT_SECS must be an integer",
            )?,
            max_upload_bytes: parse(
                get("MAX_UPLOAD_BYTES"),
                10 * 1024 * 1024,
                "MAX_UPLOAD_BYTES must be an integer",
            )?,
        };
        validate(&cfg)?;
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(
    value: Option<&str>,
    default: T,
    msg: &'static str,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(msg)),
        None => Ok(default),
    }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("DATABASE_URL must be non-empty"));
    }
    if cfg.worker_count == 0 {
        return Err(ConfigError::Invalid("WORKER_COUNT must be > 0"));
    }
    if cfg.enrich_concurrency == 0 {
        return Err(ConfigError::Invalid("ENRICH_CONCURRENCY must be > 0"));
    }
    if cfg.ai_timeout_secs == 0 {
        return Err(ConfigError::Invalid("AI_TIMEOUT_SECS must be > 0"));
    }
    if cfg.max_upload_bytes == 0 {
        return Err(ConfigError::Invalid("MAX_UPLOAD_BYTES must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> Vec<(String, String)> {
        vec![("AI_API_KEY".to_string(), "sk-test".to_string())]
    }

    #[test]
    fn defaults_applied() {
        let cfg = Config::from_vars(base_vars()).unwrap();
        assert_eq!(cfg.database_url, "sqlite://data/menulens.db");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.enrich_concurrency, 4);
        assert_eq!(cfg.ai_timeout_secs, 60);
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = Config::from_vars(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("AI_API_KEY")));
    }

    #[test]
    fn blank_api_key_is_fatal() {
        let err =
            Config::from_vars(vec![("AI_API_KEY".to_string(), "  ".to_string())]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("AI_API_KEY")));
    }

    #[test]
    fn overrides_win() {
        let mut vars = base_vars();
        vars.push(("PORT".to_string(), "9090".to_string()));
        vars.push(("WORKER_COUNT".to_string(), "2".to_string()));
        vars.push(("DATABASE_URL".to_string(), "sqlite::memory:".to_string()));
        let cfg = Config::from_vars(vars).unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.worker_count, 2);
        assert_eq!(cfg.database_url, "sqlite::memory:");
    }

    #[test]
    fn invalid_port_rejected() {
        let mut vars = base_vars();
        vars.push(("PORT".to_string(), "not-a-port".to_string()));
        let err = Config::from_vars(vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("PORT")));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut vars = base_vars();
        vars.push(("ENRICH_CONCURRENCY".to_string(), "0".to_string()));
        assert!(matches!(
            Config::from_vars(vars),
            Err(ConfigError::Invalid(_))
        ));
    }
}
