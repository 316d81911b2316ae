use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
/// Local inference on constrained hardware can take many minutes.
const DEFAULT_MATCH_TIMEOUT_SECS: u64 = 1200;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values abort startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub match_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_concurrent_inferences: usize,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let max_concurrent_inferences = parse_env("MAX_CONCURRENT_INFERENCES", 1usize)?;
        if max_concurrent_inferences == 0 {
            bail!("MAX_CONCURRENT_INFERENCES must be at least 1");
        }

        Ok(Config {
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            match_timeout: Duration::from_secs(parse_env(
                "MATCH_TIMEOUT_SECS",
                DEFAULT_MATCH_TIMEOUT_SECS,
            )?),
            probe_timeout: Duration::from_secs(parse_env(
                "PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT_SECS,
            )?),
            max_concurrent_inferences,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: u64 = parse_env("SCREENER_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("SCREENER_TEST_BAD_PORT", "not-a-port");
        let result: Result<u16> = parse_env("SCREENER_TEST_BAD_PORT", 8080);
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("SCREENER_TEST_BAD_PORT"), "{message}");
    }

    #[test]
    fn test_parse_env_trims_whitespace() {
        std::env::set_var("SCREENER_TEST_PADDED", " 15 ");
        let value: u64 = parse_env("SCREENER_TEST_PADDED", 0).unwrap();
        assert_eq!(value, 15);
    }
}
