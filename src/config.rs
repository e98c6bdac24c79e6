use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use thermostat_api::client::DEFAULT_BASE_URL;

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub check_interval: Duration,
    pub log_level: String,
    pub schedule_file: PathBuf,
    pub token_cache_file: PathBuf,
    pub login_command: Option<String>,
    pub login_timeout: Duration,
    pub api_base_url: String,
    pub health_port: u16,
    pub error_threshold: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let check_interval_minutes: u64 = env_parse("CHECK_INTERVAL_MINUTES", 45)?;
        // The helper drives a browser login and then waits out a redirect;
        // its overall timeout is the sum of both bounds.
        let element_timeout: u64 = env_parse("SELENIUM_TIMEOUT", 30)?;
        let redirect_timeout: u64 = env_parse("SELENIUM_REDIRECT_TIMEOUT", 60)?;

        Ok(Self {
            check_interval: Duration::from_secs(check_interval_minutes * 60),
            log_level: env_or("LOG_LEVEL", "info"),
            schedule_file: PathBuf::from(env_or("SCHEDULE_FILE", "config/schedule.json")),
            token_cache_file: PathBuf::from(env_or("TOKEN_CACHE_FILE", "data/jwt.json")),
            login_command: std::env::var("LOGIN_COMMAND").ok(),
            login_timeout: Duration::from_secs(element_timeout + redirect_timeout),
            api_base_url: env_or("API_BASE_URL", DEFAULT_BASE_URL),
            health_port: env_parse("HEALTH_PORT", 8080)?,
            error_threshold: env_parse("ERROR_THRESHOLD", 3)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {key} {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}
