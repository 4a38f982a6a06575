//! Runtime configuration, read once from the environment at startup.
//!
//! ## Environment Variables
//! - `BIND_ADDR` - interface to listen on (default: `0.0.0.0`)
//! - `PORT` - port to listen on (default: `3000`)
//! - `RESOLVER_BASE_URL` - resolution microservice (default: `http://127.0.0.1:8000`)
//! - `TWITTER_RESOLVER` - `syndication` or `service` (default: `syndication`)
//! - `TWITTER_SYNDICATION_URL` - syndication endpoint base URL
//! - `MEDIA_TEMP_DIR` - transient media directory (default: `{tmp}/media-relay`)
//! - `MEDIA_RETENTION_SECS` - sweep threshold (default: `1800`)
//! - `RESOLVE_TIMEOUT_SECS` / `FETCH_TIMEOUT_SECS` - outbound timeouts
//! - `MAX_MEDIA_BYTES` - largest media body accepted
//! - `FETCH_USER_AGENT` - User-Agent sent to media hosts

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_MEDIA_BYTES, DEFAULT_RESOLVE_TIMEOUT_SECS,
    DEFAULT_RESOLVER_BASE_URL, DEFAULT_RETENTION_SECS, DEFAULT_TWITTER_SYNDICATION_URL,
    DEFAULT_USER_AGENT, TEMP_DIR_NAME,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error(
        "MEDIA_RETENTION_SECS ({retention_secs}) must be at least FETCH_TIMEOUT_SECS ({fetch_timeout_secs}) and above 0"
    )]
    RetentionTooShort {
        retention_secs: u64,
        fetch_timeout_secs: u64,
    },

    #[error("TWITTER_RESOLVER must be `syndication` or `service`, got {0:?}")]
    InvalidTwitterResolver(String),
}

/// Which backend resolves Twitter URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwitterBackend {
    Syndication,
    Service,
}

impl FromStr for TwitterBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "syndication" => Ok(TwitterBackend::Syndication),
            "service" => Ok(TwitterBackend::Service),
            _ => Err(ConfigError::InvalidTwitterResolver(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub resolver_base_url: String,
    pub twitter_backend: TwitterBackend,
    pub twitter_syndication_url: String,
    pub temp_dir: PathBuf,
    pub retention: Duration,
    pub resolve_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_media_bytes: u64,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { name, value }),
                None => Ok(default),
            }
        };

        let port = match get("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { name: "PORT", value })?,
            None => 3000,
        };

        let twitter_backend = match get("TWITTER_RESOLVER") {
            Some(value) => value.parse()?,
            None => TwitterBackend::Syndication,
        };

        let temp_dir = get("MEDIA_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(TEMP_DIR_NAME));

        // A shorter window lets one request's sweep delete another's artifact
        // before it is delivered
        let retention_secs = number("MEDIA_RETENTION_SECS", DEFAULT_RETENTION_SECS)?;
        let fetch_timeout_secs = number("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        if retention_secs == 0 || retention_secs < fetch_timeout_secs {
            return Err(ConfigError::RetentionTooShort {
                retention_secs,
                fetch_timeout_secs,
            });
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            resolver_base_url: get("RESOLVER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RESOLVER_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            twitter_backend,
            twitter_syndication_url: get("TWITTER_SYNDICATION_URL")
                .unwrap_or_else(|| DEFAULT_TWITTER_SYNDICATION_URL.to_string()),
            temp_dir,
            retention: Duration::from_secs(retention_secs),
            resolve_timeout: Duration::from_secs(number(
                "RESOLVE_TIMEOUT_SECS",
                DEFAULT_RESOLVE_TIMEOUT_SECS,
            )?),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_media_bytes: number("MAX_MEDIA_BYTES", DEFAULT_MAX_MEDIA_BYTES)?,
            user_agent: get("FETCH_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
