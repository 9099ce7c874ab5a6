use std::env;
use std::path::PathBuf;

/// Where captured and containerised files land, shared by every recording.
pub const RECORDINGS_DIR: &str = "recordings";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("APP_PORT is not a valid port: {0}")]
    InvalidPort(String),
    #[error("LIVEKIT_URL must start with ws:// or wss://")]
    InvalidRoomUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,

    /// The `ws://` / `wss://` room server URL.
    pub room_url: String,

    /// Credentials for token minting.
    pub api_key: String,
    pub api_secret: String,

    /// Tracing env filter, `error` unless overridden.
    pub log_level: String,

    /// Completion webhook endpoints.
    pub webhook_urls: Vec<String>,

    /// Object storage, enabled when region and bucket are both set.
    pub s3: Option<S3Config>,

    /// Local directory recordings are written to.
    pub recordings_dir: PathBuf,
}

impl AppConfig {
    pub fn parse() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup, so tests don't
    /// have to mutate the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |key: &'static str| -> Result<String, ConfigError> {
            get(key)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let port = require("APP_PORT")?;
        let port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;

        let room_url = require("LIVEKIT_URL")?;
        if !room_url.starts_with("ws://") && !room_url.starts_with("wss://") {
            return Err(ConfigError::InvalidRoomUrl);
        }

        let api_key = require("LIVEKIT_API_KEY")?;
        let api_secret = require("LIVEKIT_API_SECRET")?;

        let log_level = get("LOG_LEVEL")
            .filter(|level| !level.is_empty())
            .unwrap_or_else(|| "error".to_string());

        let webhook_urls = get("WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        let region = get("S3_REGION").unwrap_or_default();
        let bucket = get("S3_BUCKET").unwrap_or_default();
        let s3 = if !region.is_empty() && !bucket.is_empty() {
            Some(S3Config {
                region,
                bucket,
                directory: get("S3_DIRECTORY").unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(Self {
            port,
            room_url,
            api_key,
            api_secret,
            log_level,
            webhook_urls,
            s3,
            recordings_dir: PathBuf::from(RECORDINGS_DIR),
        })
    }
}
