use std::{env, fmt, path::PathBuf, str::FromStr};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{ClientError, Result};

const DEV_BACKEND_URL: &str = "http://192.168.1.109:4000";
const PROD_BACKEND_URL: &str = "https://api.downloadcomment.com";
const API_PREFIX: &str = "/api/v1";
const SOCKET_PATH: &str = "/socket.io/";

/// Where custom (negotiated) packages are sold.
pub const CONTACT_URL: &str = "https://downloadcomment.com/contact";

pub const MIN_COMMENTS: usize = 20;
pub const MAX_COMMENTS: usize = 3000;
pub const DEFAULT_MAX_COMMENTS: usize = 200;
pub const DEFAULT_TTS_LANGUAGE: &str = "vi-VN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(ClientError::InvalidConfig(format!(
                "unknown environment `{other}`"
            ))),
        }
    }
}

/// Mobile platform the client runs on. Decides store SKUs and purchase parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            other => Err(ClientError::InvalidConfig(format!(
                "unknown platform `{other}`"
            ))),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// Backend origin without the API prefix, e.g. `https://api.downloadcomment.com`.
    pub backend_host: String,
    pub platform: Platform,
    /// Raises the default log filter to `debug`.
    pub debug: bool,
    /// Directory holding the persisted key-value file.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            backend_host: PROD_BACKEND_URL.to_string(),
            platform: Platform::Android,
            debug: false,
            data_dir: PathBuf::from("./.tlive"),
        }
    }
}

impl Config {
    /// Reads `.env` (if any) and the `TLIVE_*` variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(value) = env::var("TLIVE_ENV") {
            config.environment = value.parse()?;
            if config.environment == Environment::Development {
                config.backend_host = DEV_BACKEND_URL.to_string();
            }
        }

        if let Ok(value) = env::var("TLIVE_BACKEND_URL") {
            config.backend_host = value.trim_end_matches('/').to_string();
        }

        if let Ok(value) = env::var("TLIVE_PLATFORM") {
            config.platform = value.parse()?;
        }

        if let Ok(value) = env::var("TLIVE_DEBUG") {
            config.debug = matches!(value.trim(), "1" | "true" | "yes");
        }

        if let Ok(value) = env::var("TLIVE_DATA_DIR") {
            config.data_dir = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Points the client at an arbitrary backend origin.
    pub fn with_backend(mut self, host: impl Into<String>) -> Self {
        self.backend_host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Base URL every REST path is appended to.
    pub fn api_base(&self) -> String {
        format!("{}{}", self.backend_host, API_PREFIX)
    }

    /// WebSocket URL of the realtime channel.
    pub fn socket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.backend_host)
            .map_err(|err| ClientError::InvalidConfig(format!("backend url: {err}")))?;

        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(ClientError::InvalidConfig(format!(
                    "unsupported backend scheme `{other}`"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidConfig(format!("cannot use `{scheme}` here")))?;

        url.set_path(SOCKET_PATH);
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        Ok(url)
    }
}

/// User preferences persisted on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub max_comments: usize,
    pub tts_language: String,
    pub auto_read: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_comments: DEFAULT_MAX_COMMENTS,
            tts_language: DEFAULT_TTS_LANGUAGE.to_string(),
            auto_read: false,
        }
    }
}

impl Preferences {
    /// Brings out-of-range values back into what the settings screen allows.
    pub fn normalized(mut self) -> Self {
        self.max_comments = clamp_max_comments(self.max_comments);
        if self.tts_language.trim().is_empty() {
            self.tts_language = DEFAULT_TTS_LANGUAGE.to_string();
        }
        self
    }
}

pub fn clamp_max_comments(value: usize) -> usize {
    value.clamp(MIN_COMMENTS, MAX_COMMENTS)
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`.
/// Does nothing if the host already installed one.
pub fn init_tracing(config: &Config) {
    let default_filter = if config.debug {
        "tlive_client=debug"
    } else {
        "tlive_client=info"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
