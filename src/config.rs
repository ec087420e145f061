use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "WardScribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default model served through OpenRouter.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct:free";

/// Default OpenAI-compatible API base.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default sampling temperature for note generation.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

const DEFAULT_PORT: u16 = 8000;

/// Origins of the desktop shell (dev server + bundled webview).
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:8000",
    "http://127.0.0.1:8000",
];

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "wardscribe_lib=info,wardscribe=info,tower_http=warn"
}

/// Get the application data directory
/// ~/WardScribe/ on all platforms.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default directory holding the source files a note is generated from.
pub fn default_source_dir() -> PathBuf {
    app_data_dir().join("sources")
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Runtime configuration for the sidecar.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub source_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            source_dir: default_source_dir(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|o| o.to_string())
                .collect(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("WARDSCRIBE_HOST") {
            config.host = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "WARDSCRIBE_HOST",
                    value,
                })?;
        }
        if let Some(value) = get("WARDSCRIBE_PORT") {
            config.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "WARDSCRIBE_PORT",
                    value,
                })?;
        }
        if let Some(value) = get("WARDSCRIBE_SOURCE_DIR") {
            config.source_dir = PathBuf::from(value);
        }
        if let Some(value) = get("WARDSCRIBE_ALLOWED_ORIGINS") {
            config.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = get("WARDSCRIBE_TEMPERATURE") {
            config.temperature = value
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|t| (0.0..=2.0).contains(t))
                .ok_or(ConfigError::InvalidValue {
                    name: "WARDSCRIBE_TEMPERATURE",
                    value,
                })?;
        }

        config.api_key = get("OPENROUTER_API_KEY");
        if let Some(model) = get("OPENROUTER_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = get("OPENROUTER_BASE_URL") {
            config.base_url = base_url;
        }

        Ok(config)
    }

    /// Socket address the HTTP/WebSocket server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
