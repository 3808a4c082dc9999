use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_CREDENTIALS_PATH: &str = "config/serviceAccountKey.json";
const DEFAULT_DATABASE_ID: &str = "(default)";
const DEFAULT_API_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment variable conventionally pointing at a service-account key.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Environment variable set when a local Firestore emulator is running.
pub const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Path to the service-account JSON key
    #[serde(default)]
    pub credentials_path: Option<String>,

    /// Overrides the project named in the credential
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default = "default_database_id")]
    #[validate(length(min = 1))]
    pub database_id: String,

    /// Firestore REST endpoint
    #[serde(default = "default_api_base_url")]
    #[validate(url)]
    pub api_base_url: String,

    /// `host:port` of a local emulator; no credential is read when set
    #[serde(default)]
    pub emulator_host: Option<String>,

    /// Per-operation deadline in seconds
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,

    /// Cache the product lookup tables for this many seconds. Unset disables
    /// caching.
    #[serde(default)]
    #[validate(range(max = 86400))]
    pub lookup_cache_ttl_secs: Option<u64>,

    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            project_id: None,
            database_id: default_database_id(),
            api_base_url: default_api_base_url(),
            emulator_host: None,
            request_timeout_secs: default_request_timeout_secs(),
            lookup_cache_ttl_secs: None,
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Credential location: configured path, then `GOOGLE_APPLICATION_CREDENTIALS`,
    /// then `config/serviceAccountKey.json`.
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .or_else(|| env::var(CREDENTIALS_ENV).ok().filter(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string())
            .into()
    }

    /// Configured emulator host, or `FIRESTORE_EMULATOR_HOST`.
    pub fn emulator_host(&self) -> Option<String> {
        self.emulator_host
            .clone()
            .or_else(|| env::var(EMULATOR_HOST_ENV).ok())
            .filter(|host| !host.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lookup_cache_ttl(&self) -> Option<Duration> {
        self.lookup_cache_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_database_id() -> String {
    DEFAULT_DATABASE_ID.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stockkeeper={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

/// [`load_config`] reading the TOML layers from `dir`.
pub fn load_config_from(dir: impl AsRef<Path>) -> Result<AppConfig, AppConfigError> {
    let dir = dir.as_ref();
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", dir.display())).required(false))
        .add_source(File::with_name(&format!("{}/{}", dir.display(), run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
