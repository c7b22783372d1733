use crate::entities::commerce::ShippingOption;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/";
const DEFAULT_CART_STORAGE_PATH: &str = ".storefront/cart.json";
const DEFAULT_CURRENCY: &str = "VND";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REDIRECT_DELAY_SECS: u64 = 3;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const CONFIG_DIR: &str = "config";

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Root of the storefront REST API, e.g. `https://shop.example.com/api/`
    #[validate(custom = "validate_base_url")]
    pub api_base_url: String,

    /// Per-request timeout for storefront API calls
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Where the local cart is persisted between runs
    #[serde(default = "default_cart_storage_path")]
    pub cart_storage_path: PathBuf,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Display currency code; all amounts are whole units of it
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Flat shipping fee table offered at checkout
    #[serde(default = "default_shipping_options")]
    pub shipping_options: Vec<ShippingOption>,

    /// Shared secret for verifying gateway return signatures. When unset
    /// the payment status endpoint is polled instead.
    #[serde(default)]
    pub payment_gateway_secret: Option<String>,

    /// Pause before navigating away from the payment result screen
    #[serde(default = "default_redirect_delay_secs")]
    pub reconcile_redirect_delay_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    pub fn new(api_base_url: String) -> Self {
        Self {
            api_base_url,
            request_timeout_secs: default_request_timeout_secs(),
            cart_storage_path: default_cart_storage_path(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            currency: default_currency(),
            shipping_options: default_shipping_options(),
            payment_gateway_secret: None,
            reconcile_redirect_delay_secs: default_redirect_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_secs(self.reconcile_redirect_delay_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.shipping_options.is_empty() {
            let mut err = ValidationError::new("shipping_options");
            err.message = Some("At least one shipping option must be configured".into());
            errors.add("shipping_options", err);
        }

        let mut seen = HashSet::new();
        for option in &self.shipping_options {
            if option.fee <= Decimal::ZERO {
                let mut err = ValidationError::new("shipping_options");
                err.message = Some(format!("Shipping option '{}' must have a positive fee", option.id).into());
                errors.add("shipping_options", err);
            }
            if !seen.insert(option.id.as_str()) {
                let mut err = ValidationError::new("shipping_options");
                err.message = Some(format!("Duplicate shipping option id '{}'", option.id).into());
                errors.add("shipping_options", err);
            }
        }

        if self.is_production()
            && self
                .payment_gateway_secret
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            let mut err = ValidationError::new("payment_gateway_secret");
            err.message = Some("A gateway signing secret is required in production".into());
            errors.add("payment_gateway_secret", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_cart_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_CART_STORAGE_PATH)
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_shipping_options() -> Vec<ShippingOption> {
    vec![
        ShippingOption {
            id: "standard".to_string(),
            label: "Standard delivery".to_string(),
            fee: dec!(20000),
        },
        ShippingOption {
            id: "express".to_string(),
            label: "Express delivery".to_string(),
            fee: dec!(35000),
        },
    ]
}

fn default_redirect_delay_secs() -> u64 {
    DEFAULT_REDIRECT_DELAY_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("api_base_url");
            err.message = Some("Must be an absolute http(s) URL".into());
            Err(err)
        }
    }
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

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_checkout={},storefront={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
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
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("api_base_url", DEFAULT_API_BASE_URL)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
