//! Configuration management for the weatherdeck session core.
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::WeatherdeckError;

/// Root configuration structure for the weatherdeck application
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeatherdeckConfig {
    /// Weather provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Session controller timings
    #[serde(default)]
    pub session: SessionConfig,
    /// Location detection services
    #[serde(default)]
    pub location: LocationConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Weather provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider access key, sent as the `access_key` query parameter
    pub access_key: Option<String>,
    /// Base URL for the weather API
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached responses
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Entry expiration window in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

/// Session controller timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Quiet window for debounced searches, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Auto-refresh period in minutes
    #[serde(default = "default_auto_refresh_minutes")]
    pub auto_refresh_minutes: u64,
    /// Location-drift check period in seconds
    #[serde(default = "default_drift_check_seconds")]
    pub drift_check_seconds: u64,
    /// Distance in kilometers beyond which the displayed location is updated
    #[serde(default = "default_drift_threshold_km")]
    pub drift_threshold_km: f64,
    /// Provisional query used until location resolution completes
    #[serde(default = "default_query")]
    pub default_query: String,
}

/// Location detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Bound for each geolocation attempt, in seconds
    #[serde(default = "default_geolocation_timeout")]
    pub geolocation_timeout_seconds: u64,
    /// Reverse geocoding endpoint
    #[serde(default = "default_reverse_geocode_url")]
    pub reverse_geocode_url: String,
    /// Network-address geolocation endpoint
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_provider_base_url() -> String {
    "https://api.weatherstack.com/current".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_cache_max_entries() -> usize {
    50
}

fn default_cache_ttl() -> u64 {
    60 * 60
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_auto_refresh_minutes() -> u64 {
    10
}

fn default_drift_check_seconds() -> u64 {
    30
}

fn default_drift_threshold_km() -> f64 {
    1.0
}

fn default_query() -> String {
    "London".to_string()
}

fn default_geolocation_timeout() -> u64 {
    5
}

fn default_reverse_geocode_url() -> String {
    "https://nominatim.openstreetmap.org/reverse".to_string()
}

fn default_ip_lookup_url() -> String {
    "https://ip-api.com/json/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            base_url: default_provider_base_url(),
            timeout_seconds: default_provider_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            auto_refresh_minutes: default_auto_refresh_minutes(),
            drift_check_seconds: default_drift_check_seconds(),
            drift_threshold_km: default_drift_threshold_km(),
            default_query: default_query(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            geolocation_timeout_seconds: default_geolocation_timeout(),
            reverse_geocode_url: default_reverse_geocode_url(),
            ip_lookup_url: default_ip_lookup_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WeatherdeckConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment variable overrides with WEATHERDECK_ prefix, e.g.
        // WEATHERDECK_PROVIDER__ACCESS_KEY
        builder = builder.add_source(
            Environment::with_prefix("WEATHERDECK")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let config: WeatherdeckConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("weatherdeck").join("config.toml"))
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.provider.timeout_seconds == 0 || self.provider.timeout_seconds > 300 {
            return Err(WeatherdeckError::config(
                "Provider timeout must be between 1 and 300 seconds",
            )
            .into());
        }

        if self.cache.max_entries == 0 {
            return Err(WeatherdeckError::config("Cache must hold at least one entry").into());
        }

        if self.cache.ttl_seconds > 7 * 24 * 60 * 60 {
            return Err(
                WeatherdeckError::config("Cache TTL cannot exceed 604800 seconds (1 week)").into(),
            );
        }

        if self.session.debounce_ms > 10_000 {
            return Err(
                WeatherdeckError::config("Debounce delay cannot exceed 10000 ms").into(),
            );
        }

        if self.session.auto_refresh_minutes == 0 || self.session.auto_refresh_minutes > 24 * 60 {
            return Err(WeatherdeckError::config(
                "Auto-refresh interval must be between 1 minute and 1 day",
            )
            .into());
        }

        if self.session.drift_check_seconds == 0 {
            return Err(
                WeatherdeckError::config("Drift check period must be at least 1 second").into(),
            );
        }

        if self.session.drift_threshold_km <= 0.0 {
            return Err(
                WeatherdeckError::config("Drift threshold must be greater than zero").into(),
            );
        }

        if self.location.geolocation_timeout_seconds == 0
            || self.location.geolocation_timeout_seconds > 60
        {
            return Err(WeatherdeckError::config(
                "Geolocation timeout must be between 1 and 60 seconds",
            )
            .into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(WeatherdeckError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(WeatherdeckError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for url in [
            &self.provider.base_url,
            &self.location.reverse_geocode_url,
            &self.location.ip_lookup_url,
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(WeatherdeckError::config(format!(
                    "'{url}' is not a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        if self.session.default_query.trim().is_empty() {
            return Err(WeatherdeckError::config("Default query cannot be blank").into());
        }

        Ok(())
    }
}
