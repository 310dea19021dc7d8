//! Proxy configuration.
//!
//! The defaults are the values the ID Scanner app ships with. Changing
//! `version` produces a new bucket name, and the next activation deletes
//! the old one.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while loading or resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Cache name must not be empty")]
    EmptyCacheName,
}

/// Offline proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Application name shown in the offline page and notifications.
    pub app_name: String,

    /// Bucket name prefix.
    pub cache_prefix: String,

    /// Bucket version. Bumping it creates a new bucket.
    pub version: String,

    /// Origin the app is served from. Relative seeds resolve against it.
    pub origin: Url,

    /// Path of the worker script.
    pub script_path: String,

    /// Resources stored at install time.
    pub seed_urls: Vec<String>,

    /// The only sync tag that is acted on.
    pub sync_tag: String,

    /// Push notification defaults.
    pub notification: NotificationDefaults,
}

/// Defaults applied to push notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Body used when a push carries no payload.
    pub body: String,
    pub icon: String,
    pub badge: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            app_name: "ID Scanner".to_string(),
            cache_prefix: "id-scanner".to_string(),
            version: "v1".to_string(),
            origin: Url::parse("http://localhost:8080/").expect("static origin is valid"),
            script_path: "/sw.js".to_string(),
            seed_urls: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "https://cdnjs.cloudflare.com/ajax/libs/jspdf/1.5.3/jspdf.debug.js".to_string(),
            ],
            sync_tag: "background-sync".to_string(),
            notification: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            body: "New notification from ID Scanner".to_string(),
            icon: "/icon-192.png".to_string(),
            badge: "/icon-72.png".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Same configuration with a different bucket version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Same configuration served from a different origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Check that every URL resolves and the bucket name is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_prefix.is_empty() && self.version.is_empty() {
            return Err(ConfigError::EmptyCacheName);
        }
        self.script_url()?;
        self.seed_urls()?;
        Ok(())
    }

    /// Name of the authoritative bucket, e.g. `id-scanner-v1`.
    pub fn cache_name(&self) -> String {
        match (self.cache_prefix.is_empty(), self.version.is_empty()) {
            (true, _) => self.version.clone(),
            (_, true) => self.cache_prefix.clone(),
            _ => format!("{}-{}", self.cache_prefix, self.version),
        }
    }

    /// Resolve a possibly relative URL against the origin.
    pub fn resolve(&self, value: &str) -> Result<Url, ConfigError> {
        self.origin
            .join(value)
            .map_err(|source| ConfigError::InvalidUrl {
                value: value.to_string(),
                source,
            })
    }

    /// Absolute URL of the worker script.
    pub fn script_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.script_path)
    }

    /// Absolute seed URLs, in configured order.
    pub fn seed_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.seed_urls.iter().map(|s| self.resolve(s)).collect()
    }
}
