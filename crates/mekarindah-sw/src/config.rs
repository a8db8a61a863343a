//! Worker configuration.
//!
//! Every constant the worker depends on lives here and is fixed once the
//! worker is constructed.

use mekarindah_common::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Current cache generation.
pub const DEFAULT_CACHE_NAME: &str = "masjid-mekarindah-v1.0.0";

/// Page served to navigations when both network and cache miss.
pub const DEFAULT_OFFLINE_URL: &str = "/offline.html";

/// Sync tag that triggers the data sync hook.
pub const DEFAULT_SYNC_TAG: &str = "sync-data";

/// Service worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the current cache; doubles as the version tag.
    pub cache_name: String,

    /// Offline fallback page for navigation requests.
    pub offline_url: String,

    /// Assets pre-cached at install, in order.
    pub static_assets: Vec<String>,

    /// Hostname fragments routed network-first.
    pub api_hosts: Vec<String>,

    /// Site origin; relative URLs resolve against it.
    pub origin: Url,

    /// Background sync tag handled by the worker.
    pub sync_tag: String,

    /// Push notification defaults.
    pub notification: NotificationDefaults,
}

/// Defaults applied to push notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Where a click navigates when the payload carries no URL.
    pub url: String,
    pub vibrate: Vec<u32>,
    pub open_action_title: String,
    pub close_action_title: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            offline_url: DEFAULT_OFFLINE_URL.to_string(),
            static_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
                "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600;700&family=Amiri:wght@400;700&display=swap".to_string(),
                "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css".to_string(),
            ],
            api_hosts: vec!["api.jsonbin.io".to_string(), "api.aladhan.com".to_string()],
            origin: default_origin(),
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            notification: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Masjid Mekarindah".to_string(),
            body: "Ada notifikasi baru!".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            url: "/".to_string(),
            vibrate: vec![100, 50, 100],
            open_action_title: "Buka".to_string(),
            close_action_title: "Tutup".to_string(),
        }
    }
}

fn default_origin() -> Url {
    Url::parse("http://localhost:8080/").expect("static origin URL is valid")
}

impl WorkerConfig {
    /// Load a config from a JSON file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = mekarindah_common::load_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Override the origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::invalid("cache_name", "must not be empty"));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "origin",
                format!("`{}` is not an http(s) URL", self.origin),
            ));
        }
        self.resolve(&self.offline_url)
            .map_err(|e| ConfigError::invalid("offline_url", e.to_string()))?;
        for asset in &self.static_assets {
            self.resolve(asset)
                .map_err(|e| ConfigError::invalid("static_assets", format!("{asset}: {e}")))?;
        }
        Ok(())
    }

    /// Resolve a possibly relative URL against the origin.
    pub fn resolve(&self, url: &str) -> Result<Url, url::ParseError> {
        self.origin.join(url)
    }

    /// Whether a hostname belongs to one of the API hosts.
    pub fn is_api_host(&self, host: &str) -> bool {
        self.api_hosts.iter().any(|api| host.contains(api.as_str()))
    }

    /// Whether a URL shares this worker's origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "masjid-mekarindah-v1.0.0");
        assert_eq!(config.static_assets.len(), 7);
        assert_eq!(config.sync_tag, "sync-data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_host_uses_substring_match() {
        let config = WorkerConfig::default();
        assert!(config.is_api_host("api.aladhan.com"));
        assert!(config.is_api_host("eu.api.jsonbin.io"));
        assert!(!config.is_api_host("aladhan.com"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.resolve("/manifest.json").unwrap().as_str(),
            "http://localhost:8080/manifest.json"
        );
        assert_eq!(
            config.resolve("https://cdn.example.com/a.css").unwrap().host_str(),
            Some("cdn.example.com")
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: WorkerConfig =
            mekarindah_common::load_json_str(r#"{"cache_name":"masjid-mekarindah-v2"}"#).unwrap();
        assert_eq!(config.cache_name, "masjid-mekarindah-v2");
        assert_eq!(config.offline_url, "/offline.html");
        assert_eq!(config.notification.title, "Masjid Mekarindah");
    }

    #[test]
    fn test_validate_rejects_empty_cache_name() {
        let config = WorkerConfig {
            cache_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_origin() {
        let config = WorkerConfig::default();
        assert!(config.is_same_origin(&Url::parse("http://localhost:8080/jadwal").unwrap()));
        assert!(!config.is_same_origin(&Url::parse("https://localhost:8080/").unwrap()));
    }
}
