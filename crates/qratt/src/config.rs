/// Runtime configuration for the attendance service
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable naming the JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "QRATT_CONFIG";

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file, or `:memory:`
    pub database_path: String,
    pub host: String,
    pub port: u16,
    /// Public base URL the QR payload points back to
    pub base_url: String,
    /// Installation-wide secret mixed into QR tokens
    pub site_secret: Option<String>,
    /// External QR image generator; the payload is appended as `data`
    pub qr_image_service: String,
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "qratt.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            site_secret: None,
            qr_image_service: "https://api.qrserver.com/v1/create-qr-code/?size=400x400"
                .to_string(),
            log_filter: "qratt=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads a configuration file. Keys that are absent keep their defaults.
    ///
    /// # Arguments
    /// * `path` - Path to a JSON configuration file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - Parsed configuration
    /// * `Err` - If the file can't be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Loads the file named by `QRATT_CONFIG`, or the defaults when it is unset.
    pub fn load() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_file(Path::new(path.trim())),
            _ => Ok(Self::default()),
        }
    }

    /// Address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
