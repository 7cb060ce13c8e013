//! Configuration loading and validation.
//!
//! Verity is configured by a TOML file (default `./config/verity.toml`).
//! Every section and field has a default, so a missing file or an empty
//! one yields a working local setup. The environment variables understood
//! by the original web backend override the file when set:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `API_BASE_URL` | `upstream.base_url` |
//! | `DEEPFAKE_API_ENDPOINT` | `upstream.video_path` |
//! | `AUDIO_API_ENDPOINT` | `upstream.audio_path` |
//! | `IMAGE_API_ENDPOINT` | `upstream.image_path` |
//! | `MISINFORMATION_API_ENDPOINT` | `upstream.text_path` |
//! | `MISINFORMATION_API_URL` | `upstream.text_url` |
//! | `WEB_SERVER_PORT` | port of `server.bind` |
//!
//! ```toml
//! [db]
//! path = "./data/verity.sqlite"
//!
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [upstream]
//! mode = "http"
//! base_url = "http://127.0.0.1:5002"
//! media_timeout_secs = 300
//!
//! [uploads]
//! dir = "./uploads"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use verity_core::Category;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/verity.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Keep server-side history in memory instead of SQLite.
    #[serde(default)]
    pub ephemeral_history: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ephemeral_history: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// `"http"` forwards to the detection API; `"simulated"` answers locally
    /// with placeholder scores.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_video_path")]
    pub video_path: String,
    #[serde(default = "default_audio_path")]
    pub audio_path: String,
    #[serde(default = "default_image_path")]
    pub image_path: String,
    #[serde(default = "default_text_path")]
    pub text_path: String,
    /// Full URL for text analysis, replacing `base_url + text_path`.
    #[serde(default)]
    pub text_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub media_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub text_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            base_url: default_base_url(),
            video_path: default_video_path(),
            audio_path: default_audio_path(),
            image_path: default_image_path(),
            text_path: default_text_path(),
            text_url: None,
            media_timeout_secs: default_timeout_secs(),
            text_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_mode() -> String {
    "http".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:5002".to_string()
}
fn default_video_path() -> String {
    "/api/video/".to_string()
}
fn default_audio_path() -> String {
    "/api/audio/".to_string()
}
fn default_image_path() -> String {
    "/api/image/".to_string()
}
fn default_text_path() -> String {
    "/api/text/".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}

impl UpstreamConfig {
    /// Detection-API URL for a category.
    pub fn endpoint(&self, category: Category) -> String {
        let base = self.base_url.trim_end_matches('/');
        let join = |path: &str| {
            if path.starts_with('/') {
                format!("{}{}", base, path)
            } else {
                format!("{}/{}", base, path)
            }
        };
        match category {
            Category::Deepfake => join(&self.video_path),
            Category::Audio => join(&self.audio_path),
            Category::Image => join(&self.image_path),
            Category::Misinfo => self
                .text_url
                .clone()
                .unwrap_or_else(|| join(&self.text_path)),
        }
    }

    /// Request timeout for a category, in seconds.
    pub fn timeout_secs(&self, category: Category) -> u64 {
        match category {
            Category::Misinfo => self.text_timeout_secs,
            _ => self.media_timeout_secs,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == "simulated"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_max_bytes() -> u64 {
    1024 * 1024 * 1024
}

/// Load, override from the environment, and validate the configuration.
///
/// A missing file is not an error: defaults are used and a warning logged.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        log::warn!(
            "config file {} not found, using defaults",
            path.display()
        );
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Apply the original backend's environment variables on top of `config`.
///
/// `lookup` abstracts `std::env::var` so the mapping can be tested.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let upstream = &mut config.upstream;
    if let Some(v) = lookup("API_BASE_URL") {
        upstream.base_url = v;
    }
    if let Some(v) = lookup("DEEPFAKE_API_ENDPOINT") {
        upstream.video_path = v;
    }
    if let Some(v) = lookup("AUDIO_API_ENDPOINT") {
        upstream.audio_path = v;
    }
    if let Some(v) = lookup("IMAGE_API_ENDPOINT") {
        upstream.image_path = v;
    }
    if let Some(v) = lookup("MISINFORMATION_API_ENDPOINT") {
        upstream.text_path = v;
    }
    if let Some(v) = lookup("MISINFORMATION_API_URL") {
        upstream.text_url = Some(v);
    }
    if let Some(port) = lookup("WEB_SERVER_PORT") {
        let host = config
            .server
            .bind
            .rsplit_once(':')
            .map(|(h, _)| h.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.bind = format!("{}:{}", host, port);
    }
}

/// Check a configuration for values the relay cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    let upstream = &config.upstream;

    match upstream.mode.as_str() {
        "http" | "simulated" => {}
        other => anyhow::bail!(
            "Unknown upstream mode: '{}'. Must be http or simulated.",
            other
        ),
    }

    if !(upstream.base_url.starts_with("http://") || upstream.base_url.starts_with("https://")) {
        anyhow::bail!("upstream.base_url must be an http(s) URL");
    }
    if let Some(url) = &upstream.text_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("upstream.text_url must be an http(s) URL");
        }
    }

    if upstream.media_timeout_secs == 0 || upstream.text_timeout_secs == 0 {
        anyhow::bail!("upstream timeouts must be > 0");
    }

    if config.uploads.max_bytes == 0 {
        anyhow::bail!("uploads.max_bytes must be > 0");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.upstream.media_timeout_secs, 300);
        assert_eq!(config.uploads.max_bytes, 1024 * 1024 * 1024);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_endpoints() {
        let mut upstream = UpstreamConfig {
            base_url: "http://api.local:5002/".to_string(),
            ..UpstreamConfig::default()
        };
        assert_eq!(
            upstream.endpoint(Category::Deepfake),
            "http://api.local:5002/api/video/"
        );
        assert_eq!(
            upstream.endpoint(Category::Misinfo),
            "http://api.local:5002/api/text/"
        );
        upstream.text_url = Some("http://text.local/check".to_string());
        assert_eq!(upstream.endpoint(Category::Misinfo), "http://text.local/check");
        assert_eq!(
            upstream.endpoint(Category::Image),
            "http://api.local:5002/api/image/"
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_BASE_URL", "http://10.0.0.5:9000"),
            ("AUDIO_API_ENDPOINT", "/v2/audio"),
            ("WEB_SERVER_PORT", "8080"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.upstream.base_url, "http://10.0.0.5:9000");
        assert_eq!(
            config.upstream.endpoint(Category::Audio),
            "http://10.0.0.5:9000/v2/audio"
        );
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_rejects_unknown_mode_and_bad_url() {
        let config: Config = toml::from_str("[upstream]\nmode = \"magic\"").unwrap();
        assert!(validate(&config).is_err());

        let config: Config = toml::from_str("[upstream]\nbase_url = \"ftp://x\"").unwrap();
        assert!(validate(&config).is_err());

        let config: Config = toml::from_str("[upstream]\ntext_timeout_secs = 0").unwrap();
        assert!(validate(&config).is_err());
    }
}
