//! Configuration parsing.
//!
//! `kbctl` reads a TOML file with three sections:
//!
//! ```toml
//! [db]
//! path = "./data/kb_tracker.sqlite"
//!
//! [kb]
//! api_key = "VF.DM.xxxx"
//! project_id = "xxxx"
//! timeout_secs = 30
//!
//! [server]
//! bind = "127.0.0.1:5000"
//! ```
//!
//! Every section is optional. Credentials may also come from the
//! `VF_API_KEY` / `VF_PROJECT_ID` environment variables or from CLI flags;
//! all of these are folded into the [`Config`] value once, at load time.
//! Nothing mutates credentials after that.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub kb: KbConfig,
    #[serde(default)]
    pub server: ServerConfig,
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
    PathBuf::from("./data/kb_tracker.sqlite")
}

/// Connection settings for the remote knowledge base.
#[derive(Debug, Deserialize, Clone)]
pub struct KbConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_query_url")]
    pub query_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            base_url: default_base_url(),
            query_url: default_query_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.voiceflow.com".to_string()
}
fn default_query_url() -> String {
    "https://general-runtime.voiceflow.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl KbConfig {
    /// Returns a copy with the given credentials layered on top.
    ///
    /// `None` keeps the existing value. Used for CLI flags and for
    /// per-request credentials in the HTTP server.
    pub fn with_credentials(&self, api_key: Option<String>, project_id: Option<String>) -> Self {
        let mut kb = self.clone();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            kb.api_key = Some(key.trim().to_string());
        }
        if let Some(id) = project_id.filter(|p| !p.trim().is_empty()) {
            kb.project_id = Some(id.trim().to_string());
        }
        kb
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("no API key configured (set kb.api_key, VF_API_KEY, or --api-key)")
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Config {
    /// Layers environment overrides (`VF_API_KEY`, `VF_PROJECT_ID`,
    /// `KB_DB_PATH`) on top of the parsed file.
    pub fn apply_env(mut self) -> Self {
        self.kb = self.kb.with_credentials(
            std::env::var("VF_API_KEY").ok(),
            std::env::var("VF_PROJECT_ID").ok(),
        );
        if let Ok(path) = std::env::var("KB_DB_PATH") {
            if !path.trim().is_empty() {
                self.db.path = PathBuf::from(path);
            }
        }
        self
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads the config file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        log::debug!("config file {} not found, using defaults", path.display());
        Config::default()
    };

    let config = config.apply_env();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    for (field, value) in [
        ("kb.base_url", &config.kb.base_url),
        ("kb.query_url", &config.kb.query_url),
    ] {
        url::Url::parse(value).with_context(|| format!("{} is not a valid URL: {}", field, value))?;
    }

    if config.kb.timeout_secs == 0 {
        anyhow::bail!("kb.timeout_secs must be > 0");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("./data/kb_tracker.sqlite"));
        assert_eq!(cfg.kb.base_url, "https://api.voiceflow.com");
        assert_eq!(cfg.kb.query_url, "https://general-runtime.voiceflow.com");
        assert_eq!(cfg.kb.timeout_secs, 30);
        assert!(cfg.kb.api_key.is_none());
    }

    #[test]
    fn test_full_config() {
        let cfg = parse_config(
            r#"
[db]
path = "/tmp/ledger.sqlite"

[kb]
api_key = "VF.DM.abc"
project_id = "proj"
base_url = "http://127.0.0.1:9000"
timeout_secs = 5

[server]
bind = "0.0.0.0:8080"
"#,
        )
        .unwrap();
        assert_eq!(cfg.kb.api_key.as_deref(), Some("VF.DM.abc"));
        assert_eq!(cfg.kb.base_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = parse_config("[kb]\nbase_url = \"not a url\"").unwrap_err();
        assert!(err.to_string().contains("kb.base_url"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(parse_config("[kb]\ntimeout_secs = 0").is_err());
    }

    #[test]
    fn test_with_credentials_ignores_blank() {
        let kb = KbConfig {
            api_key: Some("original".into()),
            ..Default::default()
        };
        let layered = kb.with_credentials(Some("  ".into()), Some(" proj ".into()));
        assert_eq!(layered.api_key.as_deref(), Some("original"));
        assert_eq!(layered.project_id.as_deref(), Some("proj"));
        // the source value is untouched
        assert!(kb.project_id.is_none());
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let kb = KbConfig::default();
        assert!(kb.api_key().is_err());
    }
}
