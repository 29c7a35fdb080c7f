//! Host configuration.
//!
//! Stored as TOML, read from `PAGEDROP_CONFIG` when set, otherwise from
//! - Linux: `~/.config/pagedrop/host.toml`
//! - Windows: `%APPDATA%/pagedrop/host.toml`
//!
//! Every field is optional.

use std::path::{Path, PathBuf};

use pagedrop_auth::OAuthClientConfig;
use pagedrop_coordinator::CoordinatorConfig;
use pagedrop_protocol::constants::DEFAULT_STREAM_CHUNK_SIZE;
use pagedrop_transfer::DEFAULT_REPLACEMENT_CHARACTER;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "PAGEDROP_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory local downloads are written to.
    pub download_dir: PathBuf,

    /// JSON file holding the token store credential.
    pub credentials_path: PathBuf,

    /// Size of the chunks streamed back to sessions.
    pub chunk_size: usize,

    pub filename_replacement_character: String,

    pub token_client_id: String,
    pub token_redirect_url: String,
    pub token_auth_endpoint: String,
    pub token_scopes: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        let base = config_base_dir();
        Self {
            download_dir: home_dir().join("Downloads"),
            credentials_path: base.join("pagedrop").join("credentials.json"),
            chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            filename_replacement_character: DEFAULT_REPLACEMENT_CHARACTER.to_string(),
            token_client_id: String::new(),
            token_redirect_url: "https://pagedrop.invalid/auth".into(),
            token_auth_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_scopes: vec!["https://www.googleapis.com/auth/drive.file".into()],
        }
    }
}

impl HostConfig {
    /// Loads the configuration from its default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads the configuration from `path`. A missing file yields the
    /// defaults; an unparsable one is logged and ignored.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            chunk_size: self.chunk_size,
            replacement_character: self.filename_replacement_character.clone(),
        }
    }

    pub fn oauth_client(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: self.token_client_id.clone(),
            auth_endpoint: self.token_auth_endpoint.clone(),
            redirect_url: self.token_redirect_url.clone(),
            scopes: self.token_scopes.clone(),
        }
    }
}

/// Location of the config file.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_base_dir().join("pagedrop").join("host.toml"),
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join(".config"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default\\AppData"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        home_dir().join("Library").join("Application Support")
    }
}
