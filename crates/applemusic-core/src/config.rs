//! Configuration loaded from `~/.config/applemusic-mcp/config.toml`
//!
//! Every field has a default, so a missing file yields a usable config that
//! simply has no remote access until tokens are supplied.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_DIR_ENV: &str = "APPLEMUSIC_MCP_CONFIG_DIR";
const DEVELOPER_TOKEN_ENV: &str = "APPLE_MUSIC_DEVELOPER_TOKEN";
const USER_TOKEN_ENV: &str = "APPLE_MUSIC_USER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_storefront")]
    pub storefront: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub applescript: AppleScriptConfig,
    /// Directory the config was read from; token files are looked up here
    #[serde(skip)]
    pub config_dir: PathBuf,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub developer_token: Option<String>,
    #[serde(default)]
    pub music_user_token: Option<String>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("TokenConfig")
            .field("developer_token", &redact(&self.developer_token))
            .field("music_user_token", &redact(&self.music_user_token))
            .finish()
    }
}

/// Defaults for playlist mutation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Search the catalog and add to library when a track is not found
    #[serde(default)]
    pub auto_search: bool,
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
    #[serde(default = "default_true")]
    pub verify: bool,
    /// Delay before re-reading a playlist whose remote add did not show up
    #[serde(default = "default_verify_delay")]
    pub verify_delay_ms: u64,
    /// Lookups of a freshly added catalog track's library ID
    #[serde(default = "default_library_sync_polls")]
    pub library_sync_polls: u32,
    #[serde(default = "default_library_sync_interval")]
    pub library_sync_interval_ms: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_search: false,
            skip_duplicates: true,
            verify: true,
            verify_delay_ms: default_verify_delay(),
            library_sync_polls: default_library_sync_polls(),
            library_sync_interval_ms: default_library_sync_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Override for the track cache file location
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleScriptConfig {
    #[serde(default = "default_applescript_timeout")]
    pub timeout_secs: u64,
}

impl Default for AppleScriptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_applescript_timeout(),
        }
    }
}

fn default_storefront() -> String {
    "us".to_string()
}
fn default_api_base_url() -> String {
    "https://api.music.apple.com/v1".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_verify_delay() -> u64 {
    1500
}
fn default_library_sync_polls() -> u32 {
    5
}
fn default_library_sync_interval() -> u64 {
    200
}
fn default_applescript_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storefront: default_storefront(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            tokens: TokenConfig::default(),
            preferences: Preferences::default(),
            cache: CacheConfig::default(),
            applescript: AppleScriptConfig::default(),
            config_dir: PathBuf::new(),
        }
    }
}

/// `~/.config/applemusic-mcp`, or `$APPLEMUSIC_MCP_CONFIG_DIR`
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("applemusic-mcp")
}

/// `~/.cache/applemusic-mcp`
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("applemusic-mcp")
}

impl Config {
    /// Load from `path`, or from `config.toml` in the default directory
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_dir().join("config.toml"),
        };
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_dir);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::parse(&raw).with_context(|| format!("Invalid config in {}", path.display()))?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.config_dir = config_dir;
        config.resolve_tokens();
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("Failed to parse TOML")?;
        Ok(config)
    }

    /// Track cache file location
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| default_cache_dir().join("track_cache.json"))
    }

    pub fn has_remote_credentials(&self) -> bool {
        self.tokens.developer_token.is_some() && self.tokens.music_user_token.is_some()
    }

    /// Fill tokens from the environment, then from token files written by
    /// the separate authorization tooling.
    fn resolve_tokens(&mut self) {
        if let Ok(t) = std::env::var(DEVELOPER_TOKEN_ENV)
            && !t.trim().is_empty()
        {
            self.tokens.developer_token = Some(t.trim().to_string());
        }
        if let Ok(t) = std::env::var(USER_TOKEN_ENV)
            && !t.trim().is_empty()
        {
            self.tokens.music_user_token = Some(t.trim().to_string());
        }
        if self.tokens.developer_token.is_none() {
            self.tokens.developer_token =
                read_token_file(&self.config_dir.join("developer_token.json"), "token");
        }
        if self.tokens.music_user_token.is_none() {
            self.tokens.music_user_token = read_token_file(
                &self.config_dir.join("music_user_token.json"),
                "music_user_token",
            );
        }
    }
}

fn read_token_file(path: &Path, field: &str) -> Option<String> {
    if !path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok());
    match parsed.as_ref().and_then(|v| v.get(field)).and_then(|v| v.as_str()) {
        Some(token) if !token.is_empty() => Some(token.to_string()),
        _ => {
            warn!("Ignoring unreadable token file {}", path.display());
            None
        }
    }
}
