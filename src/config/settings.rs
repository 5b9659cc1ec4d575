use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use claude_monitor_core::credential::{EnvCredentialSupplier, DEFAULT_CREDENTIAL_VAR};
use claude_monitor_core::usage::source::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use claude_monitor_core::usage::{ClientConfig, CoordinatorConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Claude usage monitor")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve `/api/usage` and the dashboard (default)
    Serve,
    /// Fetch usage once without caching and print it as JSON
    Fetch,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if running in one-shot fetch mode
    pub fn is_fetch_mode(&self) -> bool {
        matches!(self.command, Some(Command::Fetch))
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Upstream API settings
    #[serde(default)]
    pub upstream: UpstreamSettings,

    /// Usage cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Session credential lookup
    #[serde(default)]
    pub credential: CredentialSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// `max-age` advertised on `/api/usage` responses
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,

    /// `stale-while-revalidate` advertised on `/api/usage` responses
    #[serde(default = "default_stale_while_revalidate")]
    pub stale_while_revalidate_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3456
}

fn default_cache_max_age() -> u64 {
    120
}

fn default_stale_while_revalidate() -> u64 {
    60
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cache_max_age_secs: default_cache_max_age(),
            stale_while_revalidate_secs: default_stale_while_revalidate(),
        }
    }
}

impl ServerSettings {
    /// `Cache-Control` header value for usage responses
    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.cache_max_age_secs, self.stale_while_revalidate_secs
        )
    }
}

/// Upstream API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Upstream origin
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User-Agent presented to the upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Usage cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds a fetched snapshot stays fresh
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Seconds a caller waits on an in-flight fetch when nothing is cached
    #[serde(default = "default_wait")]
    pub wait_secs: u64,
}

fn default_ttl() -> u64 {
    60
}

fn default_wait() -> u64 {
    5
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            wait_secs: default_wait(),
        }
    }
}

/// Session credential lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Environment variable (and dotenv key) holding the session cookie
    #[serde(default = "default_env_var")]
    pub env_var: String,

    /// Dotenv file consulted when the variable is not set
    #[serde(default = "default_env_file")]
    pub env_file: Option<PathBuf>,
}

fn default_env_var() -> String {
    DEFAULT_CREDENTIAL_VAR.to_string()
}

fn default_env_file() -> Option<PathBuf> {
    Some(PathBuf::from(".env"))
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            env_var: default_env_var(),
            env_file: default_env_file(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p));
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("claude-monitor/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/claude-monitor/config.toml")),
            dirs::home_dir().map(|p| p.join(".claude-monitor.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(bind) = &cli.bind {
            self.server.bind = bind.clone();
        }
    }

    /// Validate and normalize settings values
    ///
    /// A zero upstream timeout would make every fetch fail immediately.
    pub fn validate(&mut self) {
        const MIN_TIMEOUT_SECS: u64 = 1;

        if self.upstream.timeout_secs < MIN_TIMEOUT_SECS {
            self.upstream.timeout_secs = MIN_TIMEOUT_SECS;
        }
        if self.upstream.base_url.trim().is_empty() {
            self.upstream.base_url = default_base_url();
        }
    }

    /// Coordinator freshness/wait policy
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            wait: Duration::from_secs(self.cache.wait_secs),
        }
    }

    /// Upstream client configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.upstream.base_url.clone(),
            timeout: Duration::from_secs(self.upstream.timeout_secs),
            user_agent: self.upstream.user_agent.clone(),
        }
    }

    /// Credential supplier for the configured variable and dotenv file
    pub fn credential_supplier(&self) -> EnvCredentialSupplier {
        EnvCredentialSupplier::new(
            self.credential.env_var.clone(),
            self.credential.env_file.clone(),
        )
    }
}
