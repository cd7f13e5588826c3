//! Configuration management for the buildhook webhook receiver.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use buildhook_core::{TrustedRanges, DEFAULT_TRUSTED_RANGES};
use buildhook_runner::SatisBuild;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "buildhook.toml";
const ENV_PREFIX: &str = "BUILDHOOK_";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `BUILDHOOK_` (highest priority)
/// 2. Configuration file (`buildhook.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use buildhook_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Rebuilding {} on {}:{}", config.project_dir.display(), config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `BUILDHOOK_HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `BUILDHOOK_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// Time allowed to produce response headers, in seconds.
    ///
    /// Streaming bodies are not cut off by this limit.
    ///
    /// Environment variable: `BUILDHOOK_REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Take the client address from the right-most `X-Forwarded-For` entry.
    ///
    /// Only enable behind a reverse proxy that appends that header.
    ///
    /// Environment variable: `BUILDHOOK_BEHIND_PROXY`
    #[serde(default)]
    pub behind_proxy: bool,

    // Admission
    /// IPv4 ranges allowed to trigger builds.
    ///
    /// Environment variable: `BUILDHOOK_TRUSTED_RANGES`
    #[serde(default = "default_trusted_ranges")]
    pub trusted_ranges: Vec<String>,

    // Build
    /// Satis project root; builds run from here.
    ///
    /// Environment variable: `BUILDHOOK_PROJECT_DIR`
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Satis executable relative to `project_dir`.
    ///
    /// Environment variable: `BUILDHOOK_SATIS_BINARY`
    #[serde(default = "default_satis_binary")]
    pub satis_binary: PathBuf,
    /// Satis configuration file.
    ///
    /// Environment variable: `BUILDHOOK_SATIS_CONFIG`
    #[serde(default = "default_satis_config")]
    pub satis_config: String,
    /// Prefix of repository URLs handed to satis.
    ///
    /// Environment variable: `BUILDHOOK_REPOSITORY_HOST`
    #[serde(default = "default_repository_host")]
    pub repository_host: String,
    /// Composer home exported to builds as `HOME`.
    ///
    /// Environment variable: `BUILDHOOK_COMPOSER_HOME`
    #[serde(default)]
    pub composer_home: Option<PathBuf>,
    /// Builds running longer than this are killed.
    ///
    /// Environment variable: `BUILDHOOK_BUILD_TIMEOUT_SECONDS`
    #[serde(default = "default_build_timeout")]
    pub build_timeout_seconds: u64,

    // Logging
    /// Log filter used when `RUST_LOG` is not set.
    ///
    /// Environment variable: `BUILDHOOK_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides, then validate it.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered providers `load` reads from.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Extracts and validates configuration from `figment`.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Parsed allowlist.
    pub fn trusted_ranges(&self) -> Result<TrustedRanges> {
        TrustedRanges::parse(self.trusted_ranges.as_slice()).context("Invalid trusted range")
    }

    /// Build launcher for admitted pushes.
    pub fn satis_build(&self) -> SatisBuild {
        SatisBuild {
            project_dir: self.project_dir.clone(),
            satis_binary: self.satis_binary.clone(),
            satis_config: self.satis_config.clone(),
            repository_host: self.repository_host.clone(),
            composer_home: self.composer_home.clone(),
            timeout: Duration::from_secs(self.build_timeout_seconds),
        }
    }

    /// Timeout for producing response headers.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.build_timeout_seconds == 0 {
            anyhow::bail!("build_timeout_seconds must be greater than 0");
        }

        if self.project_dir.as_os_str().is_empty() {
            anyhow::bail!("project_dir must not be empty");
        }

        if self.satis_binary.as_os_str().is_empty() {
            anyhow::bail!("satis_binary must not be empty");
        }

        self.trusted_ranges()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            behind_proxy: false,
            trusted_ranges: default_trusted_ranges(),
            project_dir: default_project_dir(),
            satis_binary: default_satis_binary(),
            satis_config: default_satis_config(),
            repository_host: default_repository_host(),
            composer_home: None,
            build_timeout_seconds: default_build_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_trusted_ranges() -> Vec<String> {
    DEFAULT_TRUSTED_RANGES.iter().map(|range| (*range).to_string()).collect()
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_satis_binary() -> PathBuf {
    PathBuf::from("bin/satis")
}

fn default_satis_config() -> String {
    "satis.json".to_string()
}

fn default_repository_host() -> String {
    "git@bitbucket.org".to_string()
}

fn default_build_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info,buildhook=debug,tower_http=debug".to_string()
}
