//! Configuration system for Treecast.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TREECAST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/treecast/config.toml
//!   3. ~/.config/treecast/config.toml

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{Capabilities, SearchMatch, MULTICAST_ADDR, MULTICAST_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreecastConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub services: ServicesConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Empty = `$USER`.
    pub username: String,
    /// Empty = system hostname.
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// IPv4 multicast group shared by all peers.
    pub group: String,
    pub port: u16,
    /// Multicast hop limit.
    pub ttl: u32,
    /// Receive our own datagrams back.
    pub loopback: bool,
    pub reuse_addr: bool,
    /// Bound on a single receive attempt.
    pub recv_timeout_ms: u64,
    /// Port advertised in beacons.
    pub server_port: u16,
    /// Local HTTP API port (127.0.0.1 only).
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Expiry sweep cadence.
    pub sleep_time_ms: u64,
    /// Beacon period, and the age after which a silent peer is dropped.
    pub maximum_beacon_period_ms: u64,
    /// Unanswered requests are forgotten after this long. 0 keeps them forever.
    pub pending_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Root of the shared file tree.
    pub root_dir: PathBuf,
    pub remote_browse: bool,
    pub search: bool,
    /// One of `none`, `path`, `path-filename`, `path-filename-substring`.
    pub search_match: String,
    pub download: bool,
    pub upload: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// A transfer listener closes if nobody connects within this window.
    pub accept_timeout_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: MULTICAST_ADDR.to_string(),
            port: MULTICAST_PORT,
            ttl: 2,
            loopback: true,
            reuse_addr: true,
            recv_timeout_ms: 100,
            server_port: MULTICAST_PORT,
            api_port: 4106,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sleep_time_ms: 5000,
            maximum_beacon_period_ms: 1000,
            pending_ttl_ms: 60_000,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            root_dir: data_dir().join("share"),
            remote_browse: false,
            search: false,
            search_match: SearchMatch::None.as_str().to_string(),
            download: false,
            upload: false,
            delete: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            accept_timeout_ms: 30_000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("treecast")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("treecast")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TreecastConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            TreecastConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TREECAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TreecastConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TREECAST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = var("TREECAST_IDENTITY__USERNAME") {
            self.identity.username = v;
        }
        if let Some(v) = var("TREECAST_IDENTITY__HOSTNAME") {
            self.identity.hostname = v;
        }
        if let Some(v) = var("TREECAST_NETWORK__GROUP") {
            self.network.group = v;
        }
        if let Some(p) = var("TREECAST_NETWORK__PORT").and_then(|v| v.parse().ok()) {
            self.network.port = p;
        }
        if let Some(p) = var("TREECAST_NETWORK__SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.network.server_port = p;
        }
        if let Some(p) = var("TREECAST_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(v) = var("TREECAST_NETWORK__LOOPBACK") {
            self.network.loopback = flag(v);
        }
        if let Some(v) = var("TREECAST_SERVICES__ROOT_DIR") {
            self.services.root_dir = PathBuf::from(v);
        }
        if let Some(v) = var("TREECAST_SERVICES__SEARCH") {
            self.services.search = flag(v);
        }
        if let Some(v) = var("TREECAST_SERVICES__SEARCH_MATCH") {
            self.services.search_match = v;
        }
        if let Some(v) = var("TREECAST_SERVICES__DOWNLOAD") {
            self.services.download = flag(v);
        }
        if let Some(v) = var("TREECAST_SERVICES__UPLOAD") {
            self.services.upload = flag(v);
        }
        if let Some(v) = var("TREECAST_SERVICES__DELETE") {
            self.services.delete = flag(v);
        }
    }

    /// Replace out-of-range values with their defaults. Returns one
    /// human-readable warning per replaced value.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let network = NetworkConfig::default();
        let timing = TimingConfig::default();

        match self.network.group.parse::<Ipv4Addr>() {
            Ok(addr) if addr.is_multicast() => {}
            _ => {
                warnings.push(format!(
                    "network.group {:?} is not an IPv4 multicast address, using {}",
                    self.network.group, network.group
                ));
                self.network.group = network.group;
            }
        }
        if self.network.ttl == 0 || self.network.ttl > 255 {
            warnings.push(format!(
                "network.ttl {} out of range, using {}",
                self.network.ttl, network.ttl
            ));
            self.network.ttl = network.ttl;
        }
        if self.network.recv_timeout_ms == 0 {
            warnings.push(format!(
                "network.recv_timeout_ms must be positive, using {}",
                network.recv_timeout_ms
            ));
            self.network.recv_timeout_ms = network.recv_timeout_ms;
        }
        if self.timing.sleep_time_ms == 0 {
            warnings.push(format!(
                "timing.sleep_time_ms must be positive, using {}",
                timing.sleep_time_ms
            ));
            self.timing.sleep_time_ms = timing.sleep_time_ms;
        }
        if self.timing.maximum_beacon_period_ms == 0 {
            warnings.push(format!(
                "timing.maximum_beacon_period_ms must be positive, using {}",
                timing.maximum_beacon_period_ms
            ));
            self.timing.maximum_beacon_period_ms = timing.maximum_beacon_period_ms;
        }
        if self.services.search_match.parse::<SearchMatch>().is_err() {
            warnings.push(format!(
                "services.search_match {:?} is not a known mode, using none",
                self.services.search_match
            ));
            self.services.search_match = SearchMatch::None.as_str().to_string();
        }
        warnings
    }

    /// Capability summary advertised in beacons.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            remote_browse: self.services.remote_browse,
            search: self.services.search,
            search_match: self.services.search_match.parse().unwrap_or_default(),
            download: self.services.download,
            upload: self.services.upload,
            delete: self.services.delete,
        }
    }

    pub fn group_addr(&self) -> Ipv4Addr {
        self.network
            .group
            .parse()
            .ok()
            .filter(Ipv4Addr::is_multicast)
            .unwrap_or(Ipv4Addr::new(239, 255, 41, 5))
    }
}

impl NetworkConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl TimingConfig {
    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }

    pub fn maximum_beacon_period(&self) -> Duration {
        Duration::from_millis(self.maximum_beacon_period_ms)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_ttl_ms)
    }
}

impl TransferConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }
}
