//! Console configuration
//!
//! A single serde struct with sensible defaults, optional TOML file loading
//! and `BITCHAT_*` environment overrides. Timeouts live here so tests can
//! shrink them instead of waiting out production values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ConsoleError, Result};
use crate::types::Role;

/// Adapter whose hardware address serves as the fallback local identity
const DEFAULT_ADAPTER: &str = "hci0";

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("bitchat-console")
}

fn default_daemon_bin() -> String {
    "bitchatd".to_string()
}

fn default_central_socket() -> PathBuf {
    default_cache_dir().join("central.sock")
}

fn default_peripheral_socket() -> PathBuf {
    default_cache_dir().join("peripheral.sock")
}

fn default_log_dir() -> PathBuf {
    default_cache_dir().join("logs")
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_peer_poll_ms() -> u64 {
    10_000
}

fn default_stage_wait_ms() -> u64 {
    1_500
}

fn default_socket_wait_ms() -> u64 {
    3_000
}

fn default_socket_poll_ms() -> u64 {
    50
}

fn default_control_timeout_ms() -> u64 {
    5_000
}

// ----------------------------------------------------------------------------
// Config
// ----------------------------------------------------------------------------

/// Everything the console needs to launch and supervise the daemons
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Local identity override; falls back to the adapter address, then
    /// the hostname
    pub user_id: Option<String>,
    /// Daemon binary name, resolved via `bin_dir` then PATH
    pub daemon_bin: String,
    /// Directory searched before PATH for the daemon binary
    pub bin_dir: Option<PathBuf>,
    /// Default control socket for the central daemon; a daemon announcement
    /// overrides it at runtime
    pub central_socket: PathBuf,
    /// Default control socket for the peripheral daemon
    pub peripheral_socket: PathBuf,
    /// Directory receiving the per-role log mirror files
    pub log_dir: PathBuf,
    /// Log level handed to the daemons via `BITCHAT_LOG_LEVEL`
    pub log_level: String,
    /// A local pre-shared key is configured (presence of `BITCHAT_PSK`)
    pub psk_configured: bool,
    /// Interval of the background peer poll
    pub peer_poll_ms: u64,
    /// Wait after the graceful quit before escalating
    pub quit_wait_ms: u64,
    /// Wait after the terminate signal before the hard kill
    pub term_wait_ms: u64,
    /// Total wait for a control socket to start listening
    pub socket_wait_ms: u64,
    /// Poll interval while waiting for a control socket
    pub socket_poll_ms: u64,
    /// Bound on one control round trip
    pub control_timeout_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            daemon_bin: default_daemon_bin(),
            bin_dir: None,
            central_socket: default_central_socket(),
            peripheral_socket: default_peripheral_socket(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            psk_configured: false,
            peer_poll_ms: default_peer_poll_ms(),
            quit_wait_ms: default_stage_wait_ms(),
            term_wait_ms: default_stage_wait_ms(),
            socket_wait_ms: default_socket_wait_ms(),
            socket_poll_ms: default_socket_poll_ms(),
            control_timeout_ms: default_control_timeout_ms(),
        }
    }
}

impl ConsoleConfig {
    /// Load from a TOML file; missing keys fall back to defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ConsoleError::config_error(format!("invalid config file: {}", e)))
    }

    /// Defaults plus process-environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `BITCHAT_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.apply_env_from(&vars);
    }

    /// Apply `BITCHAT_*` overrides from an explicit map
    pub fn apply_env_from(&mut self, vars: &HashMap<String, String>) {
        if let Some(id) = vars.get("BITCHAT_USER_ID") {
            if !id.is_empty() {
                self.user_id = Some(id.clone());
            }
        }
        if vars.get("BITCHAT_PSK").is_some_and(|v| !v.is_empty()) {
            self.psk_configured = true;
        }
        if let Some(dir) = vars.get("BITCHAT_BIN_DIR") {
            if !dir.is_empty() {
                self.bin_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(dir) = vars.get("BITCHAT_LOG_PATH") {
            if !dir.is_empty() {
                self.log_dir = PathBuf::from(dir);
            }
        }
        if let Some(level) = vars.get("BITCHAT_LOG_LEVEL") {
            if !level.is_empty() {
                self.log_level = level.clone();
            }
        }
    }

    /// Default control socket for `role`
    pub fn socket_for(&self, role: Role) -> &Path {
        match role {
            Role::Central => &self.central_socket,
            Role::Peripheral => &self.peripheral_socket,
        }
    }

    /// Path of the log mirror file for `role`
    pub fn mirror_path(&self, role: Role) -> PathBuf {
        self.log_dir.join(format!("{}.log", role.as_str()))
    }

    /// Daemon binary path: `bin_dir` when it holds the binary, else the
    /// bare name for PATH lookup
    pub fn resolve_daemon_bin(&self) -> PathBuf {
        if let Some(dir) = &self.bin_dir {
            let candidate = dir.join(&self.daemon_bin);
            if candidate.exists() {
                return candidate;
            }
        }
        PathBuf::from(&self.daemon_bin)
    }

    /// Local identity: configured override, else the adapter hardware
    /// address from sysfs, else the hostname
    pub fn local_id(&self) -> String {
        if let Some(id) = &self.user_id {
            return id.clone();
        }
        let sysfs = format!("/sys/class/bluetooth/{}/address", DEFAULT_ADAPTER);
        if let Ok(address) = std::fs::read_to_string(sysfs) {
            let address = address.trim();
            if !address.is_empty() {
                return address.to_string();
            }
        }
        std::fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|h| h.trim().to_string())
            .unwrap_or_else(|_| "local".to_string())
    }

    // Duration accessors

    pub fn peer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.peer_poll_ms)
    }

    pub fn quit_wait(&self) -> Duration {
        Duration::from_millis(self.quit_wait_ms)
    }

    pub fn term_wait(&self) -> Duration {
        Duration::from_millis(self.term_wait_ms)
    }

    pub fn socket_wait(&self) -> Duration {
        Duration::from_millis(self.socket_wait_ms)
    }

    pub fn socket_poll(&self) -> Duration {
        Duration::from_millis(self.socket_poll_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
