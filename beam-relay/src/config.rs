//! Load config from file and environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Daemon configuration. File: ~/.config/peerbeam/config.toml or /etc/peerbeam/config.toml.
/// Env overrides: PEERBEAM_LISTEN_ADDR, PEERBEAM_MAX_ROOMS, PEERBEAM_FRAME_SIZE,
/// PEERBEAM_BACKLOG_CEILING, PEERBEAM_STALL_TIMEOUT.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Relay WebSocket listen address (default 0.0.0.0:8080).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Maximum simultaneously open rooms (default: the whole code space).
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
    /// Direct-channel data frame size in bytes, at most `beam_core::MAX_FRAME_SIZE`.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Bytes queued on the direct channel before the sender pauses.
    #[serde(default = "default_backlog_ceiling")]
    pub backlog_ceiling: u64,
    /// Give up a send after this many seconds without drain progress. 0 disables.
    #[serde(default)]
    pub stall_timeout_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_max_rooms() -> usize {
    beam_core::code::CODE_SPACE
}
fn default_frame_size() -> usize {
    beam_core::DEFAULT_FRAME_SIZE
}
fn default_backlog_ceiling() -> u64 {
    beam_core::DEFAULT_BACKLOG_CEILING
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_rooms: default_max_rooms(),
            frame_size: default_frame_size(),
            backlog_ceiling: default_backlog_ceiling(),
            stall_timeout_secs: 0,
        }
    }
}

impl Config {
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_secs > 0).then(|| Duration::from_secs(self.stall_timeout_secs))
    }
}

/// Load config: merge default, then config file (explicit path or first
/// existing standard path), then env vars.
pub fn load(path: Option<&Path>) -> Config {
    let file = match path {
        Some(p) => load_file(p),
        None => config_paths()
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| load_file(&p)),
    };
    let mut c = file.unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    clamp_limits(&mut c);
    c
}

/// Values that parse but cannot work on the wire are pulled into range.
fn clamp_limits(c: &mut Config) {
    if c.frame_size > beam_core::MAX_FRAME_SIZE {
        warn!(
            event = "config_frame_size_clamped",
            requested = c.frame_size,
            max = beam_core::MAX_FRAME_SIZE,
            "Frame size exceeds the wire limit; clamping"
        );
        c.frame_size = beam_core::MAX_FRAME_SIZE;
    }
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = parsed(&var, "PEERBEAM_LISTEN_ADDR") {
        c.listen_addr = v;
    }
    if let Some(v) = parsed(&var, "PEERBEAM_MAX_ROOMS") {
        c.max_rooms = v;
    }
    if let Some(v) = parsed(&var, "PEERBEAM_FRAME_SIZE") {
        c.frame_size = v;
    }
    if let Some(v) = parsed(&var, "PEERBEAM_BACKLOG_CEILING") {
        c.backlog_ceiling = v;
    }
    if let Some(v) = parsed(&var, "PEERBEAM_STALL_TIMEOUT") {
        c.stall_timeout_secs = v;
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(event = "config_env_invalid", key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/peerbeam/config.toml"));
    }
    out.push(PathBuf::from("/etc/peerbeam/config.toml"));
    out
}

fn load_file(path: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!(event = "config_unreadable", path = %path.display(), error = %e, "Using default config");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(event = "config_invalid", path = %path.display(), error = %e, "Using default config");
            None
        }
    }
}
