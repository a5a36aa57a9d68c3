//! Load config from file and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatmesh_core::config::{
    default_snapshot_path, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_POLL_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TRACKER_URL,
};
use chatmesh_core::ClientConfig;
use serde::Deserialize;
use tracing::{debug, warn};

/// Client configuration. File: <config dir>/chatmesh/config.toml or /etc/chatmesh/config.toml.
/// Env overrides: CHATMESH_TRACKER_URL, CHATMESH_POLL_INTERVAL_MS,
/// CHATMESH_HEARTBEAT_INTERVAL_SECS, CHATMESH_REQUEST_TIMEOUT_MS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_tracker_url")]
    pub tracker_url: String,
    /// Message poll period (default 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Tracker heartbeat period (default 30).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Per-request deadline (default 5000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Directory snapshot file; platform cache dir when unset.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_tracker_url() -> String {
    DEFAULT_TRACKER_URL.to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}
fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_url: default_tracker_url(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            snapshot_path: None,
        }
    }
}

impl Config {
    pub fn into_client_config(self) -> ClientConfig {
        ClientConfig {
            tracker_url: self.tracker_url,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            request_timeout: Duration::from_millis(self.request_timeout_ms.max(1)),
            snapshot_path: self.snapshot_path.or_else(default_snapshot_path),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("CHATMESH_TRACKER_URL").filter(|s| !s.trim().is_empty()) {
        c.tracker_url = url.trim().to_string();
    }
    if let Some(ms) = var("CHATMESH_POLL_INTERVAL_MS").and_then(|s| s.parse().ok()) {
        c.poll_interval_ms = ms;
    }
    if let Some(secs) = var("CHATMESH_HEARTBEAT_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
        c.heartbeat_interval_secs = secs;
    }
    if let Some(ms) = var("CHATMESH_REQUEST_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
        c.request_timeout_ms = ms;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        out.push(dir.join("chatmesh").join("config.toml"));
    }
    out.push(PathBuf::from("/etc/chatmesh/config.toml"));
    out
}

/// First existing file wins; a file that fails to parse falls back to defaults.
fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    parse_file(&path)
}

fn parse_file(path: &Path) -> Option<Config> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read config file");
            return None;
        }
    };
    match toml::from_str::<Config>(&text) {
        Ok(c) => {
            debug!(path = %path.display(), "loaded config file");
            Some(c)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let c: Config = toml::from_str("tracker_url = \"http://10.0.0.5:8000\"").unwrap();
        assert_eq!(c.tracker_url, "http://10.0.0.5:8000");
        assert_eq!(c.poll_interval_ms, 2000);
        assert_eq!(c.heartbeat_interval_secs, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("proxy_port = 3128").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("CHATMESH_TRACKER_URL", "http://tracker.lan:9000"),
            ("CHATMESH_POLL_INTERVAL_MS", "500"),
            ("CHATMESH_REQUEST_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        apply_env(&mut c, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.tracker_url, "http://tracker.lan:9000");
        assert_eq!(c.poll_interval_ms, 500);
        assert_eq!(c.request_timeout_ms, 5000);
    }

    #[test]
    fn converts_to_client_config() {
        let c = Config {
            snapshot_path: Some(PathBuf::from("/tmp/dir.json")),
            ..Config::default()
        }
        .into_client_config();
        assert_eq!(c.poll_interval, Duration::from_secs(2));
        assert_eq!(c.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(c.snapshot_path, Some(PathBuf::from("/tmp/dir.json")));
    }

    #[test]
    fn invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_ms = \"fast\"").unwrap();
        assert!(parse_file(&path).is_none());
        std::fs::write(&path, "heartbeat_interval_secs = 10").unwrap();
        assert_eq!(parse_file(&path).unwrap().heartbeat_interval_secs, 10);
    }
}
