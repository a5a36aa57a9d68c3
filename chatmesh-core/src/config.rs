//! Client configuration owned by a session.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TRACKER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Deadline for every outbound tracker or peer-node request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the tracker, e.g. `http://127.0.0.1:8000`.
    pub tracker_url: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    /// Where the last good directory listing is cached. `None` disables the cache.
    pub snapshot_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Tracker endpoint URL for `path`, tolerating a trailing slash on the base.
    pub fn tracker_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.tracker_url.trim_end_matches('/'), path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tracker_url: DEFAULT_TRACKER_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// `<cache dir>/chatmesh/directory.json`, if the platform has a cache dir.
pub fn default_snapshot_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("chatmesh").join("directory.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_endpoint_joins_paths() {
        let mut c = ClientConfig::default();
        assert_eq!(c.tracker_endpoint("/get-list"), "http://127.0.0.1:8000/get-list");
        c.tracker_url = "http://tracker.lan:8000/".into();
        assert_eq!(c.tracker_endpoint("/add-list"), "http://tracker.lan:8000/add-list");
    }

    #[test]
    fn defaults_match_protocol_timers() {
        let c = ClientConfig::default();
        assert_eq!(c.poll_interval, Duration::from_secs(2));
        assert_eq!(c.heartbeat_interval, Duration::from_secs(30));
        assert!(c.request_timeout < c.poll_interval * 5);
    }
}
