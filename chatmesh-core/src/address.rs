//! Peer node addresses: `"ip:port"` strings as exchanged with the tracker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Network address of a peer's local node. Serialized as `"host:port"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ChatError> {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(ChatError::Validation("peer host must not be empty".into()));
        }
        if port == 0 {
            return Err(ChatError::Validation("peer port must be non-zero".into()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint URL on this node, e.g. `url("/get-messages")`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = ChatError;

    /// Split on the single colon. No IPv6 bracket handling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ChatError::Validation(format!("address {s:?} is not ip:port")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ChatError::Validation(format!("address {s:?} has an invalid port")))?;
        Self::new(host, port)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = ChatError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(a: PeerAddress) -> Self {
        a.to_string()
    }
}
