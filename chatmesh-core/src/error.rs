//! Error taxonomy for the protocol layer.

use crate::address::PeerAddress;

/// Every fallible operation in the protocol layer returns this error.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Tracker rejected the credentials or could not be reached during login.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Required user input missing or malformed; raised before any network call.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Tracker or peer node unreachable, timed out, or answered with a non-success status.
    #[error("network error: {0}")]
    Network(String),
    /// Tracker refused to resolve the requested channel or peer.
    #[error("not found: {0}")]
    NotFound(String),
    /// Local store accepted the message but some remote stores did not.
    #[error("delivered locally, failed for {} peer(s): {}", .failed.len(), join_addresses(.failed))]
    PartialDelivery { failed: Vec<PeerAddress> },
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Network(format!("request timed out: {e}"))
        } else if e.is_decode() {
            ChatError::Network(format!("malformed response: {e}"))
        } else {
            ChatError::Network(e.to_string())
        }
    }
}

fn join_addresses(addrs: &[PeerAddress]) -> String {
    addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_delivery_lists_failed_peers() {
        let err = ChatError::PartialDelivery {
            failed: vec![
                "10.0.0.2:7001".parse().unwrap(),
                "10.0.0.3:7002".parse().unwrap(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "delivered locally, failed for 2 peer(s): 10.0.0.2:7001, 10.0.0.3:7002"
        );
    }
}
