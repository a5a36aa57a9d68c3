//! Wire types for the tracker and peer-node HTTP surfaces. JSON bodies, one struct per endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;

pub const LOGIN_PATH: &str = "/login_app";
pub const SUBMIT_INFO_PATH: &str = "/submit-info";
pub const ADD_LIST_PATH: &str = "/add-list";
pub const GET_LIST_PATH: &str = "/get-list";

pub const GET_MESSAGES_PATH: &str = "/get-messages";
pub const BROADCAST_PATH: &str = "/broadcast-peer";
pub const GET_PEER_MESSAGES_PATH: &str = "/get-peer-messages";
pub const SEND_PEER_PATH: &str = "/send-peer";

/// `status` field carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

/// Minimal response: status plus a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: Status,
    #[serde(default)]
    pub message: String,
}

impl StatusReply {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Registration and heartbeat body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitInfoRequest {
    pub username: String,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddListRequest {
    pub username: String,
    pub channel: String,
    pub peer_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddListReply {
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub member_count: Option<usize>,
}

impl AddListReply {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub username: String,
    pub peer_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelEntry {
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetListReply {
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMessagesRequest {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPeerMessagesRequest {
    pub peer_address: String,
}

/// History response for both channel and direct conversations.
/// A missing `messages` list decodes as empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesReply {
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub message_count: Option<usize>,
}

impl MessagesReply {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Channel message relay. Live sends carry `message`; bootstrap replay carries `messages` and `sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub from: String,
    pub username: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sync: bool,
}

/// Direct message relay. `to` is set only on the sender's own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPeerRequest {
    pub from: String,
    pub username: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// One stored message as returned by a peer node. Channel entries may omit `from`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

impl ChatMessage {
    /// True when the message was sent from the node at `addr`.
    pub fn is_from(&self, addr: &PeerAddress) -> bool {
        self.from
            .as_deref()
            .map(|f| f.trim() == addr.to_string())
            .unwrap_or(false)
    }

    /// Store timestamp, if it is ISO-8601 (with or without offset).
    pub fn sent_at(&self) -> Option<NaiveDateTime> {
        let ts = self.timestamp.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
            return Some(dt.naive_local());
        }
        NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}
