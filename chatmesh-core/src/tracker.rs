//! Tracker client: login, announce (register/heartbeat), channel join, directory listing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::PeerAddress;
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::protocol::{
    AddListReply, AddListRequest, GetListReply, LoginRequest, PeerEntry, Status, StatusReply,
    SubmitInfoRequest, ADD_LIST_PATH, GET_LIST_PATH, LOGIN_PATH, SUBMIT_INFO_PATH,
};

/// A registered peer as listed by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub username: String,
    pub address: PeerAddress,
}

/// Read-only tracker snapshot: peers and channel rosters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub peers: Vec<Peer>,
    pub channels: BTreeMap<String, Vec<PeerAddress>>,
}

impl Directory {
    /// Members of `channel`, empty if the tracker does not know it.
    pub fn members(&self, channel: &str) -> &[PeerAddress] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Peers other than `me`: the candidates for a direct conversation.
    pub fn others<'a>(&'a self, me: Option<&'a PeerAddress>) -> impl Iterator<Item = &'a Peer> {
        self.peers.iter().filter(move |p| Some(&p.address) != me)
    }
}

/// Result of a channel join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoster {
    pub members: Vec<PeerAddress>,
    pub member_count: usize,
}

/// Directory service operations. Object-safe so sessions hold `Arc<dyn Tracker>`.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<(), ChatError>;

    /// Register or refresh `address` for `username`. Idempotent; also the heartbeat.
    async fn announce(&self, username: &str, address: &PeerAddress) -> Result<(), ChatError>;

    /// Add `address` to `channel` (idempotent) and return the current roster.
    async fn join_channel(
        &self,
        username: &str,
        channel: &str,
        address: &PeerAddress,
    ) -> Result<ChannelRoster, ChatError>;

    async fn list_directory(&self) -> Result<Directory, ChatError>;
}

/// Tracker reached over HTTP with `reqwest`.
pub struct HttpTracker {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTracker {
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ChatError>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let url = self.config.tracker_endpoint(path);
        debug!(%url, "tracker request");
        let resp = self.client.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(ChatError::Network(format!(
                "tracker {path} returned HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Tracker for HttpTracker {
    async fn login(&self, username: &str, password: &str) -> Result<(), ChatError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let reply: StatusReply = self
            .post(LOGIN_PATH, &body)
            .await
            .map_err(|e| ChatError::Auth(format!("tracker unreachable: {e}")))?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(ChatError::Auth(reply.message))
        }
    }

    async fn announce(&self, username: &str, address: &PeerAddress) -> Result<(), ChatError> {
        let body = SubmitInfoRequest {
            username: username.to_string(),
            ip: address.host().to_string(),
            port: address.port(),
        };
        let reply: StatusReply = self.post(SUBMIT_INFO_PATH, &body).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(ChatError::Network(reply.message))
        }
    }

    async fn join_channel(
        &self,
        username: &str,
        channel: &str,
        address: &PeerAddress,
    ) -> Result<ChannelRoster, ChatError> {
        let body = AddListRequest {
            username: username.to_string(),
            channel: channel.to_string(),
            peer_address: address.to_string(),
        };
        let reply: AddListReply = self.post(ADD_LIST_PATH, &body).await?;
        if !reply.is_success() {
            return Err(ChatError::NotFound(reply.message));
        }
        let members = parse_addresses(&reply.members, channel);
        let member_count = reply.member_count.unwrap_or(members.len());
        Ok(ChannelRoster {
            members,
            member_count,
        })
    }

    async fn list_directory(&self) -> Result<Directory, ChatError> {
        let url = self.config.tracker_endpoint(GET_LIST_PATH);
        debug!(%url, "tracker request");
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ChatError::Network(format!(
                "tracker {GET_LIST_PATH} returned HTTP {}",
                resp.status()
            )));
        }
        let reply: GetListReply = resp.json().await?;
        if reply.status != Status::Success {
            return Err(ChatError::Network(reply.message));
        }
        Ok(directory_from_reply(reply))
    }
}

/// Convert a listing, skipping entries whose addresses do not parse.
pub fn directory_from_reply(reply: GetListReply) -> Directory {
    let peers = reply
        .peers
        .into_iter()
        .filter_map(|PeerEntry { username, peer_address }| {
            match peer_address.parse::<PeerAddress>() {
                Ok(address) => Some(Peer { username, address }),
                Err(e) => {
                    warn!(%username, error = %e, "skipping peer with bad address");
                    None
                }
            }
        })
        .collect();
    let channels = reply
        .channels
        .into_iter()
        .map(|(name, entry)| {
            let members = parse_addresses(&entry.members, &name);
            (name, members)
        })
        .collect();
    Directory { peers, channels }
}

fn parse_addresses(raw: &[String], channel: &str) -> Vec<PeerAddress> {
    raw.iter()
        .filter_map(|s| match s.parse::<PeerAddress>() {
            Ok(a) => Some(a),
            Err(e) => {
                warn!(%channel, member = %s, error = %e, "skipping member with bad address");
                None
            }
        })
        .collect()
}
