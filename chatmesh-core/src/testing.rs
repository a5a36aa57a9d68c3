//! In-memory tracker and peer-node fakes for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::address::PeerAddress;
use crate::error::ChatError;
use crate::protocol::ChatMessage;
use crate::relay::{DirectHistory, Envelope, PeerStore};
use crate::tracker::{ChannelRoster, Directory, Peer, Tracker};

#[derive(Default)]
struct NodeState {
    channels: HashMap<String, Vec<ChatMessage>>,
    direct: HashMap<String, Vec<ChatMessage>>,
    sync_imports: usize,
}

#[derive(Default)]
struct StoreInner {
    nodes: HashMap<PeerAddress, NodeState>,
    unreachable: HashSet<PeerAddress>,
    hanging: HashSet<PeerAddress>,
    log: Vec<PeerAddress>,
    clock: u32,
}

/// Every peer node in one map, keyed by address. Stores the way a real node does:
/// live broadcasts append one entry, sync broadcasts append the whole batch,
/// direct messages are filed under `to` or else `from`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, node: &PeerAddress) {
        self.inner.lock().unwrap().unreachable.insert(node.clone());
    }

    pub fn set_reachable(&self, node: &PeerAddress) {
        let mut inner = self.inner.lock().unwrap();
        inner.unreachable.remove(node);
        inner.hanging.remove(node);
    }

    /// Requests to `node` never complete.
    pub fn set_hanging(&self, node: &PeerAddress) {
        self.inner.lock().unwrap().hanging.insert(node.clone());
    }

    pub fn seed_channel(&self, node: &PeerAddress, channel: &str, messages: Vec<ChatMessage>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .nodes
            .entry(node.clone())
            .or_default()
            .channels
            .entry(channel.to_string())
            .or_default()
            .extend(messages);
    }

    pub fn channel_messages(&self, node: &PeerAddress, channel: &str) -> Vec<ChatMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(node)
            .and_then(|n| n.channels.get(channel))
            .cloned()
            .unwrap_or_default()
    }

    pub fn channel_count(&self, node: &PeerAddress, channel: &str) -> usize {
        self.channel_messages(node, channel).len()
    }

    pub fn direct_messages(&self, node: &PeerAddress, peer: &PeerAddress) -> Vec<ChatMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(node)
            .and_then(|n| n.direct.get(&peer.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of sync (bootstrap) batches `node` accepted.
    pub fn sync_imports(&self, node: &PeerAddress) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.nodes.get(node).map(|n| n.sync_imports).unwrap_or(0)
    }

    /// Nodes that accepted a delivery, in order.
    pub fn delivery_log(&self) -> Vec<PeerAddress> {
        self.inner.lock().unwrap().log.clone()
    }

    async fn reach(&self, node: &PeerAddress) -> Result<(), ChatError> {
        let (down, hang) = {
            let inner = self.inner.lock().unwrap();
            (inner.unreachable.contains(node), inner.hanging.contains(node))
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if down {
            return Err(ChatError::Network(format!("connection refused: {node}")));
        }
        Ok(())
    }
}

pub fn msg(from: Option<&str>, username: &str, body: &str) -> ChatMessage {
    ChatMessage {
        from: from.map(str::to_string),
        username: username.to_string(),
        message: body.to_string(),
        timestamp: "2025-11-05T10:30:00".to_string(),
    }
}

#[async_trait]
impl PeerStore for MemoryStore {
    async fn deliver(&self, node: &PeerAddress, envelope: &Envelope) -> Result<(), ChatError> {
        self.reach(node).await?;
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let timestamp = format!("2025-11-05T10:{:02}:{:02}", inner.clock / 60, inner.clock % 60);
        let state = inner.nodes.entry(node.clone()).or_default();
        match envelope {
            Envelope::Broadcast(req) if req.sync => {
                let batch = req.messages.clone().unwrap_or_default();
                state
                    .channels
                    .entry(req.channel.clone())
                    .or_default()
                    .extend(batch);
                state.sync_imports += 1;
            }
            Envelope::Broadcast(req) => {
                let body = req.message.clone().unwrap_or_default();
                if req.channel.is_empty() || body.is_empty() {
                    return Err(ChatError::Network("missing channel or message".into()));
                }
                state
                    .channels
                    .entry(req.channel.clone())
                    .or_default()
                    .push(ChatMessage {
                        from: Some(req.from.clone()),
                        username: req.username.clone(),
                        message: body,
                        timestamp,
                    });
            }
            Envelope::Direct(req) => {
                let key = req.to.clone().unwrap_or_else(|| req.from.clone());
                state.direct.entry(key).or_default().push(ChatMessage {
                    from: Some(req.from.clone()),
                    username: req.username.clone(),
                    message: req.message.clone(),
                    timestamp,
                });
            }
        }
        inner.log.push(node.clone());
        Ok(())
    }

    async fn channel_history(
        &self,
        node: &PeerAddress,
        channel: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.reach(node).await?;
        Ok(self.channel_messages(node, channel))
    }

    async fn direct_history(
        &self,
        node: &PeerAddress,
        peer: &PeerAddress,
    ) -> Result<DirectHistory, ChatError> {
        self.reach(node).await?;
        let messages = self.direct_messages(node, peer);
        Ok(DirectHistory {
            count: messages.len(),
            messages,
        })
    }
}

#[derive(Default)]
struct TrackerInner {
    users: HashMap<String, String>,
    peers: BTreeMap<PeerAddress, String>,
    channels: BTreeMap<String, Vec<PeerAddress>>,
    announces: usize,
    down: bool,
}

/// Tracker with accounts `alice`, `bob` and `carol`, all with password `pw`.
pub struct FakeTracker {
    inner: Mutex<TrackerInner>,
}

impl FakeTracker {
    pub fn new() -> Self {
        let mut inner = TrackerInner::default();
        for u in ["alice", "bob", "carol"] {
            inner.users.insert(u.to_string(), "pw".to_string());
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.inner.lock().unwrap().down = down;
    }

    pub fn announce_count(&self) -> usize {
        self.inner.lock().unwrap().announces
    }

    /// Register `address` and add it to `channel` directly, as another client would.
    pub fn add_member(&self, username: &str, channel: &str, address: &PeerAddress) {
        let mut inner = self.inner.lock().unwrap();
        inner.peers.insert(address.clone(), username.to_string());
        let members = inner.channels.entry(channel.to_string()).or_default();
        if !members.contains(address) {
            members.push(address.clone());
        }
    }

    pub fn members(&self, channel: &str) -> Vec<PeerAddress> {
        let inner = self.inner.lock().unwrap();
        inner.channels.get(channel).cloned().unwrap_or_default()
    }

    fn check_up(&self) -> Result<(), ChatError> {
        if self.inner.lock().unwrap().down {
            Err(ChatError::Network("tracker unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn login(&self, username: &str, password: &str) -> Result<(), ChatError> {
        self.check_up()
            .map_err(|e| ChatError::Auth(format!("tracker unreachable: {e}")))?;
        let inner = self.inner.lock().unwrap();
        match inner.users.get(username) {
            Some(p) if p == password => Ok(()),
            _ => Err(ChatError::Auth("Invalid username or password".into())),
        }
    }

    async fn announce(&self, username: &str, address: &PeerAddress) -> Result<(), ChatError> {
        self.check_up()?;
        let mut inner = self.inner.lock().unwrap();
        inner.peers.insert(address.clone(), username.to_string());
        inner.announces += 1;
        Ok(())
    }

    async fn join_channel(
        &self,
        _username: &str,
        channel: &str,
        address: &PeerAddress,
    ) -> Result<ChannelRoster, ChatError> {
        self.check_up()?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.peers.contains_key(address) {
            return Err(ChatError::NotFound(
                "Peer not registered. Call /submit-info first.".into(),
            ));
        }
        let members = inner.channels.entry(channel.to_string()).or_default();
        if !members.contains(address) {
            members.push(address.clone());
        }
        Ok(ChannelRoster {
            member_count: members.len(),
            members: members.clone(),
        })
    }

    async fn list_directory(&self) -> Result<Directory, ChatError> {
        self.check_up()?;
        let inner = self.inner.lock().unwrap();
        Ok(Directory {
            peers: inner
                .peers
                .iter()
                .map(|(address, username)| Peer {
                    username: username.clone(),
                    address: address.clone(),
                })
                .collect(),
            channels: inner.channels.clone(),
        })
    }
}
