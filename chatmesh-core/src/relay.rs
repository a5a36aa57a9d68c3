//! Peer relay: deliver envelopes to peer-node stores and read their histories.
//! Channel sends and direct sends share one fan-out path over a target address set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::address::PeerAddress;
use crate::error::ChatError;
use crate::protocol::{
    BroadcastRequest, ChatMessage, GetMessagesRequest, GetPeerMessagesRequest, MessagesReply,
    SendPeerRequest, StatusReply, BROADCAST_PATH, GET_MESSAGES_PATH, GET_PEER_MESSAGES_PATH,
    SEND_PEER_PATH,
};

/// Payload handed to a peer node.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Channel message (live send or bootstrap replay).
    Broadcast(BroadcastRequest),
    /// Direct message.
    Direct(SendPeerRequest),
}

impl Envelope {
    pub fn path(&self) -> &'static str {
        match self {
            Envelope::Broadcast(_) => BROADCAST_PATH,
            Envelope::Direct(_) => SEND_PEER_PATH,
        }
    }
}

/// Direct conversation as stored on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectHistory {
    pub messages: Vec<ChatMessage>,
    /// `message_count` reported by the node, or the list length.
    pub count: usize,
}

/// Peer-node message store operations. Object-safe so sessions hold `Arc<dyn PeerStore>`.
#[async_trait]
pub trait PeerStore: Send + Sync {
    async fn deliver(&self, node: &PeerAddress, envelope: &Envelope) -> Result<(), ChatError>;

    async fn channel_history(
        &self,
        node: &PeerAddress,
        channel: &str,
    ) -> Result<Vec<ChatMessage>, ChatError>;

    /// Messages exchanged with `peer` as kept by `node`.
    async fn direct_history(
        &self,
        node: &PeerAddress,
        peer: &PeerAddress,
    ) -> Result<DirectHistory, ChatError>;
}

/// Peer nodes reached over HTTP with `reqwest`.
pub struct HttpPeerStore {
    client: reqwest::Client,
}

impl HttpPeerStore {
    pub fn new(request_timeout: Duration) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    async fn post<B, R>(&self, node: &PeerAddress, path: &str, body: &B) -> Result<R, ChatError>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let url = node.url(path);
        let resp = self.client.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(ChatError::Network(format!(
                "{node}{path} returned HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl PeerStore for HttpPeerStore {
    async fn deliver(&self, node: &PeerAddress, envelope: &Envelope) -> Result<(), ChatError> {
        let reply: StatusReply = match envelope {
            Envelope::Broadcast(req) => self.post(node, envelope.path(), req).await?,
            Envelope::Direct(req) => self.post(node, envelope.path(), req).await?,
        };
        if reply.is_success() {
            Ok(())
        } else {
            Err(ChatError::Network(format!("{node} rejected message: {}", reply.message)))
        }
    }

    async fn channel_history(
        &self,
        node: &PeerAddress,
        channel: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let body = GetMessagesRequest {
            channel: channel.to_string(),
        };
        let reply: MessagesReply = self.post(node, GET_MESSAGES_PATH, &body).await?;
        if !reply.is_success() {
            return Err(ChatError::Network(format!(
                "{node} refused history for #{channel}: {}",
                reply.message
            )));
        }
        Ok(reply.messages)
    }

    async fn direct_history(
        &self,
        node: &PeerAddress,
        peer: &PeerAddress,
    ) -> Result<DirectHistory, ChatError> {
        let body = GetPeerMessagesRequest {
            peer_address: peer.to_string(),
        };
        let reply: MessagesReply = self.post(node, GET_PEER_MESSAGES_PATH, &body).await?;
        if !reply.is_success() {
            return Err(ChatError::Network(format!(
                "{node} refused history with {peer}: {}",
                reply.message
            )));
        }
        let count = reply.message_count.unwrap_or(reply.messages.len());
        Ok(DirectHistory {
            messages: reply.messages,
            count,
        })
    }
}

/// Outcome of a fan-out. Remote failures never fail the send; callers may escalate with `into_result`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<PeerAddress>,
    pub failed: Vec<PeerAddress>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `PartialDelivery` if any remote target missed the message.
    pub fn into_result(self) -> Result<Vec<PeerAddress>, ChatError> {
        if self.failed.is_empty() {
            Ok(self.delivered)
        } else {
            Err(ChatError::PartialDelivery {
                failed: self.failed,
            })
        }
    }
}

/// Delivery primitive with a per-request deadline.
#[derive(Clone)]
pub struct Relay {
    store: Arc<dyn PeerStore>,
    deadline: Duration,
}

impl Relay {
    pub fn new(store: Arc<dyn PeerStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Write to our own node first, then fan out to every other target.
    /// Fails only if the local write fails.
    pub async fn relay(
        &self,
        me: &PeerAddress,
        local: &Envelope,
        remote: &Envelope,
        targets: &[PeerAddress],
    ) -> Result<DeliveryReport, ChatError> {
        self.deliver(me, local).await?;
        let others: Vec<PeerAddress> = targets.iter().filter(|t| *t != me).cloned().collect();
        Ok(self.fan_out(&others, remote).await)
    }

    /// Deliver `envelope` to all `targets` concurrently. One failure never affects its siblings.
    pub async fn fan_out(&self, targets: &[PeerAddress], envelope: &Envelope) -> DeliveryReport {
        let sends = targets.iter().map(|target| async move {
            let result = self.deliver(target, envelope).await;
            (target, result)
        });
        let mut report = DeliveryReport::default();
        for (target, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    debug!(peer = %target, path = envelope.path(), "delivered");
                    report.delivered.push(target.clone());
                }
                Err(e) => {
                    warn!(peer = %target, path = envelope.path(), error = %e, "delivery failed");
                    report.failed.push(target.clone());
                }
            }
        }
        report
    }

    /// Deliver to a single node within the deadline.
    pub async fn deliver(&self, target: &PeerAddress, envelope: &Envelope) -> Result<(), ChatError> {
        match tokio::time::timeout(self.deadline, self.store.deliver(target, envelope)).await {
            Ok(r) => r,
            Err(_) => Err(ChatError::Network(format!(
                "delivery to {target} timed out after {:?}",
                self.deadline
            ))),
        }
    }

    pub async fn channel_history(
        &self,
        node: &PeerAddress,
        channel: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.bounded(node, self.store.channel_history(node, channel)).await
    }

    pub async fn direct_history(
        &self,
        node: &PeerAddress,
        peer: &PeerAddress,
    ) -> Result<DirectHistory, ChatError> {
        self.bounded(node, self.store.direct_history(node, peer)).await
    }

    async fn bounded<T>(
        &self,
        node: &PeerAddress,
        fut: impl std::future::Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        tokio::time::timeout(self.deadline, fut)
            .await
            .unwrap_or_else(|_| {
                Err(ChatError::Network(format!(
                    "request to {node} timed out after {:?}",
                    self.deadline
                )))
            })
    }
}
