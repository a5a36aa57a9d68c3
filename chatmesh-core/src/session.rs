//! Client session: identity, joined channels, background polling, and every user action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::address::PeerAddress;
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::event::{Event, EventReceiver, EventSender, Notification};
use crate::membership::MembershipCache;
use crate::poller::{Poller, PollerHandle, PollerState};
use crate::protocol::{BroadcastRequest, ChatMessage, SendPeerRequest};
use crate::relay::{DeliveryReport, DirectHistory, Envelope, HttpPeerStore, PeerStore, Relay};
use crate::snapshot::SnapshotCache;
use crate::sync::{bootstrap_history, SyncOutcome};
use crate::tracker::{ChannelRoster, Directory, HttpTracker, Tracker};

/// Identity and membership shared between the session and its poller tasks.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub username: Option<String>,
    pub address: Option<PeerAddress>,
    /// Set once the tracker accepted our address; gates the heartbeat.
    pub registered: bool,
    pub membership: MembershipCache,
}

pub(crate) type SharedState = Arc<Mutex<SessionState>>;

/// Result of `join_channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub roster: ChannelRoster,
    /// `None` when the channel was already joined in this session.
    pub sync: Option<SyncOutcome>,
}

/// Result of `discover_peers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub directory: Directory,
    /// Snapshot time when the tracker was down and the cached listing was used.
    pub cached_at: Option<DateTime<Utc>>,
}

impl Discovery {
    pub fn is_stale(&self) -> bool {
        self.cached_at.is_some()
    }
}

/// One row of the channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub name: String,
    pub unread: usize,
    pub members: Vec<PeerAddress>,
    pub focused: bool,
}

pub struct Session {
    config: ClientConfig,
    tracker: Arc<dyn Tracker>,
    relay: Relay,
    state: SharedState,
    events: EventSender,
    snapshots: Option<SnapshotCache>,
    poller: Mutex<Option<PollerHandle>>,
}

impl Session {
    pub fn new(
        config: ClientConfig,
        tracker: Arc<dyn Tracker>,
        store: Arc<dyn PeerStore>,
    ) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let relay = Relay::new(store, config.request_timeout);
        let snapshots = config.snapshot_path.clone().map(SnapshotCache::new);
        let session = Self {
            config,
            tracker,
            relay,
            state: Arc::new(Mutex::new(SessionState::default())),
            events,
            snapshots,
            poller: Mutex::new(None),
        };
        (session, rx)
    }

    /// Session talking HTTP to the configured tracker and to peer nodes.
    pub fn connect(config: ClientConfig) -> Result<(Self, EventReceiver), ChatError> {
        let tracker = Arc::new(HttpTracker::new(config.clone())?);
        let store = Arc::new(HttpPeerStore::new(config.request_timeout)?);
        Ok(Self::new(config, tracker, store))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn username(&self) -> Option<String> {
        self.state.lock().await.username.clone()
    }

    pub async fn address(&self) -> Option<PeerAddress> {
        self.state.lock().await.address.clone()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ChatError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ChatError::Validation(
                "Please enter username and password".into(),
            ));
        }
        self.tracker.login(username, password).await?;
        let mut s = self.state.lock().await;
        if s.username.as_deref() != Some(username) {
            s.registered = false;
        }
        s.username = Some(username.to_string());
        info!(%username, "logged in");
        Ok(())
    }

    /// Announce our node's address to the tracker. Requires a prior login.
    pub async fn register_peer(&self, ip: &str, port: u16) -> Result<PeerAddress, ChatError> {
        if ip.trim().is_empty() || port == 0 {
            return Err(ChatError::Validation("Please enter peer IP and port".into()));
        }
        let address = PeerAddress::new(ip, port)?;
        let username = self.logged_in().await?;
        self.tracker.announce(&username, &address).await?;
        let mut s = self.state.lock().await;
        s.address = Some(address.clone());
        s.registered = true;
        info!(%username, %address, "peer registered");
        Ok(address)
    }

    /// Join `channel` on the tracker. On the first join in this session, bootstrap history
    /// from an existing member and start polling.
    pub async fn join_channel(&self, channel: &str) -> Result<JoinOutcome, ChatError> {
        let channel = valid_channel(channel)?;
        let (username, me) = self.identity().await?;
        let roster = self.tracker.join_channel(&username, channel, &me).await?;
        let known = {
            let mut s = self.state.lock().await;
            let known = s.membership.contains(channel);
            if known {
                s.membership.track(channel, &roster.members);
            }
            known
        };
        info!(%channel, members = roster.member_count, first_join = !known, "joined channel");

        let sync = if known {
            None
        } else {
            // The poller only sees the channel once its cursor is past the replayed history.
            let outcome =
                bootstrap_history(&self.relay, &me, &username, channel, &roster.members).await;
            let cursor = match self.relay.channel_history(&me, channel).await {
                Ok(local) => local.len(),
                Err(e) => {
                    warn!(%channel, error = %e, "could not read local history after join");
                    match &outcome {
                        SyncOutcome::Replayed(n) => *n,
                        _ => 0,
                    }
                }
            };
            let mut s = self.state.lock().await;
            if s.membership.track(channel, &roster.members) {
                s.membership.set_cursor(channel, cursor);
            }
            Some(outcome)
        };

        self.emit(Event::ChannelsChanged);
        self.start_polling().await;
        Ok(JoinOutcome { roster, sync })
    }

    /// Store locally, then relay to every other channel member listed by the tracker right now.
    /// Only a local store failure fails the send; remote failures are in the report.
    pub async fn send_channel_message(
        &self,
        channel: &str,
        body: &str,
    ) -> Result<DeliveryReport, ChatError> {
        let channel = valid_channel(channel)?;
        let body = valid_body(body)?;
        let (username, me) = self.identity().await?;
        if !self.state.lock().await.membership.contains(channel) {
            return Err(ChatError::Validation(format!("join #{channel} first")));
        }

        let directory = self.tracker.list_directory().await?;
        let members = directory.members(channel).to_vec();
        self.state.lock().await.membership.refresh_from(&directory);

        let envelope = Envelope::Broadcast(BroadcastRequest {
            from: me.to_string(),
            username,
            channel: channel.to_string(),
            message: Some(body.to_string()),
            messages: None,
            sync: false,
        });
        let report = self.relay.relay(&me, &envelope, &envelope, &members).await?;
        info!(
            %channel,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "channel message sent"
        );
        Ok(report)
    }

    /// Store locally (tagged with `to`), then deliver to `peer`. An undelivered remote copy
    /// raises a warning event but the send still succeeds.
    pub async fn send_direct_message(
        &self,
        peer: &PeerAddress,
        body: &str,
    ) -> Result<DeliveryReport, ChatError> {
        let body = valid_body(body)?;
        let (username, me) = self.identity().await?;
        if *peer == me {
            return Err(ChatError::Validation("cannot message yourself".into()));
        }

        let outgoing = SendPeerRequest {
            from: me.to_string(),
            username,
            message: body.to_string(),
            to: None,
        };
        let local = Envelope::Direct(SendPeerRequest {
            to: Some(peer.to_string()),
            ..outgoing.clone()
        });
        let remote = Envelope::Direct(outgoing);
        let report = self
            .relay
            .relay(&me, &local, &remote, std::slice::from_ref(peer))
            .await?;
        if !report.is_complete() {
            self.emit(Event::Warning(Notification::new(
                "Warning",
                format!("Message saved locally but failed to deliver to {peer}"),
            )));
        }
        info!(%peer, delivered = report.is_complete(), "direct message sent");
        Ok(report)
    }

    /// Tracker listing, falling back to the last saved snapshot when the tracker is down.
    pub async fn discover_peers(&self) -> Result<Discovery, ChatError> {
        let err = match self.tracker.list_directory().await {
            Ok(directory) => {
                self.state.lock().await.membership.refresh_from(&directory);
                if let Some(cache) = &self.snapshots {
                    if let Err(e) = cache.save(&directory).await {
                        warn!(path = %cache.path().display(), error = %e, "could not save directory snapshot");
                    }
                }
                return Ok(Discovery {
                    directory,
                    cached_at: None,
                });
            }
            Err(e) => e,
        };
        warn!(error = %err, "tracker listing failed");
        let Some(cache) = &self.snapshots else {
            return Err(err);
        };
        match cache.load().await {
            Ok(Some(snapshot)) => {
                self.emit(Event::Warning(Notification::new(
                    "Tracking server is down",
                    "Using cached peer list from last sync.",
                )));
                Ok(Discovery {
                    directory: snapshot.directory,
                    cached_at: Some(snapshot.timestamp),
                })
            }
            Ok(None) => Err(err),
            Err(e) => {
                warn!(path = %cache.path().display(), error = %e, "could not read directory snapshot");
                Err(err)
            }
        }
    }

    /// Focus a joined channel, clear its unread counter and return its history.
    pub async fn select_channel(&self, channel: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let channel = valid_channel(channel)?;
        if !self.state.lock().await.membership.focus(channel) {
            return Err(ChatError::Validation(format!("not a member of #{channel}")));
        }
        self.emit(Event::ChannelsChanged);
        self.load_messages(channel).await
    }

    /// Make `peer` the polled direct conversation (or clear it) and return its history.
    /// The selection is left unchanged when the history cannot be loaded.
    pub async fn select_direct_peer(
        &self,
        peer: Option<PeerAddress>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let Some(peer) = peer else {
            self.state.lock().await.membership.select_direct(None);
            return Ok(Vec::new());
        };
        let history = self.load_direct_messages(&peer).await?;
        self.state.lock().await.membership.select_direct(Some(peer));
        Ok(history.messages)
    }

    /// History of `channel` from our own node.
    pub async fn load_messages(&self, channel: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let (_, me) = self.identity().await?;
        self.relay.channel_history(&me, channel).await
    }

    /// Conversation with `peer` from our own node. Moves the direct cursor so the
    /// loaded messages do not notify.
    pub async fn load_direct_messages(&self, peer: &PeerAddress) -> Result<DirectHistory, ChatError> {
        let (_, me) = self.identity().await?;
        let history = self.relay.direct_history(&me, peer).await?;
        self.state
            .lock()
            .await
            .membership
            .set_direct_cursor(peer, history.count);
        Ok(history)
    }

    pub async fn channels(&self) -> Vec<ChannelSummary> {
        let s = self.state.lock().await;
        let focused = s.membership.focused();
        s.membership
            .iter()
            .map(|(name, ch)| ChannelSummary {
                name: name.clone(),
                unread: ch.unread,
                members: ch.members.clone(),
                focused: name == focused,
            })
            .collect()
    }

    pub async fn focused_channel(&self) -> String {
        self.state.lock().await.membership.focused().to_string()
    }

    pub async fn direct_target(&self) -> Option<PeerAddress> {
        self.state.lock().await.membership.direct_target().cloned()
    }

    /// Poller over this session's state; lets a host drive ticks by hand.
    pub fn poller(&self) -> Poller {
        Poller::new(
            self.relay.clone(),
            self.tracker.clone(),
            self.state.clone(),
            self.events.clone(),
            self.config.poll_interval,
            self.config.heartbeat_interval,
        )
    }

    /// Start the timers if they are not running.
    pub async fn start_polling(&self) {
        let mut slot = self.poller.lock().await;
        if slot.as_ref().is_some_and(PollerHandle::is_running) {
            return;
        }
        *slot = Some(self.poller().spawn());
    }

    pub async fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.stop();
            info!("polling stopped");
        }
    }

    pub async fn poller_state(&self) -> PollerState {
        match self.poller.lock().await.as_ref() {
            Some(h) if h.is_running() => PollerState::Active,
            _ => PollerState::Idle,
        }
    }

    async fn logged_in(&self) -> Result<String, ChatError> {
        self.state
            .lock()
            .await
            .username
            .clone()
            .ok_or_else(|| ChatError::Validation("log in first".into()))
    }

    /// Username and registered address, or a validation error.
    async fn identity(&self) -> Result<(String, PeerAddress), ChatError> {
        let s = self.state.lock().await;
        match (&s.username, &s.address, s.registered) {
            (Some(u), Some(a), true) => Ok((u.clone(), a.clone())),
            (None, _, _) => Err(ChatError::Validation("log in first".into())),
            _ => Err(ChatError::Validation("register your peer first".into())),
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

fn valid_channel(channel: &str) -> Result<&str, ChatError> {
    let channel = channel.trim().trim_start_matches('#');
    if channel.is_empty() {
        return Err(ChatError::Validation("Please enter channel name".into()));
    }
    Ok(channel)
}

fn valid_body(body: &str) -> Result<&str, ChatError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ChatError::Validation("message must not be empty".into()));
    }
    Ok(body)
}
