//! Background polling: channel and direct-message history every poll interval,
//! tracker heartbeat every heartbeat interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::PeerAddress;
use crate::error::ChatError;
use crate::event::{Event, EventSender, Notification};
use crate::relay::Relay;
use crate::session::SharedState;
use crate::tracker::Tracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Active,
}

/// One polling pass over shared session state. Cheap to clone; the spawned
/// tasks each hold a clone.
#[derive(Clone)]
pub struct Poller {
    relay: Relay,
    tracker: Arc<dyn Tracker>,
    state: SharedState,
    events: EventSender,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl Poller {
    pub(crate) fn new(
        relay: Relay,
        tracker: Arc<dyn Tracker>,
        state: SharedState,
        events: EventSender,
        poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            relay,
            tracker,
            state,
            events,
            poll_interval,
            heartbeat_interval,
        }
    }

    /// One message tick: every joined channel, then the selected direct conversation.
    /// Returns the number of notifications raised. Per-channel failures are logged and skipped.
    pub async fn poll_messages(&self) -> usize {
        let (me, username, channels, direct) = {
            let s = self.state.lock().await;
            (
                s.address.clone(),
                s.username.clone().unwrap_or_default(),
                s.membership.channel_names(),
                s.membership.direct_target().cloned(),
            )
        };
        let Some(me) = me else {
            return 0;
        };

        let mut raised = 0;
        for channel in channels {
            match self.poll_channel(&me, &username, &channel).await {
                Ok(n) => raised += n,
                Err(e) => warn!(%channel, error = %e, "channel poll failed"),
            }
        }
        if let Some(peer) = direct {
            match self.poll_direct(&me, &peer).await {
                Ok(n) => raised += n,
                Err(e) => warn!(%peer, error = %e, "direct message poll failed"),
            }
        }
        raised
    }

    async fn poll_channel(
        &self,
        me: &PeerAddress,
        username: &str,
        channel: &str,
    ) -> Result<usize, ChatError> {
        let messages = self.relay.channel_history(me, channel).await?;
        let (added, focused) = {
            let mut s = self.state.lock().await;
            let focused = s.membership.focused() == channel;
            (s.membership.observe_channel(channel, messages.len()), focused)
        };
        if added == 0 {
            return Ok(0);
        }
        debug!(%channel, added, "new channel messages");

        let mut raised = 0;
        if let Some(latest) = messages.last() {
            if latest.username != username && !latest.is_from(me) {
                self.emit(Event::Notify(Notification::channel_message(channel, latest)));
                raised = 1;
            }
        }
        if focused {
            self.emit(Event::ChannelMessages {
                channel: channel.to_string(),
                messages,
            });
        } else {
            self.emit(Event::ChannelsChanged);
        }
        Ok(raised)
    }

    async fn poll_direct(&self, me: &PeerAddress, peer: &PeerAddress) -> Result<usize, ChatError> {
        let history = self.relay.direct_history(me, peer).await?;
        let added = {
            let mut s = self.state.lock().await;
            // Selection may have moved while the request was in flight.
            if s.membership.direct_target() != Some(peer) {
                return Ok(0);
            }
            s.membership.observe_direct(peer, history.count)
        };
        if added == 0 {
            return Ok(0);
        }

        let mut raised = 0;
        if let Some(latest) = history.messages.last() {
            if latest.is_from(peer) {
                self.emit(Event::Notify(Notification::direct_message(latest)));
                raised = 1;
            }
        }
        self.emit(Event::DirectMessages {
            peer: peer.clone(),
            messages: history.messages,
        });
        Ok(raised)
    }

    /// Re-announce to the tracker. Only while registered; failures are logged, never fatal.
    pub async fn heartbeat(&self) -> bool {
        let (username, address) = {
            let s = self.state.lock().await;
            match (&s.username, &s.address, s.registered) {
                (Some(u), Some(a), true) => (u.clone(), a.clone()),
                _ => return false,
            }
        };
        match self.tracker.announce(&username, &address).await {
            Ok(()) => {
                debug!(%address, "heartbeat sent");
                true
            }
            Err(e) => {
                warn!(%address, error = %e, "heartbeat failed");
                false
            }
        }
    }

    /// Start both timers. Ticks never overlap within a timer: each loop awaits its pass.
    pub fn spawn(self) -> PollerHandle {
        let messages = self.clone();
        let message_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(messages.poll_interval).await;
                messages.poll_messages().await;
            }
        });
        let beats = self.clone();
        let heartbeat_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(beats.heartbeat_interval).await;
                beats.heartbeat().await;
            }
        });
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            heartbeat_secs = self.heartbeat_interval.as_secs(),
            "polling started"
        );
        PollerHandle {
            message_task,
            heartbeat_task,
        }
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// Owns the timer tasks. Dropping the handle stops them.
pub struct PollerHandle {
    message_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.message_task.abort();
        self.heartbeat_task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.message_task.is_finished() || !self.heartbeat_task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
