//! History bootstrap on channel join: pull from an existing member, replay into our own store.

use tracing::{info, warn};

use crate::address::PeerAddress;
use crate::protocol::BroadcastRequest;
use crate::relay::{Envelope, Relay};

/// What happened to the joining peer's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// History fetched from the source and replayed locally (may be zero messages).
    Replayed(usize),
    /// Source peer did not answer; local history stays empty until live messages arrive.
    SourceUnreachable(PeerAddress),
    /// History fetched but our own node refused the replay.
    ReplayFailed(PeerAddress),
    /// No member other than ourselves.
    NoSource,
}

/// First listed member other than `me`. Deterministic.
pub fn history_source<'a>(me: &PeerAddress, members: &'a [PeerAddress]) -> Option<&'a PeerAddress> {
    members.iter().find(|m| *m != me)
}

/// Fetch `channel` history from the first other member and replay it into `me`'s store as a
/// single `sync` broadcast. Never fails the join; no retry.
pub async fn bootstrap_history(
    relay: &Relay,
    me: &PeerAddress,
    username: &str,
    channel: &str,
    members: &[PeerAddress],
) -> SyncOutcome {
    let Some(source) = history_source(me, members) else {
        return SyncOutcome::NoSource;
    };
    let history = match relay.channel_history(source, channel).await {
        Ok(h) => h,
        Err(e) => {
            warn!(%channel, peer = %source, error = %e, "could not fetch channel history");
            return SyncOutcome::SourceUnreachable(source.clone());
        }
    };
    let count = history.len();
    info!(%channel, peer = %source, count, "fetched channel history");
    if count == 0 {
        return SyncOutcome::Replayed(0);
    }
    let replay = Envelope::Broadcast(BroadcastRequest {
        from: me.to_string(),
        username: username.to_string(),
        channel: channel.to_string(),
        message: None,
        messages: Some(history),
        sync: true,
    });
    match relay.deliver(me, &replay).await {
        Ok(()) => SyncOutcome::Replayed(count),
        Err(e) => {
            warn!(%channel, error = %e, "local history replay failed");
            SyncOutcome::ReplayFailed(source.clone())
        }
    }
}
