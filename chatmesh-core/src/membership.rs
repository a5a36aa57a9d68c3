//! Membership cache: joined channels with their members, unread counters and poll cursors.

use std::collections::{BTreeMap, HashMap};

use crate::address::PeerAddress;
use crate::tracker::Directory;

/// Channel focused before the user picks one.
pub const DEFAULT_CHANNEL: &str = "general";

/// Local view of one joined channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// Member addresses in tracker order. Grows only.
    pub members: Vec<PeerAddress>,
    pub unread: usize,
    /// Last observed message count in our own store.
    pub cursor: usize,
}

/// Owned by a single session. Cursors are display state only; resetting them loses nothing.
#[derive(Debug, Clone)]
pub struct MembershipCache {
    channels: BTreeMap<String, ChannelState>,
    focused: String,
    direct_target: Option<PeerAddress>,
    direct_cursors: HashMap<PeerAddress, usize>,
}

impl MembershipCache {
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            focused: DEFAULT_CHANNEL.to_string(),
            direct_target: None,
            direct_cursors: HashMap::new(),
        }
    }

    /// Record a joined channel and merge its members. Returns true on first join.
    pub fn track(&mut self, channel: &str, members: &[PeerAddress]) -> bool {
        let is_new = !self.channels.contains_key(channel);
        let state = self.channels.entry(channel.to_string()).or_default();
        merge(&mut state.members, members);
        is_new
    }

    /// Merge rosters of channels we have joined from a tracker listing.
    pub fn refresh_from(&mut self, directory: &Directory) {
        for (name, state) in self.channels.iter_mut() {
            merge(&mut state.members, directory.members(name));
        }
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channel(&self, channel: &str) -> Option<&ChannelState> {
        self.channels.get(channel)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ChannelState)> {
        self.channels.iter()
    }

    pub fn focused(&self) -> &str {
        &self.focused
    }

    /// Focus a joined channel and clear its unread counter. Returns false if not joined.
    pub fn focus(&mut self, channel: &str) -> bool {
        match self.channels.get_mut(channel) {
            Some(state) => {
                state.unread = 0;
                self.focused = channel.to_string();
                true
            }
            None => false,
        }
    }

    /// Compare `count` against the channel cursor and move the cursor to `count`.
    /// Returns how many messages are new; counts only on strict increase.
    /// New messages on an unfocused channel are added to its unread counter.
    pub fn observe_channel(&mut self, channel: &str, count: usize) -> usize {
        let is_focused = self.focused == channel;
        let Some(state) = self.channels.get_mut(channel) else {
            return 0;
        };
        let added = count.saturating_sub(state.cursor);
        if added > 0 && !is_focused {
            state.unread += added;
        }
        state.cursor = count;
        added
    }

    pub fn set_cursor(&mut self, channel: &str, count: usize) {
        if let Some(state) = self.channels.get_mut(channel) {
            state.cursor = count;
        }
    }

    pub fn direct_target(&self) -> Option<&PeerAddress> {
        self.direct_target.as_ref()
    }

    /// Select the one direct conversation that is polled, or none.
    pub fn select_direct(&mut self, peer: Option<PeerAddress>) {
        self.direct_target = peer;
    }

    /// Same contract as `observe_channel`, for a direct conversation.
    pub fn observe_direct(&mut self, peer: &PeerAddress, count: usize) -> usize {
        let cursor = self.direct_cursors.entry(peer.clone()).or_insert(0);
        let added = count.saturating_sub(*cursor);
        *cursor = count;
        added
    }

    pub fn set_direct_cursor(&mut self, peer: &PeerAddress, count: usize) {
        self.direct_cursors.insert(peer.clone(), count);
    }

    pub fn direct_cursor(&self, peer: &PeerAddress) -> usize {
        self.direct_cursors.get(peer).copied().unwrap_or(0)
    }
}

impl Default for MembershipCache {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(into: &mut Vec<PeerAddress>, members: &[PeerAddress]) {
    for m in members {
        if !into.contains(m) {
            into.push(m.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    #[test]
    fn track_is_idempotent() {
        let mut cache = MembershipCache::new();
        let a = addr("10.0.0.1:7000");
        assert!(cache.track("general", &[a.clone()]));
        assert!(!cache.track("general", &[a.clone(), a.clone()]));
        assert_eq!(cache.channel("general").unwrap().members, vec![a]);
    }

    #[test]
    fn unfocused_channel_accumulates_unread() {
        let mut cache = MembershipCache::new();
        cache.track("general", &[]);
        cache.track("random", &[]);
        assert_eq!(cache.focused(), "general");

        assert_eq!(cache.observe_channel("random", 2), 2);
        assert_eq!(cache.observe_channel("random", 5), 3);
        assert_eq!(cache.channel("random").unwrap().unread, 5);

        assert_eq!(cache.observe_channel("general", 4), 4);
        assert_eq!(cache.channel("general").unwrap().unread, 0);

        assert!(cache.focus("random"));
        assert_eq!(cache.channel("random").unwrap().unread, 0);
        assert!(!cache.focus("nowhere"));
        assert_eq!(cache.focused(), "random");
    }

    #[test]
    fn decreasing_count_resets_baseline_silently() {
        let mut cache = MembershipCache::new();
        cache.track("general", &[]);
        cache.observe_channel("general", 5);
        assert_eq!(cache.observe_channel("general", 1), 0);
        assert_eq!(cache.channel("general").unwrap().cursor, 1);
        assert_eq!(cache.observe_channel("general", 2), 1);
    }

    #[test]
    fn unknown_channel_is_ignored() {
        let mut cache = MembershipCache::new();
        assert_eq!(cache.observe_channel("ghost", 3), 0);
        assert!(!cache.contains("ghost"));
    }

    #[test]
    fn refresh_merges_known_channels_only() {
        let mut cache = MembershipCache::new();
        let a = addr("10.0.0.1:7000");
        let b = addr("10.0.0.2:7001");
        cache.track("general", &[a.clone()]);
        let mut dir = Directory::default();
        dir.channels.insert("general".into(), vec![b.clone(), a.clone()]);
        dir.channels.insert("random".into(), vec![b.clone()]);
        cache.refresh_from(&dir);
        assert_eq!(cache.channel("general").unwrap().members, vec![a, b]);
        assert!(!cache.contains("random"));
    }

    #[test]
    fn direct_cursor_tracks_each_peer() {
        let mut cache = MembershipCache::new();
        let bob = addr("10.0.0.2:7001");
        cache.select_direct(Some(bob.clone()));
        assert_eq!(cache.direct_target(), Some(&bob));
        cache.set_direct_cursor(&bob, 2);
        assert_eq!(cache.observe_direct(&bob, 5), 3);
        assert_eq!(cache.observe_direct(&bob, 5), 0);
        assert_eq!(cache.direct_cursor(&bob), 5);
    }
}
