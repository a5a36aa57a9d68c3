//! Events raised for the presentation layer.

use tokio::sync::mpsc;

use crate::address::PeerAddress;
use crate::protocol::ChatMessage;

/// Longest message preview shown in a notification, in characters.
pub const PREVIEW_CHARS: usize = 50;
pub const ELLIPSIS: &str = "...";

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn channel_message(channel: &str, msg: &ChatMessage) -> Self {
        Self::new(
            format!("New message in #{channel}"),
            format!("{}: {}", msg.username, preview(&msg.message)),
        )
    }

    pub fn direct_message(msg: &ChatMessage) -> Self {
        Self::new(
            "New Direct Message",
            format!("{}: {}", msg.username, preview(&msg.message)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A message from someone else arrived.
    Notify(Notification),
    /// Something degraded but the action went through (stale directory, undelivered DM).
    Warning(Notification),
    /// Channel list or unread counters changed.
    ChannelsChanged,
    /// Full history of the focused channel after new arrivals.
    ChannelMessages {
        channel: String,
        messages: Vec<ChatMessage>,
    },
    /// Full history of the selected direct conversation after new arrivals.
    DirectMessages {
        peer: PeerAddress,
        messages: Vec<ChatMessage>,
    },
}

/// Truncate `body` to `PREVIEW_CHARS` characters, appending an ellipsis when cut.
pub fn preview(body: &str) -> String {
    match body.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{}", &body[..cut], ELLIPSIS),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_body_is_cut_at_fifty_chars() {
        let body = "x".repeat(80);
        let p = preview(&body);
        assert_eq!(p, format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn short_body_is_unchanged() {
        let body = "y".repeat(40);
        assert_eq!(preview(&body), body);
        let exact = "z".repeat(50);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let body = "é".repeat(60);
        let p = preview(&body);
        assert_eq!(p.chars().count(), 50 + ELLIPSIS.len());
        assert!(p.starts_with(&"é".repeat(50)));
    }

    #[test]
    fn notification_shows_sender_and_preview() {
        let msg = ChatMessage {
            username: "bob".into(),
            message: "hello there".into(),
            ..Default::default()
        };
        let n = Notification::channel_message("general", &msg);
        assert_eq!(n.title, "New message in #general");
        assert_eq!(n.body, "bob: hello there");
        assert_eq!(Notification::direct_message(&msg).title, "New Direct Message");
    }
}
