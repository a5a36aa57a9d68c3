//! chatmesh protocol layer: tracker client, peer relay, history sync and polling.
//! Host-driven: the host owns the runtime, calls session operations and renders events.

pub mod address;
pub mod config;
pub mod error;
pub mod event;
pub mod membership;
pub mod poller;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use address::PeerAddress;
pub use config::ClientConfig;
pub use error::ChatError;
pub use event::{Event, EventReceiver, Notification};
pub use poller::{Poller, PollerState};
pub use protocol::ChatMessage;
pub use relay::{DeliveryReport, HttpPeerStore, PeerStore, Relay};
pub use session::{ChannelSummary, Discovery, JoinOutcome, Session};
pub use sync::SyncOutcome;
pub use tracker::{Directory, HttpTracker, Peer, Tracker};
