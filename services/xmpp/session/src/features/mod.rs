//! Feature handlers fed by the dispatch chain.
//!
//! Each handler recognizes one kind of stanza and reports what it saw as a
//! [`FeatureEvent`] on an unbounded channel drained by the host.

mod message;
mod muc;
mod presence;
mod private_chat;
mod pubsub;

pub use message::MessageHandler;
pub use muc::MucHandler;
pub use presence::PresenceHandler;
pub use private_chat::PrivateChatHandler;
pub use pubsub::PubSubHandler;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

/// Observable output of the feature handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeatureEvent {
    /// Normal message with a body
    Message {
        /// Sender JID
        from: Option<String>,
        /// Message subject
        subject: Option<String>,
        /// Message body
        body: String,
    },
    /// Message in a multi-user chat room
    RoomMessage {
        /// Bare room JID
        room: String,
        /// Sender nickname
        nick: Option<String>,
        /// Message body
        body: Option<String>,
        /// Room subject change
        subject: Option<String>,
    },
    /// Presence of a room occupant
    RoomPresence {
        /// Bare room JID
        room: String,
        /// Occupant nickname
        nick: Option<String>,
        /// `available`, `unavailable`, ...
        kind: String,
    },
    /// Round trip of one of our pings
    PingRtt {
        /// Ping id
        id: String,
        /// Round-trip time in milliseconds
        rtt_ms: u64,
    },
    /// Presence of a contact
    Presence {
        /// Sender JID
        from: Option<String>,
        /// `available`, `unavailable`, `subscribe`, ...
        kind: String,
        /// `away`, `chat`, `dnd`, `xa`
        show: Option<String>,
        /// Free-form status text
        status: Option<String>,
    },
    /// One-to-one chat message
    ChatMessage {
        /// Sender JID
        from: Option<String>,
        /// Message body
        body: String,
        /// Conversation thread id
        thread: Option<String>,
    },
    /// One published pub/sub item
    PubSubItem {
        /// Pub/sub service JID
        service: Option<String>,
        /// Node name
        node: String,
        /// Item id
        item_id: Option<String>,
        /// Serialized item payload
        payload: Option<String>,
    },
}

/// Sending half of the feature event channel
pub type FeatureEventSender = mpsc::UnboundedSender<FeatureEvent>;

/// Report an event; a dropped receiver only loses the event
pub(crate) fn emit(events: &FeatureEventSender, event: FeatureEvent) {
    if events.send(event).is_err() {
        trace!("Feature event receiver dropped");
    }
}

/// Split `room@service/nick` into the bare room and the nickname
pub(crate) fn split_resource(jid: &str) -> (String, Option<String>) {
    match jid.split_once('/') {
        Some((bare, resource)) => (bare.to_string(), Some(resource.to_string())),
        None => (jid.to_string(), None),
    }
}

/// Domain part of a JID string
pub(crate) fn domain_of(jid: &str) -> &str {
    let without_resource = jid.split('/').next().unwrap_or(jid);
    match without_resource.split_once('@') {
        Some((_, domain)) => domain,
        None => without_resource,
    }
}
