//! Feature handler capability and the ordered dispatch chain.
//!
//! Incoming stanzas are offered to each handler in list order; the first one
//! that returns `true` consumes the stanza and later handlers never see it.
//! Priority is the order the list was built in, nothing else.

use crate::config::KeepaliveConfig;
use crate::features::{
    FeatureEventSender, MessageHandler, MucHandler, PresenceHandler, PrivateChatHandler,
    PubSubHandler,
};
use crate::identity::SessionIdentity;
use crate::keepalive::KeepaliveMonitor;
use std::time::Duration;
use tracing::debug;
use xmpp_stanza::Stanza;

/// Stanzas a handler wants sent once dispatch returns
#[derive(Debug, Default)]
pub struct Outbox {
    stanzas: Vec<Stanza>,
}

impl Outbox {
    /// Queue a stanza
    pub fn push(&mut self, stanza: Stanza) {
        self.stanzas.push(stanza);
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }

    /// Take every queued stanza in order
    pub fn take(&mut self) -> Vec<Stanza> {
        std::mem::take(&mut self.stanzas)
    }
}

/// One protocol feature fed from the dispatch chain
///
/// Handlers live on the owning thread for the whole lifetime of the
/// connection and are notified, not recreated, across reconnects.
pub trait FeatureHandler {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Process a stanza; true only if it was recognized and fully handled
    fn receive_stanza(&mut self, stanza: &Stanza, outbox: &mut Outbox) -> bool;

    /// The session ended
    fn on_disconnect(&mut self);

    /// A session became usable
    fn on_login(&mut self, _identity: &SessionIdentity) {}

    /// Traffic was sent or received
    fn note_activity(&mut self) {}

    /// Advance timers while logged in
    fn tick(&mut self, _delta: Duration, _outbox: &mut Outbox) {}
}

/// Ordered list of feature handlers
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn FeatureHandler>>,
}

impl HandlerChain {
    /// Empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// The default chain: message, multi-user chat, ping/keepalive,
    /// presence, private chat, pub/sub
    pub fn standard(events: FeatureEventSender, keepalive: KeepaliveConfig) -> Self {
        Self::new()
            .with(MessageHandler::new(events.clone()))
            .with(MucHandler::new(events.clone()))
            .with(KeepaliveMonitor::new(keepalive, events.clone()))
            .with(PresenceHandler::new(events.clone()))
            .with(PrivateChatHandler::new(events.clone()))
            .with(PubSubHandler::new(events))
    }

    /// Append a handler with the lowest priority so far
    pub fn with(mut self, handler: impl FeatureHandler + 'static) -> Self {
        self.push(Box::new(handler));
        self
    }

    /// Append a boxed handler with the lowest priority so far
    pub fn push(&mut self, handler: Box<dyn FeatureHandler>) {
        self.handlers.push(handler);
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the chain has no handlers
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in priority order
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Offer a stanza in priority order; returns the consumer's name
    pub fn dispatch(&mut self, stanza: &Stanza, outbox: &mut Outbox) -> Option<&'static str> {
        for handler in self.handlers.iter_mut() {
            if handler.receive_stanza(stanza, outbox) {
                return Some(handler.name());
            }
        }
        None
    }

    /// Notify every handler that traffic happened
    pub fn note_activity(&mut self) {
        for handler in self.handlers.iter_mut() {
            handler.note_activity();
        }
    }

    /// Notify every handler that a session became usable
    pub fn on_login(&mut self, identity: &SessionIdentity) {
        for handler in self.handlers.iter_mut() {
            handler.on_login(identity);
        }
    }

    /// Notify every handler that the session ended
    pub fn on_disconnect(&mut self) {
        for handler in self.handlers.iter_mut() {
            debug!("Notifying {} handler of disconnect", handler.name());
            handler.on_disconnect();
        }
    }

    /// Advance every handler's timers
    pub fn tick(&mut self, delta: Duration, outbox: &mut Outbox) {
        for handler in self.handlers.iter_mut() {
            handler.tick(delta, outbox);
        }
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
