use super::{emit, FeatureEvent, FeatureEventSender};
use crate::handler::{FeatureHandler, Outbox};
use tracing::debug;
use xmpp_stanza::Stanza;

/// One-to-one chat messages
pub struct PrivateChatHandler {
    events: FeatureEventSender,
}

impl PrivateChatHandler {
    /// Create a handler reporting on `events`
    pub fn new(events: FeatureEventSender) -> Self {
        Self { events }
    }
}

impl FeatureHandler for PrivateChatHandler {
    fn name(&self) -> &'static str {
        "private_chat"
    }

    fn receive_stanza(&mut self, stanza: &Stanza, _outbox: &mut Outbox) -> bool {
        if !stanza.is("message", None) || stanza.stanza_type() != Some("chat") {
            return false;
        }
        // Chat states without a body are not chat messages
        let Some(body) = stanza.child_text("body") else {
            return false;
        };

        debug!("Chat message from {:?}", stanza.from());
        emit(
            &self.events,
            FeatureEvent::ChatMessage {
                from: stanza.from().map(str::to_string),
                body: body.to_string(),
                thread: stanza.child_text("thread").map(str::to_string),
            },
        );
        true
    }

    fn on_disconnect(&mut self) {}
}
