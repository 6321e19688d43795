use super::{emit, FeatureEvent, FeatureEventSender};
use crate::handler::{FeatureHandler, Outbox};
use tracing::debug;
use xmpp_stanza::Stanza;

/// Normal (non-chat, non-groupchat) messages carrying a body
pub struct MessageHandler {
    events: FeatureEventSender,
}

impl MessageHandler {
    /// Create a handler reporting on `events`
    pub fn new(events: FeatureEventSender) -> Self {
        Self { events }
    }
}

impl FeatureHandler for MessageHandler {
    fn name(&self) -> &'static str {
        "message"
    }

    fn receive_stanza(&mut self, stanza: &Stanza, _outbox: &mut Outbox) -> bool {
        if stanza.name() != "message" || !matches!(stanza.stanza_type(), None | Some("normal")) {
            return false;
        }
        let Some(body) = stanza.child_text("body") else {
            return false;
        };

        debug!("Message from {:?}", stanza.from());
        emit(
            &self.events,
            FeatureEvent::Message {
                from: stanza.from().map(str::to_string),
                subject: stanza.child_text("subject").map(str::to_string),
                body: body.to_string(),
            },
        );
        true
    }

    fn on_disconnect(&mut self) {}
}
