use super::{emit, FeatureEvent, FeatureEventSender};
use crate::handler::{FeatureHandler, Outbox};
use tracing::debug;
use xmpp_stanza::Stanza;

/// Contact presence
pub struct PresenceHandler {
    events: FeatureEventSender,
}

impl PresenceHandler {
    /// Create a handler reporting on `events`
    pub fn new(events: FeatureEventSender) -> Self {
        Self { events }
    }
}

impl FeatureHandler for PresenceHandler {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn receive_stanza(&mut self, stanza: &Stanza, _outbox: &mut Outbox) -> bool {
        if stanza.name() != "presence" {
            return false;
        }

        let kind = stanza.stanza_type().unwrap_or("available").to_string();
        debug!("Presence from {:?}: {}", stanza.from(), kind);
        emit(
            &self.events,
            FeatureEvent::Presence {
                from: stanza.from().map(str::to_string),
                kind,
                show: stanza.child_text("show").map(str::to_string),
                status: stanza.child_text("status").map(str::to_string),
            },
        );
        true
    }

    fn on_disconnect(&mut self) {}
}
