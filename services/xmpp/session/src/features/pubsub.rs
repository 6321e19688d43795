use super::{emit, FeatureEvent, FeatureEventSender};
use crate::handler::{FeatureHandler, Outbox};
use tracing::debug;
use xmpp_stanza::{Stanza, NS_PUBSUB_EVENT};

/// Pub/sub event notifications
pub struct PubSubHandler {
    events: FeatureEventSender,
}

impl PubSubHandler {
    /// Create a handler reporting on `events`
    pub fn new(events: FeatureEventSender) -> Self {
        Self { events }
    }
}

impl FeatureHandler for PubSubHandler {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    fn receive_stanza(&mut self, stanza: &Stanza, _outbox: &mut Outbox) -> bool {
        if stanza.name() != "message" {
            return false;
        }
        let Some(event) = stanza.child_ns("event", NS_PUBSUB_EVENT) else {
            return false;
        };

        let service = stanza.from().map(str::to_string);
        for items in event.children().iter().filter(|c| c.name() == "items") {
            let node = items.attr("node").unwrap_or_default().to_string();
            for item in items.children().iter().filter(|c| c.name() == "item") {
                debug!("Pub/sub item on {} from {:?}", node, service);
                emit(
                    &self.events,
                    FeatureEvent::PubSubItem {
                        service: service.clone(),
                        node: node.clone(),
                        item_id: item.id().map(str::to_string),
                        payload: item.children().first().map(Stanza::to_xml),
                    },
                );
            }
        }
        true
    }

    fn on_disconnect(&mut self) {}
}
