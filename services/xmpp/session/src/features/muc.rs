use super::{domain_of, emit, split_resource, FeatureEvent, FeatureEventSender};
use crate::handler::{FeatureHandler, Outbox};
use crate::identity::SessionIdentity;
use tracing::debug;
use xmpp_stanza::Stanza;

/// Multi-user chat traffic: groupchat messages and anything from the MUC service
pub struct MucHandler {
    events: FeatureEventSender,
    muc_domain: Option<String>,
}

impl MucHandler {
    /// Create a handler reporting on `events`
    pub fn new(events: FeatureEventSender) -> Self {
        Self {
            events,
            muc_domain: None,
        }
    }

    fn from_muc_service(&self, stanza: &Stanza) -> bool {
        match (&self.muc_domain, stanza.from()) {
            (Some(muc), Some(from)) => domain_of(from).eq_ignore_ascii_case(muc),
            _ => false,
        }
    }
}

impl FeatureHandler for MucHandler {
    fn name(&self) -> &'static str {
        "muc"
    }

    fn receive_stanza(&mut self, stanza: &Stanza, _outbox: &mut Outbox) -> bool {
        let (room, nick) = split_resource(stanza.from().unwrap_or_default());
        match stanza.name() {
            "message" if stanza.stanza_type() == Some("groupchat") || self.from_muc_service(stanza) => {
                debug!("Room message in {}", room);
                emit(
                    &self.events,
                    FeatureEvent::RoomMessage {
                        room,
                        nick,
                        body: stanza.child_text("body").map(str::to_string),
                        subject: stanza.child_text("subject").map(str::to_string),
                    },
                );
                true
            }
            "presence" if self.from_muc_service(stanza) => {
                let kind = stanza.stanza_type().unwrap_or("available").to_string();
                debug!("Room presence in {}: {:?} is {}", room, nick, kind);
                emit(&self.events, FeatureEvent::RoomPresence { room, nick, kind });
                true
            }
            _ => false,
        }
    }

    fn on_login(&mut self, identity: &SessionIdentity) {
        self.muc_domain = Some(identity.muc_domain().to_string());
    }

    fn on_disconnect(&mut self) {
        self.muc_domain = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tokio::sync::mpsc;

    fn logged_in() -> (MucHandler, mpsc::UnboundedReceiver<FeatureEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut handler = MucHandler::new(tx);
        let config = ServerConfig {
            domain: "example.com".to_string(),
            ..Default::default()
        };
        handler.on_login(&SessionIdentity::new("alice", &config).unwrap());
        (handler, rx)
    }

    #[test]
    fn test_groupchat_message() {
        let (mut handler, mut rx) = logged_in();
        let stanza = Stanza::builder("message")
            .attr("from", "lobby@rooms.other.org/bob")
            .attr("type", "groupchat")
            .child(Stanza::builder("body").text("hello room").build())
            .build();
        assert!(handler.receive_stanza(&stanza, &mut Outbox::default()));
        assert_eq!(
            rx.try_recv().unwrap(),
            FeatureEvent::RoomMessage {
                room: "lobby@rooms.other.org".to_string(),
                nick: Some("bob".to_string()),
                body: Some("hello room".to_string()),
                subject: None,
            }
        );
    }

    #[test]
    fn test_presence_from_muc_domain() {
        let (mut handler, mut rx) = logged_in();
        let stanza = Stanza::builder("presence")
            .attr("from", "lobby@conference.example.com/carol")
            .attr("type", "unavailable")
            .build();
        assert!(handler.receive_stanza(&stanza, &mut Outbox::default()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            FeatureEvent::RoomPresence { kind, .. } if kind == "unavailable"
        ));

        let contact = Stanza::builder("presence").attr("from", "bob@example.com/phone").build();
        assert!(!handler.receive_stanza(&contact, &mut Outbox::default()));
    }

    #[test]
    fn test_muc_domain_forgotten_on_disconnect() {
        let (mut handler, _rx) = logged_in();
        handler.on_disconnect();
        let stanza = Stanza::builder("presence")
            .attr("from", "lobby@conference.example.com/carol")
            .build();
        assert!(!handler.receive_stanza(&stanza, &mut Outbox::default()));
    }
}
