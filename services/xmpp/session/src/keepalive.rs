//! Ping/keepalive handler with RTT measurement.
//!
//! The monitor answers server pings (XEP-0199), sends a ping of its own once
//! the session has been idle past the threshold, and reports the round trip
//! of each answered ping. Any traffic in either direction resets the idle
//! timer, and so does emitting a ping even if the send is later refused. It does not decide that a connection is dead.

use crate::config::KeepaliveConfig;
use crate::features::{emit, FeatureEvent, FeatureEventSender};
use crate::handler::{FeatureHandler, Outbox};
use crate::identity::SessionIdentity;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use xmpp_stanza::{Stanza, NS_PING};

/// Outstanding pings older than this are forgotten
const PING_RETENTION: Duration = Duration::from_secs(60);

/// Build a ping iq addressed to `to`
pub fn build_ping(to: &str, id: &str) -> Stanza {
    Stanza::builder("iq")
        .attr("type", "get")
        .attr("id", id)
        .attr("to", to)
        .child(Stanza::builder("ping").attr("xmlns", NS_PING).build())
        .build()
}

/// Build the result answering a ping
pub fn build_pong(ping: &Stanza) -> Stanza {
    Stanza::builder("iq")
        .attr("type", "result")
        .attr_opt("id", ping.id())
        .attr_opt("to", ping.from())
        .build()
}

/// Ping ids we are waiting on
#[derive(Debug, Default)]
struct KeepaliveState {
    /// Outstanding ping ids and their send times
    outstanding: HashMap<String, Instant>,
}

impl KeepaliveState {
    /// Record a ping being sent
    fn record_ping(&mut self, id: String) {
        self.outstanding.insert(id, Instant::now());

        let cutoff = Instant::now().checked_sub(PING_RETENTION);
        if let Some(cutoff) = cutoff {
            self.outstanding.retain(|_, &mut time| time > cutoff);
        }
    }

    /// Process a reply and return the RTT if the id was ours
    fn process_pong(&mut self, id: &str) -> Option<Duration> {
        self.outstanding.remove(id).map(|sent| sent.elapsed())
    }
}

/// Idle ping emitter and ping responder
pub struct KeepaliveMonitor {
    config: KeepaliveConfig,
    events: FeatureEventSender,
    state: KeepaliveState,
    idle: Duration,
    target: Option<String>,
    next_id: u64,
}

impl KeepaliveMonitor {
    /// Create a monitor; inactive until a session logs in
    pub fn new(config: KeepaliveConfig, events: FeatureEventSender) -> Self {
        Self {
            config,
            events,
            state: KeepaliveState::default(),
            idle: Duration::ZERO,
            target: None,
            next_id: 1,
        }
    }

    /// Time since the last traffic
    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Number of pings awaiting a reply
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.len()
    }
}

impl FeatureHandler for KeepaliveMonitor {
    fn name(&self) -> &'static str {
        "keepalive"
    }

    fn receive_stanza(&mut self, stanza: &Stanza, outbox: &mut Outbox) -> bool {
        if stanza.name() != "iq" {
            return false;
        }

        match stanza.stanza_type() {
            Some("get") if stanza.child_ns("ping", NS_PING).is_some() => {
                debug!("Answering ping from {:?}", stanza.from());
                outbox.push(build_pong(stanza));
                true
            }
            Some("result") | Some("error") => {
                let Some(id) = stanza.id() else {
                    return false;
                };
                let Some(rtt) = self.state.process_pong(id) else {
                    return false;
                };
                debug!("Ping {} answered in {:?}", id, rtt);
                emit(
                    &self.events,
                    FeatureEvent::PingRtt {
                        id: id.to_string(),
                        rtt_ms: rtt.as_millis() as u64,
                    },
                );
                true
            }
            _ => false,
        }
    }

    fn on_login(&mut self, identity: &SessionIdentity) {
        self.target = Some(identity.domain().to_string());
        self.idle = Duration::ZERO;
    }

    fn on_disconnect(&mut self) {
        self.target = None;
        self.idle = Duration::ZERO;
        self.state.outstanding.clear();
    }

    fn note_activity(&mut self) {
        self.idle = Duration::ZERO;
    }

    fn tick(&mut self, delta: Duration, outbox: &mut Outbox) {
        if !self.config.enabled {
            return;
        }
        let Some(target) = &self.target else {
            return;
        };

        self.idle += delta;
        if self.idle > self.config.idle_threshold {
            let id = format!("ping_{}", self.next_id);
            self.next_id += 1;
            debug!("Idle for {:?}, sending {}", self.idle, id);
            self.idle = Duration::ZERO;
            outbox.push(build_ping(target, &id));
            self.state.record_ping(id);
        }
    }
}
