//! Login negotiation shared by both transports.
//!
//! The negotiator is sans-IO: transports feed it parsed stream items and
//! write whatever it asks for. Both transports therefore agree on the exact
//! sequence:
//!
//! ```text
//! client                          server
//!   ── stream open ──────────────►
//!   ◄───────────── stream open ──     (raw mode: RawConnect here)
//!   ◄──────── features(PLAIN) ──
//!   ── auth PLAIN ──────────────►
//!   ◄────────────── success ────
//!   ── stream open (restart) ───►
//!   ◄───────────── stream open ──
//!   ◄──────── features(bind) ───
//!   ── iq set bind ─────────────►
//!   ◄───────────── iq result ───      Connect
//! ```

use crate::config::LoginMode;
use crate::error::TransportError;
use crate::identity::SessionIdentity;
use crate::state::ConnectionEvent;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};
use xmpp_stanza::{Framing, Stanza, StreamItem};

/// SASL namespace
pub const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// Resource binding namespace
pub const NS_BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";

const BIND_ID: &str = "bind_1";

/// What the transport should do after feeding one item
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing to do yet
    Wait,
    /// Write these to the server
    Send(Vec<String>),
    /// Stream is usable; report this event
    Ready(ConnectionEvent),
    /// Stanza for the session
    Deliver(Stanza),
    /// Server closed the stream
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitStreamOpen { authenticated: bool },
    AwaitFeatures { authenticated: bool },
    AwaitAuthResult,
    AwaitBind,
    Ready,
    Closed,
}

/// Client side of stream setup and authentication
#[derive(Debug)]
pub struct LoginNegotiator {
    framing: Framing,
    mode: LoginMode,
    identity: SessionIdentity,
    credential: String,
    phase: Phase,
    bound_jid: Option<String>,
}

impl LoginNegotiator {
    /// Create a negotiator for one connection attempt
    pub fn new(
        framing: Framing,
        mode: LoginMode,
        identity: SessionIdentity,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            framing,
            mode,
            identity,
            credential: credential.into(),
            phase: Phase::AwaitStreamOpen { authenticated: false },
            bound_jid: None,
        }
    }

    /// Initial stream header to send once the socket is up
    pub fn open(&self) -> String {
        self.framing.open(self.identity.domain())
    }

    /// Stream trailer to send before closing the socket
    pub fn close(&self) -> &'static str {
        self.framing.close()
    }

    /// Whether the stream is usable
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// JID assigned by the server during resource binding
    pub fn bound_jid(&self) -> Option<&str> {
        self.bound_jid.as_deref()
    }

    /// Advance with one parsed stream item
    pub fn handle(&mut self, item: StreamItem) -> Result<Step, TransportError> {
        let stanza = match item {
            StreamItem::StreamOpen(open) => return Ok(self.on_stream_open(&open)),
            StreamItem::StreamClose => return self.on_stream_close(),
            StreamItem::Stanza(stanza) => stanza,
        };

        if stanza.name() == "error" {
            let condition = stanza
                .children()
                .first()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "undefined-condition".to_string());
            self.phase = Phase::Closed;
            return Err(TransportError::Negotiation(format!("stream error: {}", condition)));
        }

        match self.phase {
            Phase::Ready => Ok(Step::Deliver(stanza)),
            Phase::AwaitFeatures { authenticated } if stanza.name() == "features" => {
                self.on_features(&stanza, authenticated)
            }
            Phase::AwaitAuthResult => self.on_auth_result(&stanza),
            Phase::AwaitBind if stanza.is("iq", None) && stanza.id() == Some(BIND_ID) => {
                self.on_bind_result(&stanza)
            }
            phase => {
                debug!("Ignoring <{}> during negotiation ({:?})", stanza.name(), phase);
                Ok(Step::Wait)
            }
        }
    }

    fn on_stream_open(&mut self, open: &Stanza) -> Step {
        match self.phase {
            Phase::AwaitStreamOpen { authenticated } => {
                debug!("Server opened stream (id: {:?})", open.id());
                if self.mode == LoginMode::Raw {
                    info!("Raw stream open for {}", self.identity.bare());
                    self.phase = Phase::Ready;
                    return Step::Ready(ConnectionEvent::RawConnect);
                }
                self.phase = Phase::AwaitFeatures { authenticated };
                Step::Wait
            }
            _ => {
                debug!("Ignoring repeated stream open");
                Step::Wait
            }
        }
    }

    fn on_stream_close(&mut self) -> Result<Step, TransportError> {
        let was_ready = self.phase == Phase::Ready;
        self.phase = Phase::Closed;
        if was_ready {
            Ok(Step::Closed)
        } else {
            Err(TransportError::StreamClosed)
        }
    }

    fn on_features(&mut self, features: &Stanza, authenticated: bool) -> Result<Step, TransportError> {
        if !authenticated {
            let offers_plain = features
                .child_ns("mechanisms", NS_SASL)
                .map(|m| {
                    m.children()
                        .iter()
                        .any(|c| c.name() == "mechanism" && c.text() == Some("PLAIN"))
                })
                .unwrap_or(false);
            if !offers_plain {
                return Err(TransportError::Negotiation(
                    "server does not offer SASL PLAIN".to_string(),
                ));
            }

            let auth = Stanza::builder("auth")
                .attr("xmlns", NS_SASL)
                .attr("mechanism", "PLAIN")
                .text(plain_credentials(self.identity.user(), &self.credential))
                .build();
            self.phase = Phase::AwaitAuthResult;
            return Ok(Step::Send(vec![auth.to_xml()]));
        }

        if features.child_ns("bind", NS_BIND).is_none() {
            return Err(TransportError::Negotiation(
                "server does not offer resource binding".to_string(),
            ));
        }

        let bind = Stanza::builder("iq")
            .attr("type", "set")
            .attr("id", BIND_ID)
            .child(
                Stanza::builder("bind")
                    .attr("xmlns", NS_BIND)
                    .child(
                        Stanza::builder("resource")
                            .text(self.identity.resource())
                            .build(),
                    )
                    .build(),
            )
            .build();
        self.phase = Phase::AwaitBind;
        Ok(Step::Send(vec![bind.to_xml()]))
    }

    fn on_auth_result(&mut self, result: &Stanza) -> Result<Step, TransportError> {
        match result.name() {
            "success" => {
                debug!("SASL PLAIN accepted for {}", self.identity.bare());
                self.phase = Phase::AwaitStreamOpen { authenticated: true };
                Ok(Step::Send(vec![self.open()]))
            }
            "failure" => {
                let condition = result
                    .children()
                    .iter()
                    .find(|c| c.name() != "text")
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| "not-authorized".to_string());
                self.phase = Phase::Closed;
                Err(TransportError::Negotiation(format!(
                    "authentication failed: {}",
                    condition
                )))
            }
            other => {
                debug!("Ignoring <{}> while waiting for SASL result", other);
                Ok(Step::Wait)
            }
        }
    }

    fn on_bind_result(&mut self, iq: &Stanza) -> Result<Step, TransportError> {
        if iq.stanza_type() != Some("result") {
            self.phase = Phase::Closed;
            return Err(TransportError::Negotiation("resource binding rejected".to_string()));
        }

        self.bound_jid = iq
            .child_ns("bind", NS_BIND)
            .and_then(|b| b.child_text("jid"))
            .map(str::to_string);
        info!(
            "Bound {} as {}",
            self.identity.bare(),
            self.bound_jid.as_deref().unwrap_or("<unknown>")
        );
        self.phase = Phase::Ready;
        Ok(Step::Ready(ConnectionEvent::Connect))
    }
}

/// SASL PLAIN initial response (`\0user\0password`, base64)
pub fn plain_credentials(user: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{}\0{}", user, password))
}
