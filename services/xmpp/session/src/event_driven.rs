//! Transport wrapping a callback-driven socket.
//!
//! The socket is created by the [`SocketFactory`] of the client context and
//! reports through four callbacks that may fire on any thread. Callbacks
//! hold only a weak reference to the socket and the enqueue-only sink, so a
//! late callback after `disconnect` can neither keep the socket alive nor
//! reach the connection. Every WebSocket message is a complete document, fed
//! through [`StanzaParser::feed_document`].

use crate::config::{LoginMode, ServerConfig};
use crate::context::ClientContext;
use crate::identity::SessionIdentity;
use crate::negotiation::{LoginNegotiator, Step};
use crate::queue::TransportSink;
use crate::state::ConnectionEvent;
use crate::transport::Transport;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use xmpp_stanza::{Framing, Stanza, StanzaParser};

/// WebSocket subprotocol for XMPP (RFC 7395)
pub const XMPP_SUBPROTOCOL: &str = "xmpp";

/// Callbacks a socket invokes; each may run on an arbitrary thread
#[derive(Clone)]
pub struct SocketCallbacks {
    /// Socket is open
    pub on_connected: Arc<dyn Fn() + Send + Sync>,
    /// Socket failed to open or broke
    pub on_connection_error: Arc<dyn Fn(String) + Send + Sync>,
    /// Socket closed with a status code and reason
    pub on_closed: Arc<dyn Fn(u16, String) + Send + Sync>,
    /// One complete text message
    pub on_message: Arc<dyn Fn(String) + Send + Sync>,
}

impl fmt::Debug for SocketCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketCallbacks").finish_non_exhaustive()
    }
}

/// Externally driven message socket
pub trait AsyncSocket: Send + Sync {
    /// Start opening; progress is reported through `callbacks`
    fn connect(&self, callbacks: SocketCallbacks);
    /// Send one text message; false if it could not be queued
    fn send(&self, message: String) -> bool;
    /// Close the socket; safe to call repeatedly
    fn close(&self);
    /// Whether the socket is open
    fn is_connected(&self) -> bool;
}

/// Creates sockets for event-driven transports
pub trait SocketFactory: Send + Sync {
    /// Create an unopened socket for `url` speaking `protocol`
    fn create(&self, url: &str, protocol: &str, connect_timeout: Duration) -> Arc<dyn AsyncSocket>;
}

/// Parser and negotiation state shared by the callbacks
struct StreamState {
    parser: StanzaParser,
    negotiator: LoginNegotiator,
    finished: bool,
}

struct Shared {
    socket: Weak<dyn AsyncSocket>,
    sink: TransportSink,
    state: Mutex<StreamState>,
}

impl Shared {
    fn socket(&self) -> Option<Arc<dyn AsyncSocket>> {
        self.socket.upgrade()
    }

    /// Report the terminal event once and release the socket
    fn finish(&self, event: ConnectionEvent) {
        let first = match self.state.lock() {
            Ok(mut state) => !std::mem::replace(&mut state.finished, true),
            Err(_) => false,
        };
        if first {
            info!("Event-driven stream finished: {:?}", event);
            self.sink.connection_event(event);
        }
        if let Some(socket) = self.socket() {
            socket.close();
        }
    }

    fn on_connected(&self) {
        let header = match self.state.lock() {
            Ok(state) if !state.finished => state.negotiator.open(),
            _ => return,
        };
        debug!("Socket open, sending stream header");
        if let Some(socket) = self.socket() {
            if !socket.send(header) {
                self.finish(ConnectionEvent::Fail("failed to send stream header".to_string()));
            }
        }
    }

    /// Events and stanzas reach the sink in stream order while the lock is
    /// held; socket writes wait until it is released
    fn on_message(&self, message: String) {
        let mut outbound = Vec::new();
        let mut failure = None;
        let mut closed = false;

        {
            let Ok(mut guard) = self.state.lock() else {
                return;
            };
            if guard.finished {
                trace!("Dropping message after stream finished");
                return;
            }
            let state = &mut *guard;

            match state.parser.feed_document(message.as_bytes()) {
                Ok(items) => {
                    for item in items {
                        match state.negotiator.handle(item) {
                            Ok(Step::Wait) => {}
                            Ok(Step::Send(out)) => outbound.extend(out),
                            Ok(Step::Ready(event)) => {
                                self.sink.connection_event(event);
                            }
                            Ok(Step::Deliver(stanza)) => {
                                self.sink.stanza(stanza);
                            }
                            Ok(Step::Closed) => {
                                closed = true;
                                break;
                            }
                            Err(e) => {
                                failure = Some(e.to_string());
                                break;
                            }
                        }
                    }
                }
                Err(e) => failure = Some(e.to_string()),
            }
        }

        if let Some(socket) = self.socket() {
            for xml in outbound {
                if !socket.send(xml) {
                    warn!("Socket refused negotiation data");
                }
            }
        }
        if let Some(reason) = failure {
            warn!("Event-driven stream failed: {}", reason);
            self.finish(ConnectionEvent::Fail(reason));
        } else if closed {
            self.finish(ConnectionEvent::Disconnect);
        }
    }
}

/// Transport over an [`AsyncSocket`]; owns no thread
pub struct EventDrivenTransport {
    config: ServerConfig,
    context: ClientContext,
    socket: Option<Arc<dyn AsyncSocket>>,
    shared: Option<Arc<Shared>>,
}

impl EventDrivenTransport {
    /// Create an idle transport
    pub fn new(config: ServerConfig, context: ClientContext) -> Self {
        Self {
            config,
            context,
            socket: None,
            shared: None,
        }
    }

    fn callbacks(shared: &Arc<Shared>) -> SocketCallbacks {
        let on_connected = {
            let shared = shared.clone();
            Arc::new(move || shared.on_connected())
        };
        let on_connection_error = {
            let shared = shared.clone();
            Arc::new(move |reason: String| {
                warn!("Socket error: {}", reason);
                shared.finish(ConnectionEvent::Fail(reason));
            })
        };
        let on_closed = {
            let shared = shared.clone();
            Arc::new(move |code: u16, reason: String| {
                info!("Socket closed (code {}, reason '{}')", code, reason);
                shared.finish(ConnectionEvent::Disconnect);
            })
        };
        let on_message = {
            let shared = shared.clone();
            Arc::new(move |message: String| shared.on_message(message))
        };

        SocketCallbacks {
            on_connected,
            on_connection_error,
            on_closed,
            on_message,
        }
    }
}

impl Transport for EventDrivenTransport {
    fn connect(&mut self, identity: &SessionIdentity, credential: &str, sink: TransportSink) -> bool {
        if self.socket.is_some() {
            warn!("Socket already open; refusing second connect");
            return false;
        }

        let url = self.config.websocket_url();
        let socket = self
            .context
            .socket_factory()
            .create(&url, XMPP_SUBPROTOCOL, self.config.connect_timeout);

        let shared = Arc::new(Shared {
            socket: Arc::downgrade(&socket),
            sink,
            state: Mutex::new(StreamState {
                parser: StanzaParser::with_limit(self.context.max_stanza_size()),
                negotiator: LoginNegotiator::new(
                    Framing::WebSocket,
                    self.config.login_mode,
                    identity.clone(),
                    credential,
                ),
                finished: false,
            }),
        });

        info!(
            "Opening {} ({} login)",
            url,
            match self.config.login_mode {
                LoginMode::Sasl => "sasl",
                LoginMode::Raw => "raw",
            }
        );
        socket.connect(Self::callbacks(&shared));
        self.socket = Some(socket);
        self.shared = Some(shared);
        true
    }

    fn disconnect(&mut self) {
        let shared = self.shared.take();
        let Some(socket) = self.socket.take() else {
            return;
        };

        if let Some(shared) = shared {
            if let Ok(mut state) = shared.state.lock() {
                if !state.finished && state.negotiator.is_ready() && socket.is_connected() {
                    socket.send(state.negotiator.close().to_string());
                }
                state.finished = true;
            }
        }
        socket.close();
        debug!("Event-driven transport disconnected");
    }

    fn send_stanza(&mut self, stanza: Stanza) -> bool {
        match &self.socket {
            Some(socket) if socket.is_connected() => socket.send(stanza.to_xml()),
            _ => false,
        }
    }

    fn tick(&mut self) {}
}

impl Drop for EventDrivenTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for EventDrivenTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDrivenTransport")
            .field("url", &self.config.websocket_url())
            .field("open", &self.socket.is_some())
            .finish()
    }
}
