//! Client connection core for xmpp: login state machine, transports, and
//! feature handler dispatch.
//!
//! A [`Connection`] is owned by one thread and advanced by calling
//! [`Connection::tick`] from that thread's loop. Transports run elsewhere
//! (a dedicated socket thread or runtime callbacks) and only enqueue events;
//! every state change and every caller notification happens inside `tick`.
//!
//! ## Features
//!
//! - **Threaded socket transport**: TCP stream on its own thread with bounded shutdown
//! - **Event-driven transport**: RFC 7395 WebSocket driven by socket callbacks
//! - **Login negotiation**: SASL PLAIN and resource binding, or raw streams
//! - **Handler chain**: ordered, first-match dispatch of incoming stanzas
//! - **Keepalive**: XEP-0199 idle pings with RTT reporting
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use xmpp_session::{
//!     ClientContext, Connection, ConnectionEventHandler, HandlerChain, LoginError,
//!     LoginStatus, ServerConfig, TransportKind,
//! };
//!
//! #[derive(Debug)]
//! struct Printer;
//!
//! impl ConnectionEventHandler for Printer {
//!     fn on_login_complete(&self, user: &str, success: bool, error: Option<&LoginError>) {
//!         println!("login {} -> {} {:?}", user, success, error);
//!     }
//!     fn on_login_changed(&self, user: &str, status: LoginStatus) {
//!         println!("{} is now {:?}", user, status);
//!     }
//!     fn on_logout_complete(&self, user: &str, success: bool, _error: Option<&LoginError>) {
//!         println!("logout {} -> {}", user, success);
//!     }
//! }
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let (events, _rx) = mpsc::unbounded_channel();
//! let config = ServerConfig {
//!     host: "xmpp.example.com".to_string(),
//!     domain: "example.com".to_string(),
//!     transport: TransportKind::ThreadedSocket,
//!     ..Default::default()
//! };
//!
//! let context = ClientContext::new(runtime.handle().clone());
//! let mut connection = Connection::new(context, HandlerChain::standard(events, config.keepalive.clone()));
//! connection.set_event_handler(Arc::new(Printer));
//! connection.set_server(config);
//! connection.login("alice", "secret");
//!
//! loop {
//!     connection.tick(Duration::from_millis(50));
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod event_driven;
pub mod features;
pub mod handler;
pub mod identity;
pub mod keepalive;
pub mod negotiation;
pub mod queue;
pub mod state;
pub mod threaded;
pub mod transport;
pub mod websocket;

#[cfg(test)]
mod testing;

// Re-export main types
pub use config::{KeepaliveConfig, LoginMode, ServerConfig, TransportKind};
pub use connection::Connection;
pub use context::ClientContext;
pub use error::{LoginError, TransportError};
pub use event_driven::{AsyncSocket, EventDrivenTransport, SocketCallbacks, SocketFactory};
pub use features::{FeatureEvent, FeatureEventSender};
pub use handler::{FeatureHandler, HandlerChain, Outbox};
pub use identity::SessionIdentity;
pub use keepalive::KeepaliveMonitor;
pub use negotiation::{LoginNegotiator, Step};
pub use queue::{QueuedEvent, TransportSink};
pub use state::{ConnectionEvent, ConnectionEventHandler, LoginState, LoginStatus};
pub use threaded::ThreadedSocketTransport;
pub use transport::{create_transport, Transport};
pub use websocket::{WebSocket, WebSocketFactory};
