//! Shared client context.
//!
//! Everything a connection needs from its surroundings is carried in one
//! value built by the composition root: the socket factory (by default
//! WebSocket sockets driven by the given runtime) and the parser limit.
//! There are no process globals.

use crate::event_driven::SocketFactory;
use crate::websocket::WebSocketFactory;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use xmpp_stanza::DEFAULT_MAX_STANZA_SIZE;

/// Dependencies shared by every connection of a client
#[derive(Clone)]
pub struct ClientContext {
    socket_factory: Arc<dyn SocketFactory>,
    max_stanza_size: usize,
}

impl ClientContext {
    /// Context using WebSocket sockets spawned on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            socket_factory: Arc::new(WebSocketFactory::new(runtime)),
            max_stanza_size: DEFAULT_MAX_STANZA_SIZE,
        }
    }

    /// Replace the factory used by event-driven transports
    pub fn with_socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.socket_factory = factory;
        self
    }

    /// Replace the per-stanza size limit
    pub fn with_max_stanza_size(mut self, max_stanza_size: usize) -> Self {
        self.max_stanza_size = max_stanza_size;
        self
    }

    /// Factory for event-driven sockets
    pub fn socket_factory(&self) -> &Arc<dyn SocketFactory> {
        &self.socket_factory
    }

    /// Limit for a single buffered stanza
    pub fn max_stanza_size(&self) -> usize {
        self.max_stanza_size
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("max_stanza_size", &self.max_stanza_size)
            .finish_non_exhaustive()
    }
}
