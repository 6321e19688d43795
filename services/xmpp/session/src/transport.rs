//! Transport capability and selection.
//!
//! A transport moves stanzas between the connection and the server. It
//! reports everything it learns (stanzas, connection state changes) through
//! the [`TransportSink`] it was given on `connect`; nothing else crosses back
//! into the connection.

use crate::config::{ServerConfig, TransportKind};
use crate::context::ClientContext;
use crate::error::TransportError;
use crate::event_driven::EventDrivenTransport;
use crate::identity::SessionIdentity;
use crate::queue::TransportSink;
use crate::threaded::ThreadedSocketTransport;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;
use xmpp_stanza::Stanza;

/// Connection to the server for one session
pub trait Transport: std::fmt::Debug {
    /// Start connecting; false if the transport could not be started
    fn connect(&mut self, identity: &SessionIdentity, credential: &str, sink: TransportSink) -> bool;
    /// Stop and release all resources; blocks at most the configured shutdown timeout
    fn disconnect(&mut self);
    /// Queue a stanza for the server; false if the transport cannot take it
    fn send_stanza(&mut self, stanza: Stanza) -> bool;
    /// Periodic housekeeping on the owning thread
    fn tick(&mut self);
}

/// Build the transport variant selected by the configuration
pub fn create_transport(config: &ServerConfig, context: &ClientContext) -> Box<dyn Transport> {
    debug!("Creating {} transport for {}", config.transport, config.socket_addr());
    match config.transport {
        TransportKind::ThreadedSocket => Box::new(ThreadedSocketTransport::new(
            config.clone(),
            context.max_stanza_size(),
        )),
        TransportKind::EventDriven => Box::new(EventDrivenTransport::new(config.clone(), context.clone())),
    }
}

/// Connect to a TCP address, bounded by `timeout`
pub async fn connect_tcp(addr: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::ConnectTimeout {
            addr: addr.to_string(),
            timeout,
        }),
    }
}
