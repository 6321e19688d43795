//! Error types for login and transports.

use crate::state::LoginState;
use std::time::Duration;
use thiserror::Error;
use xmpp_stanza::StanzaError;

/// Reasons a login attempt or an established session ended unsuccessfully
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// User id does not compose into a valid `user@domain/resource`
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Server configuration cannot be used to connect
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),

    /// A login or logout is already in flight
    #[error("cannot log in while {0}")]
    Busy(LoginState),

    /// Transport refused to start
    #[error("transport failed to start: {0}")]
    TransportStart(String),

    /// Transport reported a failure
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport reported the stream closed
    #[error("disconnected")]
    Disconnected,
}

/// Errors raised inside a transport; reported to the session as events
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connect did not finish in time
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Target address
        addr: String,
        /// Configured limit
        timeout: Duration,
    },

    /// Inbound bytes could not be parsed
    #[error("stanza error: {0}")]
    Stanza(#[from] StanzaError),

    /// Server rejected or broke the login negotiation
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// WebSocket layer failure
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Server closed the stream
    #[error("stream closed by server")]
    StreamClosed,
}
