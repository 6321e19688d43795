//! Server and keepalive configuration.

use crate::error::LoginError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which transport a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Persistent TCP socket driven by one background thread
    #[default]
    ThreadedSocket,
    /// WebSocket driven by callbacks on the shared runtime
    EventDriven,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threaded" | "threaded_socket" | "tcp" | "socket" => Ok(Self::ThreadedSocket),
            "event_driven" | "websocket" | "ws" => Ok(Self::EventDriven),
            other => Err(format!(
                "unknown transport '{}', expected 'tcp' or 'websocket'",
                other
            )),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadedSocket => write!(f, "tcp"),
            Self::EventDriven => write!(f, "websocket"),
        }
    }
}

/// How far the transport negotiates before reporting the stream usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMode {
    /// SASL PLAIN authentication and resource binding, reported as `Connect`
    #[default]
    Sasl,
    /// Stream header only, reported as `RawConnect`
    Raw,
}

impl FromStr for LoginMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sasl" => Ok(Self::Sasl),
            "raw" => Ok(Self::Raw),
            other => Err(format!("unknown login mode '{}', expected 'sasl' or 'raw'", other)),
        }
    }
}

/// Idle ping settings
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Whether idle pings are sent at all
    pub enabled: bool,
    /// Idle time after which one ping is emitted
    pub idle_threshold: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_threshold: Duration::from_secs(60),
        }
    }
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or address to connect to
    pub host: String,
    /// Port to connect to
    pub port: u16,
    /// XMPP domain of the account
    pub domain: String,
    /// Resource appended to the full JID
    pub resource: String,
    /// Transport variant
    pub transport: TransportKind,
    /// Path of the WebSocket endpoint
    pub websocket_path: String,
    /// Use `wss://` instead of `ws://` for the WebSocket URL
    pub use_tls: bool,
    /// Negotiation depth
    pub login_mode: LoginMode,
    /// Subdomain prefix of the multi-user chat service
    pub muc_prefix: String,
    /// Idle ping settings
    pub keepalive: KeepaliveConfig,
    /// Limit for establishing the socket
    pub connect_timeout: Duration,
    /// Limit for joining the engine thread on disconnect
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5222,
            domain: "localhost".to_string(),
            resource: "redb".to_string(),
            transport: TransportKind::ThreadedSocket,
            websocket_path: "/xmpp-websocket".to_string(),
            use_tls: false,
            login_mode: LoginMode::Sasl,
            muc_prefix: "conference".to_string(),
            keepalive: KeepaliveConfig::default(),
            connect_timeout: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// `host:port` for the TCP transport
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL for the WebSocket transport
    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let path = if self.websocket_path.starts_with('/') {
            self.websocket_path.clone()
        } else {
            format!("/{}", self.websocket_path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }

    /// Domain of the multi-user chat service
    pub fn muc_domain(&self) -> String {
        format!("{}.{}", self.muc_prefix, self.domain)
    }

    /// Check the fields a connection attempt relies on
    pub fn validate(&self) -> Result<(), LoginError> {
        if self.host.trim().is_empty() {
            return Err(LoginError::InvalidConfig("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(LoginError::InvalidConfig("port is 0".to_string()));
        }
        if self.domain.trim().is_empty() {
            return Err(LoginError::InvalidConfig("domain is empty".to_string()));
        }
        if self.keepalive.enabled && self.keepalive.idle_threshold.is_zero() {
            return Err(LoginError::InvalidConfig(
                "keepalive idle threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
