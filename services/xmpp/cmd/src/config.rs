//! Configuration handling for the xmpp client.
//!
//! Values come from the shared YAML config file (`services.xmpp.*` keys),
//! then `XMPP_*` environment variables, then command-line flags applied by
//! the caller.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use xmpp_session::ServerConfig;
use xmpp_stanza::DEFAULT_MAX_STANZA_SIZE;

/// Settings recognized in the config file and the environment, paired with
/// the environment variable that overrides each one
const OVERRIDABLE_KEYS: &[(&str, &str)] = &[
    ("host", "XMPP_HOST"),
    ("port", "XMPP_PORT"),
    ("domain", "XMPP_DOMAIN"),
    ("resource", "XMPP_RESOURCE"),
    ("user", "XMPP_USER"),
    ("transport", "XMPP_TRANSPORT"),
    ("login_mode", "XMPP_LOGIN_MODE"),
    ("websocket_path", "XMPP_WEBSOCKET_PATH"),
    ("use_tls", "XMPP_USE_TLS"),
    ("muc_prefix", "XMPP_MUC_PREFIX"),
    ("keepalive.enabled", "XMPP_KEEPALIVE_ENABLED"),
    ("keepalive.idle_threshold", "XMPP_KEEPALIVE_IDLE"),
    ("connect_timeout", "XMPP_CONNECT_TIMEOUT"),
    ("shutdown_timeout", "XMPP_SHUTDOWN_TIMEOUT"),
    ("tick_interval", "XMPP_TICK_INTERVAL"),
    ("max_stanza_size", "XMPP_MAX_STANZA_SIZE"),
];

/// Client configuration
#[derive(Debug, Clone)]
pub struct XmppConfig {
    /// Server connection settings
    pub server: ServerConfig,
    /// Account to log in as
    pub user: Option<String>,
    /// Owning-loop tick interval
    pub tick_interval: Duration,
    /// Largest stanza the parser buffers before failing the stream
    pub max_stanza_size: usize,
}

impl Default for XmppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            user: None,
            tick_interval: Duration::from_millis(50),
            max_stanza_size: DEFAULT_MAX_STANZA_SIZE,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    xmpp: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, serde_yaml::Value>>,
}

impl XmppConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = Self::default();

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let root: RootConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {:?}", path))?;
                config.apply_root_config(root);
                info!("Loaded configuration from {:?}", path);
            }
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_overrides(|name| std::env::var(name).ok());

        info!(
            "Final xmpp configuration: server={}, domain={}, transport={}, login_mode={:?}",
            config.server.socket_addr(),
            config.server.domain,
            config.server.transport,
            config.server.login_mode
        );
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        let Some(values) = root
            .services
            .and_then(|s| s.xmpp)
            .and_then(|x| x.config)
        else {
            return;
        };

        for (key, value) in values {
            let Some(key) = key.strip_prefix("services.xmpp.") else {
                warn!("Ignoring config key outside services.xmpp: {}", key);
                continue;
            };
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    warn!("Ignoring non-scalar value for services.xmpp.{}: {:?}", key, other);
                    continue;
                }
            };
            self.apply_key(key, &value);
        }
    }

    /// Apply `XMPP_*` overrides using `lookup` to read variables
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, variable) in OVERRIDABLE_KEYS {
            if let Some(value) = lookup(variable) {
                if self.apply_key(key, &value) {
                    info!("{} overridden by environment", key);
                }
            }
        }
    }

    /// Set one setting from its string form; false if unknown or invalid
    fn apply_key(&mut self, key: &str, value: &str) -> bool {
        let server = &mut self.server;
        let applied = match key {
            "host" => set(&mut server.host, value.to_string()),
            "domain" => set(&mut server.domain, value.to_string()),
            "resource" => set(&mut server.resource, value.to_string()),
            "websocket_path" => set(&mut server.websocket_path, value.to_string()),
            "muc_prefix" => set(&mut server.muc_prefix, value.to_string()),
            "user" => set(&mut self.user, Some(value.to_string())),
            "port" => value.parse().map(|v| server.port = v).is_ok(),
            "transport" => value.parse().map(|v| server.transport = v).is_ok(),
            "login_mode" => value.parse().map(|v| server.login_mode = v).is_ok(),
            "use_tls" => parse_bool(value).map(|v| server.use_tls = v).is_some(),
            "keepalive.enabled" => parse_bool(value)
                .map(|v| server.keepalive.enabled = v)
                .is_some(),
            "keepalive.idle_threshold" => parse_duration(value)
                .map(|v| server.keepalive.idle_threshold = v)
                .is_some(),
            "connect_timeout" => parse_duration(value)
                .map(|v| server.connect_timeout = v)
                .is_some(),
            "shutdown_timeout" => parse_duration(value)
                .map(|v| server.shutdown_timeout = v)
                .is_some(),
            "tick_interval" => parse_duration(value)
                .map(|v| self.tick_interval = v)
                .is_some(),
            "max_stanza_size" => value
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .map(|v| self.max_stanza_size = v)
                .is_some(),
            _ => {
                warn!("Ignoring unknown config key services.xmpp.{}", key);
                return false;
            }
        };

        if !applied {
            warn!("Ignoring invalid value for services.xmpp.{}: {:?}", key, value);
        }
        applied
    }
}

fn set<T>(slot: &mut T, value: T) -> bool {
    *slot = value;
    true
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn parse_duration(value: &str) -> Option<Duration> {
    humantime::parse_duration(value).ok()
}
