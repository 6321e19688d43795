//! Identity of the logged-in session.

use crate::config::ServerConfig;
use crate::error::LoginError;
use xmpp_stanza::Jid;

/// `user@domain/resource` plus values derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    jid: Jid,
    muc_domain: String,
}

impl SessionIdentity {
    /// Compose the identity from a user id and the server configuration
    ///
    /// `user_id` is either a bare local part (`alice`) or a bare JID whose
    /// domain must match the configured one (`alice@example.com`).
    pub fn new(user_id: &str, config: &ServerConfig) -> Result<Self, LoginError> {
        let user_id = user_id.trim();
        let node = match user_id.split_once('@') {
            Some((node, domain)) => {
                if !domain.eq_ignore_ascii_case(&config.domain) {
                    return Err(LoginError::InvalidIdentity(format!(
                        "domain '{}' does not match server domain '{}'",
                        domain, config.domain
                    )));
                }
                node
            }
            None => user_id,
        };

        let jid = Jid::new(Some(node), &config.domain, Some(&config.resource))
            .map_err(|e| LoginError::InvalidIdentity(e.to_string()))?;

        Ok(Self {
            jid,
            muc_domain: config.muc_domain().to_ascii_lowercase(),
        })
    }

    /// Full JID
    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    /// Bare JID (`user@domain`)
    pub fn bare(&self) -> Jid {
        self.jid.bare()
    }

    /// Local part used for authentication
    pub fn user(&self) -> &str {
        self.jid.node().unwrap_or_default()
    }

    /// Account domain
    pub fn domain(&self) -> &str {
        self.jid.domain()
    }

    /// Resource of this session
    pub fn resource(&self) -> &str {
        self.jid.resource().unwrap_or_default()
    }

    /// Domain of the multi-user chat service
    pub fn muc_domain(&self) -> &str {
        &self.muc_domain
    }
}
