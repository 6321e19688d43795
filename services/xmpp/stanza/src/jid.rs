//! Jabber identifiers (`node@domain/resource`).

use crate::error::StanzaError;
use std::fmt;
use std::str::FromStr;

/// Parsed JID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// Build a full JID from its parts, validating each one
    pub fn new(
        node: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Self, StanzaError> {
        if let Some(node) = node {
            validate_part(node, "@/")?;
        }
        validate_part(domain, "@/")?;
        if let Some(resource) = resource {
            validate_part(resource, "")?;
        }

        Ok(Self {
            node: node.map(str::to_string),
            domain: domain.to_ascii_lowercase(),
            resource: resource.map(str::to_string),
        })
    }

    /// Local part, if any
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Domain part
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resource part, if any
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Copy without the resource
    pub fn bare(&self) -> Jid {
        Jid {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }
}

fn validate_part(part: &str, forbidden: &str) -> Result<(), StanzaError> {
    if part.is_empty() {
        return Err(StanzaError::Jid("empty part".to_string()));
    }
    if part.len() > 1023 {
        return Err(StanzaError::Jid(format!("part longer than 1023 bytes: {}", part.len())));
    }
    if part
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || forbidden.contains(c))
    {
        return Err(StanzaError::Jid(format!("illegal character in '{}'", part)));
    }
    Ok(())
}

impl FromStr for Jid {
    type Err = StanzaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, resource) = match s.split_once('/') {
            Some((rest, resource)) => (rest, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match rest.split_once('@') {
            Some((node, domain)) => (Some(node), domain),
            None => (None, rest),
        };
        Jid::new(node, domain, resource)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{}@", node)?;
        }
        f.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{}", resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let jid: Jid = "alice@Example.com/game".parse().unwrap();
        assert_eq!(jid.node(), Some("alice"));
        assert_eq!(jid.domain(), "example.com");
        assert_eq!(jid.resource(), Some("game"));
        assert_eq!(jid.to_string(), "alice@example.com/game");
        assert_eq!(jid.bare().to_string(), "alice@example.com");
    }

    #[test]
    fn test_parse_domain_only() {
        let jid: Jid = "muc.example.com".parse().unwrap();
        assert_eq!(jid.node(), None);
        assert_eq!(jid.domain(), "muc.example.com");
    }

    #[test]
    fn test_resource_may_contain_slash() {
        let jid: Jid = "room@muc.example.com/nick/with/slash".parse().unwrap();
        assert_eq!(jid.resource(), Some("nick/with/slash"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("@example.com".parse::<Jid>().is_err());
        assert!("alice@".parse::<Jid>().is_err());
        assert!("al ice@example.com".parse::<Jid>().is_err());
        assert!("alice@example.com/".parse::<Jid>().is_err());
        assert!(Jid::new(Some("a@b"), "example.com", None).is_err());
    }
}
