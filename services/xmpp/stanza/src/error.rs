//! Stanza codec error types.

use thiserror::Error;

/// Stanza parsing and framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StanzaError {
    /// Buffered bytes exceed the configured limit without forming a stanza
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// XML syntax error reported by the reader
    #[error("malformed xml: {0}")]
    Malformed(String),

    /// Closing tag without a matching opening tag
    #[error("unexpected end tag </{0}>")]
    UnexpectedEnd(String),

    /// Text that is not valid UTF-8 or contains a bad escape
    #[error("invalid text: {0}")]
    Text(String),

    /// JID that does not follow `[node@]domain[/resource]`
    #[error("invalid jid: {0}")]
    Jid(String),
}
