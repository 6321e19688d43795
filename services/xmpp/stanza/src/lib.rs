//! Stanza model, incremental XML parsing, and stream framing for xmpp.
//!
//! This crate provides the thin protocol layer the session crate builds on:
//! an immutable stanza tree, a parser that turns arbitrary byte chunks into
//! complete stream items, and the framing differences between TCP streams and
//! RFC 7395 WebSocket streams.
//!
//! ## Stream items
//!
//! ```text
//! bytes ──► StanzaParser::feed ──► StreamOpen(<stream:stream> | <open/>)
//!                                  Stanza(<message/> | <presence/> | <iq/> | <features/> ...)
//!                                  StreamClose(</stream:stream> | <close/>)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use xmpp_stanza::{Stanza, StanzaParser, StreamItem};
//!
//! let msg = Stanza::builder("message")
//!     .attr("to", "bob@example.com")
//!     .attr("type", "chat")
//!     .child(Stanza::builder("body").text("hello").build())
//!     .build();
//!
//! let mut parser = StanzaParser::new();
//! let items = parser.feed(msg.to_xml().as_bytes()).unwrap();
//! assert_eq!(items, vec![StreamItem::Stanza(msg)]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod framing;
pub mod jid;
pub mod stanza;

// Re-export main types
pub use codec::{StanzaParser, StreamItem, DEFAULT_MAX_STANZA_SIZE};
pub use error::StanzaError;
pub use framing::{Framing, NS_CLIENT, NS_FRAMING, NS_STREAMS};
pub use jid::Jid;
pub use stanza::{Attributes, Stanza, StanzaBuilder, NS_MUC, NS_PING, NS_PUBSUB_EVENT};
