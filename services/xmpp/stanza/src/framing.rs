//! Stream framing for TCP and WebSocket transports.
//!
//! TCP streams are wrapped in `<stream:stream>` … `</stream:stream>`. RFC 7395
//! WebSocket streams replace the wrapper with standalone `<open/>` and
//! `<close/>` elements, and stream-level children are sent unprefixed with an
//! explicit namespace. Parsed stream-level names are normalized to the
//! unprefixed form so higher layers never see the difference.

/// Namespace of RFC 7395 framing elements
pub const NS_FRAMING: &str = "urn:ietf:params:xml:ns:xmpp-framing";
/// Namespace of stream-level elements
pub const NS_STREAMS: &str = "http://etherx.jabber.org/streams";
/// Client stanza namespace
pub const NS_CLIENT: &str = "jabber:client";

/// How stream boundaries are expressed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `<stream:stream>` wrapper over a byte stream
    Tcp,
    /// RFC 7395 `<open/>`/`<close/>` over WebSocket messages
    WebSocket,
}

impl Framing {
    /// Stream header sent by the client
    pub fn open(&self, domain: &str) -> String {
        match self {
            Framing::Tcp => format!(
                "<?xml version='1.0'?><stream:stream to='{}' version='1.0' xmlns='{}' xmlns:stream='{}'>",
                domain, NS_CLIENT, NS_STREAMS
            ),
            Framing::WebSocket => format!(
                "<open xmlns='{}' to='{}' version='1.0'/>",
                NS_FRAMING, domain
            ),
        }
    }

    /// Stream trailer sent by the client
    pub fn close(&self) -> &'static str {
        match self {
            Framing::Tcp => "</stream:stream>",
            Framing::WebSocket => "<close xmlns='urn:ietf:params:xml:ns:xmpp-framing'/>",
        }
    }
}

/// Whether a top-level element name opens a stream
///
/// `<open/>` only counts in its self-closing form.
pub fn is_stream_open(raw_name: &[u8], self_closing: bool) -> bool {
    match raw_name {
        b"stream:stream" | b"stream" => true,
        b"open" => self_closing,
        _ => false,
    }
}

/// Whether a top-level element name closes a stream
pub fn is_stream_close(raw_name: &[u8]) -> bool {
    matches!(raw_name, b"stream:stream" | b"stream" | b"close")
}

/// Strip the `stream:` prefix from stream-level elements
pub fn normalize_stream_name(raw_name: &str) -> &str {
    raw_name.strip_prefix("stream:").unwrap_or(raw_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{StanzaParser, StreamItem};

    #[test]
    fn test_tcp_header() {
        let open = Framing::Tcp.open("example.com");
        assert!(open.starts_with("<?xml version='1.0'?><stream:stream"));
        assert!(open.contains("to='example.com'"));
        assert!(open.contains("xmlns:stream='http://etherx.jabber.org/streams'"));
        assert_eq!(Framing::Tcp.close(), "</stream:stream>");
    }

    #[test]
    fn test_websocket_header_parses_as_stream_open() {
        let open = Framing::WebSocket.open("example.com");
        let items = StanzaParser::new().feed_document(open.as_bytes()).unwrap();
        match &items[0] {
            StreamItem::StreamOpen(open) => {
                assert_eq!(open.to(), Some("example.com"));
                assert_eq!(open.xmlns(), Some(NS_FRAMING));
            }
            other => panic!("unexpected item: {:?}", other),
        }
        let items = StanzaParser::new().feed_document(Framing::WebSocket.close().as_bytes()).unwrap();
        assert_eq!(items, vec![StreamItem::StreamClose]);
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_stream_name("stream:features"), "features");
        assert_eq!(normalize_stream_name("message"), "message");
        assert!(is_stream_open(b"stream:stream", false));
        assert!(!is_stream_open(b"open", false));
        assert!(is_stream_close(b"close"));
        assert!(!is_stream_close(b"message"));
    }
}
