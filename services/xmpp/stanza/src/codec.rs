//! Incremental stanza parser.
//!
//! Bytes go in, zero or more complete [`StreamItem`]s come out. Partial input
//! stays buffered until the rest arrives. For WebSocket transports every
//! message is a self-contained document, so callers invoke
//! [`StanzaParser::reset`] at each message boundary.

use crate::error::StanzaError;
use crate::framing::{is_stream_close, is_stream_open, normalize_stream_name};
use crate::stanza::{Stanza, StanzaBuilder};
use bytes::{Buf, BytesMut};
use quick_xml::errors::{Error as XmlError, SyntaxError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{trace, warn};

/// Default limit for buffered, not yet complete stanza bytes (1 MiB)
pub const DEFAULT_MAX_STANZA_SIZE: usize = 1024 * 1024;

/// One top-level item recognized on the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// `<stream:stream>` or `<open/>` with its attributes
    StreamOpen(Stanza),
    /// A complete stanza (stream-level names are unprefixed)
    Stanza(Stanza),
    /// `</stream:stream>` or `<close/>`
    StreamClose,
}

/// Stateful stanza boundary detector and tree builder
#[derive(Debug)]
pub struct StanzaParser {
    buffer: BytesMut,
    max_stanza_size: usize,
}

impl StanzaParser {
    /// Create a parser with the default size limit
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_STANZA_SIZE)
    }

    /// Create a parser with a custom size limit
    pub fn with_limit(max_stanza_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            max_stanza_size,
        }
    }

    /// Number of bytes waiting for the rest of a stanza
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discard buffered bytes; the next byte starts a new document
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            trace!("Discarding {} buffered bytes on parser reset", self.buffer.len());
        }
        self.buffer.clear();
    }

    /// Feed bytes and collect every complete item they finish
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamItem>, StanzaError> {
        self.buffer.extend_from_slice(bytes);

        let mut items = Vec::new();
        loop {
            match extract_item(&self.buffer)? {
                Extracted::Item(item, consumed) => {
                    self.buffer.advance(consumed);
                    items.push(item);
                }
                Extracted::Skip(consumed) => {
                    self.buffer.advance(consumed);
                    break;
                }
                Extracted::Incomplete => break,
            }
        }

        if self.buffer.len() > self.max_stanza_size {
            let size = self.buffer.len();
            warn!("Stanza buffer exceeded {} bytes ({} buffered)", self.max_stanza_size, size);
            self.buffer.clear();
            return Err(StanzaError::Size(size));
        }

        Ok(items)
    }

    /// Parse one self-contained document (e.g. one WebSocket message)
    ///
    /// The parser is reset afterwards whatever the outcome. Bytes left over
    /// from a truncated document are discarded, never carried into the next.
    pub fn feed_document(&mut self, bytes: &[u8]) -> Result<Vec<StreamItem>, StanzaError> {
        let result = self.feed(bytes);
        if !self.buffer.is_empty() {
            warn!("Discarding {} bytes of truncated document", self.buffer.len());
        }
        self.buffer.clear();
        result
    }
}

impl Default for StanzaParser {
    fn default() -> Self {
        Self::new()
    }
}

enum Extracted {
    /// Complete item and the number of bytes it used
    Item(StreamItem, usize),
    /// Only whitespace, declarations or comments; drop this many bytes
    Skip(usize),
    /// Need more data
    Incomplete,
}

fn element_builder(e: &BytesStart<'_>) -> Result<StanzaBuilder, StanzaError> {
    let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut builder = Stanza::builder(normalize_stream_name(&raw_name));
    for attr in e.attributes() {
        let attr = attr.map_err(|err| StanzaError::Malformed(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| StanzaError::Text(err.to_string()))?;
        builder = builder.attr(key, value.into_owned());
    }
    Ok(builder)
}

fn attach(stack: &mut [StanzaBuilder], element: Stanza) -> Option<Stanza> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_child(element);
            None
        }
        None => Some(element),
    }
}

fn extract_item(buffer: &[u8]) -> Result<Extracted, StanzaError> {
    let mut reader = Reader::from_reader(buffer);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;
    // Each call starts mid-stream, so `</stream:stream>` has no matching start here
    reader.config_mut().allow_unmatched_ends = true;

    let mut stack: Vec<StanzaBuilder> = Vec::new();
    let mut idle_end: usize = 0;

    loop {
        let event = reader.read_event();
        let end = reader.buffer_position() as usize;

        match event {
            Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::Comment(_)) | Ok(Event::DocType(_)) => {
                if stack.is_empty() {
                    idle_end = end;
                }
            }
            Ok(Event::Start(e)) => {
                let raw = e.name();
                if stack.is_empty() && is_stream_open(raw.as_ref(), false) {
                    let open = element_builder(&e)?.build();
                    return Ok(Extracted::Item(StreamItem::StreamOpen(open), end));
                }
                stack.push(element_builder(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let element = element_builder(&e)?.build();
                if stack.is_empty() {
                    let raw = e.name();
                    if is_stream_open(raw.as_ref(), true) {
                        return Ok(Extracted::Item(StreamItem::StreamOpen(element), end));
                    }
                    if is_stream_close(raw.as_ref()) {
                        return Ok(Extracted::Item(StreamItem::StreamClose, end));
                    }
                }
                if let Some(done) = attach(&mut stack, element) {
                    return Ok(Extracted::Item(StreamItem::Stanza(done), end));
                }
            }
            Ok(Event::Text(t)) => match stack.last_mut() {
                Some(current) => {
                    let text = t.unescape().map_err(|err| StanzaError::Text(err.to_string()))?;
                    // Whitespace between child elements is formatting, not content
                    if !text.trim().is_empty() || current.has_text() {
                        current.push_text(&text);
                    }
                }
                None => idle_end = end,
            },
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.push_text(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                let raw = e.name();
                let Some(open) = stack.pop() else {
                    if is_stream_close(raw.as_ref()) {
                        return Ok(Extracted::Item(StreamItem::StreamClose, end));
                    }
                    let name = String::from_utf8_lossy(raw.as_ref()).into_owned();
                    return Err(StanzaError::UnexpectedEnd(name));
                };
                if let Some(done) = attach(&mut stack, open.build()) {
                    return Ok(Extracted::Item(StreamItem::Stanza(done), end));
                }
            }
            Ok(Event::Eof) => {
                return Ok(if stack.is_empty() && idle_end > 0 {
                    Extracted::Skip(idle_end)
                } else {
                    Extracted::Incomplete
                });
            }
            Err(XmlError::Syntax(SyntaxError::UnclosedTag))
            | Err(XmlError::Syntax(SyntaxError::UnclosedPIOrXmlDecl))
            | Err(XmlError::Syntax(SyntaxError::UnclosedComment))
            | Err(XmlError::Syntax(SyntaxError::UnclosedCData)) => {
                return Ok(if idle_end > 0 && stack.is_empty() {
                    Extracted::Skip(idle_end)
                } else {
                    Extracted::Incomplete
                });
            }
            Err(err) => return Err(StanzaError::Malformed(err.to_string())),
        }
    }
}
