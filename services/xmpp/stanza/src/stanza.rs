//! Immutable stanza tree.
//!
//! A [`Stanza`] is one complete protocol element (name, ordered attributes,
//! ordered children, optional text). It has no setters: values are assembled
//! with [`StanzaBuilder`] and then only read, so a stanza can be moved to
//! another thread without any synchronization on its contents.

use quick_xml::escape::escape;
use smallvec::SmallVec;
use std::fmt;

/// Attribute storage; most stanzas carry four or fewer attributes
pub type Attributes = SmallVec<[(String, String); 4]>;

/// Namespace of XEP-0199 pings
pub const NS_PING: &str = "urn:xmpp:ping";
/// Namespace of XEP-0045 multi-user chat presence extensions
pub const NS_MUC: &str = "http://jabber.org/protocol/muc";
/// Namespace of XEP-0060 pub/sub notifications
pub const NS_PUBSUB_EVENT: &str = "http://jabber.org/protocol/pubsub#event";

/// Parsed protocol message unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    name: String,
    attributes: Attributes,
    children: Vec<Stanza>,
    text: Option<String>,
}

impl Stanza {
    /// Start building a stanza with the given element name
    pub fn builder(name: impl Into<String>) -> StanzaBuilder {
        StanzaBuilder::new(name)
    }

    /// Element name (stream-level names are unprefixed, e.g. `features`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in document order
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Child elements in document order
    pub fn children(&self) -> &[Stanza] {
        &self.children
    }

    /// Character data directly inside this element
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Look up an attribute value by name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Declared default namespace (`xmlns` attribute)
    pub fn xmlns(&self) -> Option<&str> {
        self.attr("xmlns")
    }

    /// `to` attribute
    pub fn to(&self) -> Option<&str> {
        self.attr("to")
    }

    /// `from` attribute
    pub fn from(&self) -> Option<&str> {
        self.attr("from")
    }

    /// `id` attribute
    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// `type` attribute
    pub fn stanza_type(&self) -> Option<&str> {
        self.attr("type")
    }

    /// Whether this element has the given name and (when given) namespace
    pub fn is(&self, name: &str, xmlns: Option<&str>) -> bool {
        self.name == name && (xmlns.is_none() || self.xmlns() == xmlns)
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&Stanza> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First child with the given name and namespace
    pub fn child_ns(&self, name: &str, xmlns: &str) -> Option<&Stanza> {
        self.children.iter().find(|c| c.is(name, Some(xmlns)))
    }

    /// Text of the first child with the given name, e.g. `<body>`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Stanza::text)
    }

    /// Serialize to an XML string
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(64);
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }

        if self.children.is_empty() && self.text.is_none() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text.as_str()));
        }
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

/// Builder for constructing stanzas
#[derive(Debug, Clone)]
pub struct StanzaBuilder {
    name: String,
    attributes: Attributes,
    children: Vec<Stanza>,
    text: Option<String>,
}

impl StanzaBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: SmallVec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Set an attribute, replacing an existing value with the same name
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
        self
    }

    /// Set an attribute only when a value is present
    pub fn attr_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }

    /// Append a child element
    pub fn child(mut self, child: Stanza) -> Self {
        self.children.push(child);
        self
    }

    /// Append character data
    pub fn text(mut self, text: impl AsRef<str>) -> Self {
        self.push_text(text.as_ref());
        self
    }

    pub(crate) fn push_child(&mut self, child: Stanza) {
        self.children.push(child);
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        self.text.get_or_insert_with(String::new).push_str(text);
    }

    pub(crate) fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// Finish the stanza
    pub fn build(self) -> Stanza {
        Stanza {
            name: self.name,
            attributes: self.attributes,
            children: self.children,
            text: self.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_message() -> Stanza {
        Stanza::builder("message")
            .attr("to", "bob@example.com")
            .attr("type", "chat")
            .child(Stanza::builder("body").text("hi & bye").build())
            .build()
    }

    #[test]
    fn test_accessors() {
        let msg = chat_message();
        assert_eq!(msg.name(), "message");
        assert_eq!(msg.to(), Some("bob@example.com"));
        assert_eq!(msg.stanza_type(), Some("chat"));
        assert_eq!(msg.child_text("body"), Some("hi & bye"));
        assert!(msg.from().is_none());
    }

    #[test]
    fn test_attribute_order_preserved_and_replaced() {
        let stanza = Stanza::builder("iq")
            .attr("type", "get")
            .attr("id", "a1")
            .attr("type", "set")
            .build();
        let keys: Vec<_> = stanza.attributes().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["type", "id"]);
        assert_eq!(stanza.stanza_type(), Some("set"));
    }

    #[test]
    fn test_serialize_escapes() {
        let xml = chat_message().to_xml();
        assert_eq!(
            xml,
            "<message to=\"bob@example.com\" type=\"chat\"><body>hi &amp; bye</body></message>"
        );
    }

    #[test]
    fn test_serialize_empty_element() {
        let ping = Stanza::builder("ping").attr("xmlns", NS_PING).build();
        assert_eq!(ping.to_xml(), "<ping xmlns=\"urn:xmpp:ping\"/>");
        assert!(ping.is("ping", Some(NS_PING)));
        assert!(!ping.is("ping", Some(NS_MUC)));
    }

    #[test]
    fn test_stanza_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<Stanza>();
    }
}
