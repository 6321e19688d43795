//! Basic usage example for the xmpp stanza layer.

use xmpp_stanza::{Framing, Jid, Stanza, StanzaParser, StreamItem};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== XMPP Stanza Example ===\n");

    // 1. Build a chat message
    println!("1. Building a chat message...");
    let to: Jid = "bob@example.com/desk".parse()?;
    let message = Stanza::builder("message")
        .attr("to", to.to_string())
        .attr("type", "chat")
        .child(Stanza::builder("body").text("Hello, <bob>!").build())
        .build();
    println!("   {}", message);

    // 2. Feed a server stream in arbitrary chunks
    println!("\n2. Parsing a chunked server stream...");
    let wire = format!(
        "{}<stream:features/>{}{}",
        Framing::Tcp.open("example.com"),
        message.to_xml(),
        Framing::Tcp.close()
    );
    let mut parser = StanzaParser::new();
    for chunk in wire.as_bytes().chunks(17) {
        for item in parser.feed(chunk)? {
            match item {
                StreamItem::StreamOpen(open) => println!("   stream opened to {:?}", open.to()),
                StreamItem::Stanza(stanza) => println!("   stanza <{}>", stanza.name()),
                StreamItem::StreamClose => println!("   stream closed"),
            }
        }
    }

    // 3. WebSocket framing
    println!("\n3. WebSocket framing...");
    println!("   open:  {}", Framing::WebSocket.open("example.com"));
    println!("   close: {}", Framing::WebSocket.close());

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
