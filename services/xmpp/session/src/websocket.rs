//! WebSocket socket for the event-driven transport.
//!
//! Each socket is one task on the client runtime. The task owns the
//! tungstenite stream; the [`AsyncSocket`] handle only pushes commands to it,
//! so `send` and `close` never block the owning thread.

use crate::event_driven::{AsyncSocket, SocketCallbacks, SocketFactory};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

enum Command {
    Send(String),
    Close,
}

/// tokio-tungstenite client socket
pub struct WebSocket {
    url: String,
    protocol: String,
    connect_timeout: Duration,
    runtime: Handle,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    connected: Arc<AtomicBool>,
}

impl WebSocket {
    /// Create an unopened socket
    pub fn new(url: &str, protocol: &str, connect_timeout: Duration, runtime: Handle) -> Self {
        Self {
            url: url.to_string(),
            protocol: protocol.to_string(),
            connect_timeout,
            runtime,
            commands: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AsyncSocket for WebSocket {
    fn connect(&self, callbacks: SocketCallbacks) {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut commands) = self.commands.lock() {
            *commands = Some(tx);
        }
        self.runtime.spawn(run_socket(
            self.url.clone(),
            self.protocol.clone(),
            self.connect_timeout,
            callbacks,
            rx,
            self.connected.clone(),
        ));
    }

    fn send(&self, message: String) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.commands.lock() {
            Ok(commands) => commands
                .as_ref()
                .map(|tx| tx.send(Command::Send(message)).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn close(&self) {
        let sender = self.commands.lock().ok().and_then(|mut c| c.take());
        if let Some(tx) = sender {
            let _ = tx.send(Command::Close);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn run_socket(
    url: String,
    protocol: String,
    connect_timeout: Duration,
    callbacks: SocketCallbacks,
    mut commands: mpsc::UnboundedReceiver<Command>,
    connected: Arc<AtomicBool>,
) {
    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            (callbacks.on_connection_error)(format!("invalid url {}: {}", url, e));
            return;
        }
    };
    match HeaderValue::from_str(&protocol) {
        Ok(value) => {
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }
        Err(e) => {
            (callbacks.on_connection_error)(format!("invalid subprotocol {}: {}", protocol, e));
            return;
        }
    }

    let ws = match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request)).await {
        Ok(Ok((ws, response))) => {
            debug!("WebSocket to {} open (status {})", url, response.status());
            ws
        }
        Ok(Err(e)) => {
            (callbacks.on_connection_error)(format!("connect to {} failed: {}", url, e));
            return;
        }
        Err(_) => {
            (callbacks.on_connection_error)(format!(
                "connect to {} timed out after {:?}",
                url, connect_timeout
            ));
            return;
        }
    };

    connected.store(true, Ordering::SeqCst);
    (callbacks.on_connected)();

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    trace!("WebSocket send {} bytes", text.len());
                    if let Err(e) = write.send(Message::Text(text)).await {
                        connected.store(false, Ordering::SeqCst);
                        (callbacks.on_connection_error)(format!("send failed: {}", e));
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    connected.store(false, Ordering::SeqCst);
                    let _ = write.send(Message::Close(None)).await;
                    debug!("WebSocket to {} closed locally", url);
                    break;
                }
            },

            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => (callbacks.on_message)(text),
                Some(Ok(Message::Close(frame))) => {
                    connected.store(false, Ordering::SeqCst);
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                    (callbacks.on_closed)(code, reason);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    connected.store(false, Ordering::SeqCst);
                    warn!("WebSocket to {} failed: {}", url, e);
                    (callbacks.on_connection_error)(e.to_string());
                    break;
                }
                None => {
                    connected.store(false, Ordering::SeqCst);
                    (callbacks.on_closed)(1006, "stream ended".to_string());
                    break;
                }
            },
        }
    }
}

/// Creates [`WebSocket`]s on one runtime
#[derive(Debug, Clone)]
pub struct WebSocketFactory {
    runtime: Handle,
}

impl WebSocketFactory {
    /// Factory spawning socket tasks on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl SocketFactory for WebSocketFactory {
    fn create(&self, url: &str, protocol: &str, connect_timeout: Duration) -> Arc<dyn AsyncSocket> {
        Arc::new(WebSocket::new(url, protocol, connect_timeout, self.runtime.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    fn recording_callbacks() -> (SocketCallbacks, std_mpsc::Receiver<String>) {
        let (tx, rx) = std_mpsc::channel();
        let tx = Arc::new(Mutex::new(tx));
        let record = |prefix: &'static str, tx: Arc<Mutex<std_mpsc::Sender<String>>>| {
            move |text: String| {
                let _ = tx.lock().unwrap().send(format!("{}:{}", prefix, text));
            }
        };
        let connected_tx = tx.clone();
        let closed_tx = tx.clone();
        let callbacks = SocketCallbacks {
            on_connected: Arc::new(move || {
                let _ = connected_tx.lock().unwrap().send("connected".to_string());
            }),
            on_connection_error: Arc::new(record("error", tx.clone())),
            on_closed: Arc::new(move |code, _| {
                let _ = closed_tx.lock().unwrap().send(format!("closed:{}", code));
            }),
            on_message: Arc::new(record("message", tx)),
        };
        (callbacks, rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_echo_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |_request: &Request, mut response: Response| {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("xmpp"));
                Ok::<_, ErrorResponse>(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => ws.send(Message::Text(text)).await.unwrap(),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        let (callbacks, events) = recording_callbacks();
        let socket = WebSocket::new(
            &format!("ws://{}/xmpp-websocket", addr),
            "xmpp",
            Duration::from_secs(2),
            Handle::current(),
        );
        assert!(!socket.send("early".to_string()));
        socket.connect(callbacks);

        let events = tokio::task::spawn_blocking(move || {
            let first = events.recv_timeout(Duration::from_secs(5)).unwrap();
            (first, events)
        })
        .await
        .unwrap();
        assert_eq!(events.0, "connected");
        assert!(socket.is_connected());

        assert!(socket.send("<presence/>".to_string()));
        let echoed = tokio::task::spawn_blocking(move || events.1.recv_timeout(Duration::from_secs(5)).unwrap())
            .await
            .unwrap();
        assert_eq!(echoed, "message:<presence/>");

        socket.close();
        socket.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connect_refused_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (callbacks, events) = recording_callbacks();
        let factory = WebSocketFactory::new(Handle::current());
        let socket = factory.create(&format!("ws://{}/", addr), "xmpp", Duration::from_secs(2));
        socket.connect(callbacks);

        let event = tokio::task::spawn_blocking(move || events.recv_timeout(Duration::from_secs(5)).unwrap())
            .await
            .unwrap();
        assert!(event.starts_with("error:"), "{}", event);
        assert!(!socket.is_connected());
    }
}
