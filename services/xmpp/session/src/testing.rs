//! In-memory socket for exercising event-driven code paths, and a scripted
//! TCP server for the threaded one.

use crate::event_driven::{AsyncSocket, SocketCallbacks, SocketFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Socket whose callbacks are fired by the test
pub(crate) struct FakeSocket {
    url: String,
    callbacks: Mutex<Option<SocketCallbacks>>,
    connected: AtomicBool,
    closed: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl FakeSocket {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            callbacks: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn callbacks(&self) -> SocketCallbacks {
        self.callbacks
            .lock()
            .unwrap()
            .clone()
            .expect("connect was not called")
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Simulate the socket opening
    pub(crate) fn open(&self) {
        self.connected.store(true, Ordering::SeqCst);
        (self.callbacks().on_connected)();
    }

    /// Simulate one inbound text message
    pub(crate) fn deliver(&self, message: &str) {
        (self.callbacks().on_message)(message.to_string());
    }

    /// Simulate the server closing the socket
    pub(crate) fn remote_close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        (self.callbacks().on_closed)(1000, "bye".to_string());
    }

    /// Simulate a socket error
    pub(crate) fn error(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        (self.callbacks().on_connection_error)(reason.to_string());
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AsyncSocket for FakeSocket {
    fn connect(&self, callbacks: SocketCallbacks) {
        *self.callbacks.lock().unwrap() = Some(callbacks);
    }

    fn send(&self, message: String) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(message);
        true
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Factory remembering every socket it created
#[derive(Default)]
pub(crate) struct FakeSocketFactory {
    sockets: Mutex<Vec<Arc<FakeSocket>>>,
}

impl FakeSocketFactory {
    pub(crate) fn last(&self) -> Option<Arc<FakeSocket>> {
        self.sockets.lock().unwrap().last().cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }
}

impl SocketFactory for FakeSocketFactory {
    fn create(&self, url: &str, _protocol: &str, _connect_timeout: Duration) -> Arc<dyn AsyncSocket> {
        let socket = Arc::new(FakeSocket::new(url));
        self.sockets.lock().unwrap().push(socket.clone());
        socket
    }
}

/// Scripted server on its own runtime thread; returns the bound port
///
/// Waits for the client header, writes `lines` with a short pause between
/// them, then either drains the socket until the client closes
/// (`hold_open`) or hangs up.
pub(crate) fn spawn_server(lines: Vec<&'static str>, hold_open: bool) -> u16 {
    let (port_tx, port_rx) = std_mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            port_tx.send(listener.local_addr().unwrap().port()).unwrap();
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            for line in lines {
                socket.write_all(line.as_bytes()).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            if hold_open {
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            }
        });
    });
    port_rx.recv().unwrap()
}
