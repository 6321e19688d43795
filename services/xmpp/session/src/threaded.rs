//! Transport backed by one background thread.
//!
//! `connect` spawns a thread that owns a private current-thread runtime and
//! runs the engine loop: read from the socket, write queued stanzas, stop on
//! request. The loop only talks to the connection through its
//! [`TransportSink`]. `disconnect` signals the loop and joins the thread,
//! giving up after the configured shutdown timeout.

use crate::config::ServerConfig;
use crate::error::TransportError;
use crate::identity::SessionIdentity;
use crate::negotiation::{LoginNegotiator, Step};
use crate::queue::TransportSink;
use crate::state::ConnectionEvent;
use crate::transport::{connect_tcp, Transport};
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use xmpp_stanza::{Framing, Stanza, StanzaParser};

/// Handles to a running engine thread
#[derive(Debug)]
struct Worker {
    outbound: mpsc::UnboundedSender<Stanza>,
    shutdown: Option<oneshot::Sender<()>>,
    done: std_mpsc::Receiver<()>,
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// TCP transport driven by a dedicated thread
#[derive(Debug)]
pub struct ThreadedSocketTransport {
    config: ServerConfig,
    max_stanza_size: usize,
    worker: Option<Worker>,
}

impl ThreadedSocketTransport {
    /// Create an idle transport
    pub fn new(config: ServerConfig, max_stanza_size: usize) -> Self {
        Self {
            config,
            max_stanza_size,
            worker: None,
        }
    }

    /// Whether the engine thread is still running
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| w.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Transport for ThreadedSocketTransport {
    fn connect(&mut self, identity: &SessionIdentity, credential: &str, sink: TransportSink) -> bool {
        if self.worker.is_some() {
            warn!("Engine thread already running; refusing second connect");
            return false;
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (done_tx, done_rx) = std_mpsc::channel();
        let alive = Arc::new(AtomicBool::new(true));

        let engine = Engine {
            config: self.config.clone(),
            max_stanza_size: self.max_stanza_size,
            negotiator: LoginNegotiator::new(
                Framing::Tcp,
                self.config.login_mode,
                identity.clone(),
                credential,
            ),
            sink: sink.clone(),
            connected: false,
        };
        let exit = EngineExit {
            alive: alive.clone(),
            done: done_tx,
            sink,
        };

        let spawned = std::thread::Builder::new()
            .name(format!("xmpp-engine-{}", identity.user()))
            .spawn(move || {
                let _exit = exit;
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to build engine runtime: {}", e);
                        engine
                            .sink
                            .connection_event(ConnectionEvent::Fail(format!("runtime: {}", e)));
                        return;
                    }
                };
                runtime.block_on(engine.run(outbound_rx, shutdown_rx));
            });

        match spawned {
            Ok(handle) => {
                info!("Started engine thread for {}", self.config.socket_addr());
                self.worker = Some(Worker {
                    outbound: outbound_tx,
                    shutdown: Some(shutdown_tx),
                    done: done_rx,
                    alive,
                    handle,
                });
                true
            }
            Err(e) => {
                error!("Failed to spawn engine thread: {}", e);
                false
            }
        }
    }

    fn disconnect(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        if let Some(shutdown) = worker.shutdown.take() {
            let _ = shutdown.send(());
        }
        drop(worker.outbound);

        let timeout = self.config.shutdown_timeout;
        match worker.done.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => match worker.handle.join() {
                Ok(()) => debug!("Engine thread joined"),
                Err(_) => error!("Engine thread panicked; session for {} lost", self.config.socket_addr()),
            },
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "Engine thread did not stop within {:?}; abandoning it",
                    timeout
                );
            }
        }
    }

    fn send_stanza(&mut self, stanza: Stanza) -> bool {
        match &self.worker {
            Some(worker) if worker.alive.load(Ordering::SeqCst) => worker.outbound.send(stanza).is_ok(),
            _ => false,
        }
    }

    fn tick(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .map(|w| w.handle.is_finished())
            .unwrap_or(false);
        if finished {
            if let Some(worker) = self.worker.take() {
                trace!("Reaping finished engine thread");
                if worker.handle.join().is_err() {
                    error!("Engine thread panicked; session for {} lost", self.config.socket_addr());
                }
            }
        }
    }
}

impl Drop for ThreadedSocketTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Runs on the engine thread when it ends, however it ends
struct EngineExit {
    alive: Arc<AtomicBool>,
    done: std_mpsc::Sender<()>,
    sink: TransportSink,
}

impl Drop for EngineExit {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if std::thread::panicking() {
            self.sink
                .connection_event(ConnectionEvent::Fail("engine thread panicked".to_string()));
        }
        let _ = self.done.send(());
    }
}

/// State owned by the engine loop
struct Engine {
    config: ServerConfig,
    max_stanza_size: usize,
    negotiator: LoginNegotiator,
    sink: TransportSink,
    connected: bool,
}

impl Engine {
    async fn run(
        mut self,
        outbound_rx: mpsc::UnboundedReceiver<Stanza>,
        shutdown_rx: oneshot::Receiver<()>,
    ) {
        let addr = self.config.socket_addr();
        let result = self.drive(outbound_rx, shutdown_rx).await;
        let connected = self.connected;

        let event = match result {
            Ok(()) if connected => ConnectionEvent::Disconnect,
            Ok(()) => ConnectionEvent::Fail("stream ended before login completed".to_string()),
            Err(e) => {
                warn!("Engine loop for {} ended: {}", addr, e);
                if connected {
                    ConnectionEvent::Disconnect
                } else {
                    ConnectionEvent::Fail(e.to_string())
                }
            }
        };
        info!("Engine loop for {} stopped, reporting {:?}", addr, event);
        self.sink.connection_event(event);
    }

    async fn drive(
        &mut self,
        mut outbound_rx: mpsc::UnboundedReceiver<Stanza>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<(), TransportError> {
        let addr = self.config.socket_addr();
        let stream = tokio::select! {
            result = connect_tcp(&addr, self.config.connect_timeout) => result?,
            _ = &mut shutdown_rx => {
                debug!("Shutdown requested while connecting to {}", addr);
                return Ok(());
            }
        };
        info!("Connected to {}", addr);

        let (mut reader, mut writer) = stream.into_split();
        let mut parser = StanzaParser::with_limit(self.max_stanza_size);
        let mut read_buffer = BytesMut::with_capacity(16 * 1024);

        writer.write_all(self.negotiator.open().as_bytes()).await?;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("Shutdown requested for {}", addr);
                    let _ = writer.write_all(self.negotiator.close().as_bytes()).await;
                    let _ = writer.shutdown().await;
                    return Ok(());
                }

                Some(stanza) = outbound_rx.recv(), if self.negotiator.is_ready() => {
                    let xml = stanza.to_xml();
                    trace!("Sending {} bytes to {}", xml.len(), addr);
                    writer.write_all(xml.as_bytes()).await?;
                }

                read = reader.read_buf(&mut read_buffer) => {
                    if read? == 0 {
                        debug!("Server {} closed the socket", addr);
                        return Ok(());
                    }
                    let items = parser.feed(&read_buffer)?;
                    read_buffer.clear();
                    for item in items {
                        if self.apply(item, &mut writer).await? {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Apply one stream item; true once the server closed the stream
    async fn apply(
        &mut self,
        item: xmpp_stanza::StreamItem,
        writer: &mut OwnedWriteHalf,
    ) -> Result<bool, TransportError> {
        match self.negotiator.handle(item)? {
            Step::Wait => {}
            Step::Send(out) => {
                for xml in out {
                    writer.write_all(xml.as_bytes()).await?;
                }
            }
            Step::Ready(event) => {
                self.connected = true;
                self.sink.connection_event(event);
            }
            Step::Deliver(stanza) => {
                trace!("Received <{}>", stanza.name());
                self.sink.stanza(stanza);
            }
            Step::Closed => {
                let _ = writer.write_all(self.negotiator.close().as_bytes()).await;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
