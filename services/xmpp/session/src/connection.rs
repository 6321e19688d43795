//! Connection orchestrator and login state machine.
//!
//! A [`Connection`] owns one transport at a time, the handler chain, and the
//! login state. It is driven from a single owning thread: `login`, `logout`,
//! `send_stanza` and `tick` are called there, and every caller notification
//! fires there. Transports report through the event queue, which `tick`
//! drains completely and in order.
//!
//! ```text
//! NotStarted | LoggedOut --login()--> ProcessingLogin --Connect | RawConnect--> LoggedIn
//! ProcessingLogin --Disconnect | Fail--> LoggedOut (login-complete false, deferred logout)
//! LoggedIn --Disconnect | Fail--> LoggedOut (login-changed, deferred logout)
//! LoggedIn --logout()--> ProcessingLogout --> LoggedOut (logout-complete)
//! ```

use crate::config::ServerConfig;
use crate::context::ClientContext;
use crate::error::LoginError;
use crate::handler::{HandlerChain, Outbox};
use crate::identity::SessionIdentity;
use crate::queue::{EventQueue, QueuedEvent};
use crate::state::{ConnectionEvent, ConnectionEventHandler, LoginState, LoginStatus};
use crate::transport::{create_transport, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use xmpp_stanza::Stanza;

/// Client connection to one XMPP server
pub struct Connection {
    context: ClientContext,
    config: ServerConfig,
    state: LoginState,
    identity: Option<SessionIdentity>,
    transport: Option<Box<dyn Transport>>,
    handlers: HandlerChain,
    queue: EventQueue,
    event_handlers: Vec<Arc<dyn ConnectionEventHandler>>,
    pending_logout: bool,
    outbox: Outbox,
}

impl Connection {
    /// Create a connection with the given handler chain
    pub fn new(context: ClientContext, handlers: HandlerChain) -> Self {
        Self {
            context,
            config: ServerConfig::default(),
            state: LoginState::NotStarted,
            identity: None,
            transport: None,
            handlers,
            queue: EventQueue::new(),
            event_handlers: Vec::new(),
            pending_logout: false,
            outbox: Outbox::default(),
        }
    }

    /// Register a receiver for login notifications
    pub fn set_event_handler<T>(&mut self, handler: Arc<T>)
    where
        T: ConnectionEventHandler + 'static,
    {
        self.event_handlers.push(handler);
    }

    /// Store the server configuration; ignored while a session is active
    pub fn set_server(&mut self, config: ServerConfig) {
        if matches!(
            self.state,
            LoginState::ProcessingLogin | LoginState::LoggedIn | LoginState::ProcessingLogout
        ) {
            warn!(
                "Ignoring server change to {} while {}",
                config.socket_addr(),
                self.state
            );
            return;
        }
        debug!("Server set to {} ({})", config.socket_addr(), config.transport);
        self.config = config;
    }

    /// Current server configuration
    pub fn server(&self) -> &ServerConfig {
        &self.config
    }

    /// Collapsed login status
    pub fn login_status(&self) -> LoginStatus {
        self.state.status()
    }

    /// Full login state
    pub fn login_state(&self) -> LoginState {
        self.state
    }

    /// Identity of the current or pending session
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    /// Handler chain
    pub fn handlers(&self) -> &HandlerChain {
        &self.handlers
    }

    /// Start logging in; the result arrives as a login-complete notification
    pub fn login(&mut self, user_id: &str, credential: &str) {
        if self.state.is_transitioning() {
            warn!("Login for {} rejected while {}", user_id, self.state);
            self.fire_login_complete(user_id, false, Some(&LoginError::Busy(self.state)));
            return;
        }

        let identity = match self
            .config
            .validate()
            .and_then(|()| SessionIdentity::new(user_id, &self.config))
        {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Login for {} rejected: {}", user_id, e);
                self.fire_login_complete(user_id, false, Some(&e));
                return;
            }
        };

        if self.state == LoginState::LoggedIn || self.transport.is_some() {
            info!("Tearing down previous session before login");
            self.logout();
        }

        let user = identity.bare().to_string();
        let sink = self.queue.begin_session();
        let mut transport = create_transport(&self.config, &self.context);

        self.identity = Some(identity.clone());
        self.set_state(LoginState::ProcessingLogin);
        info!("Logging in {} via {} to {}", user, self.config.transport, self.config.socket_addr());

        if !transport.connect(&identity, credential, sink) {
            error!("Transport for {} failed to start", user);
            self.queue.end_session();
            self.identity = None;
            self.set_state(LoginState::LoggedOut);
            let err = LoginError::TransportStart(format!("{} transport refused to connect", self.config.transport));
            self.fire_login_complete(&user, false, Some(&err));
            return;
        }
        self.transport = Some(transport);
    }

    /// Tear down the session; safe in any state
    pub fn logout(&mut self) {
        let was_logged_in = self.state == LoginState::LoggedIn;
        let user = self.user_label();
        if was_logged_in {
            self.set_state(LoginState::ProcessingLogout);
        }

        self.pending_logout = false;
        self.queue.end_session();
        if let Some(mut transport) = self.transport.take() {
            debug!("Disconnecting transport for {}", user);
            transport.disconnect();
        }
        self.handlers.on_disconnect();
        self.outbox.take();
        self.identity = None;
        self.set_state(LoginState::LoggedOut);

        if was_logged_in {
            info!("Logged out {}", user);
            self.fire_logout_complete(&user, true, None);
        } else {
            debug!("Silent teardown for {}", user);
        }
    }

    /// Send a stanza; false unless logged in and the transport accepted it
    pub fn send_stanza(&mut self, stanza: Stanza) -> bool {
        if self.state != LoginState::LoggedIn {
            debug!("Not sending <{}> while {}", stanza.name(), self.state);
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };

        let name = stanza.name().to_string();
        let sent = transport.send_stanza(stanza);
        if sent {
            trace!("Sent <{}>", name);
            self.handlers.note_activity();
        } else {
            warn!("Transport refused <{}>", name);
        }
        sent
    }

    /// Advance the connection by one loop iteration; always true
    pub fn tick(&mut self, delta: Duration) -> bool {
        if self.pending_logout {
            debug!("Running deferred logout");
            self.logout();
        }

        while let Some(event) = self.queue.next() {
            match event {
                QueuedEvent::State(event) => self.process_status_change(event),
                QueuedEvent::Stanza(stanza) => self.receive_stanza(stanza),
            }
        }

        if let Some(transport) = self.transport.as_mut() {
            transport.tick();
        }

        if self.state == LoginState::LoggedIn {
            self.handlers.tick(delta, &mut self.outbox);
            self.flush_outbox();
        }
        true
    }

    /// Offer an inbound stanza to the handler chain
    pub fn receive_stanza(&mut self, stanza: Stanza) {
        self.handlers.note_activity();
        match self.handlers.dispatch(&stanza, &mut self.outbox) {
            Some(handler) => trace!("<{}> handled by {}", stanza.name(), handler),
            None => debug!("Dropping unhandled <{}> from {:?}", stanza.name(), stanza.from()),
        }
        self.flush_outbox();
    }

    /// Report a connection state change; `queued` defers it to the next tick
    pub fn receive_connection_state_change(&mut self, event: ConnectionEvent, queued: bool) {
        if queued {
            self.queue.push(QueuedEvent::State(event));
        } else {
            self.process_status_change(event);
        }
    }

    fn process_status_change(&mut self, event: ConnectionEvent) {
        let user = self.user_label();
        match (self.state, event.is_connect()) {
            (LoginState::ProcessingLogin, true) => {
                self.set_state(LoginState::LoggedIn);
                if let Some(identity) = &self.identity {
                    self.handlers.on_login(identity);
                }
                self.handlers.note_activity();
                info!("Logged in {} ({:?})", user, event);
                self.fire_login_complete(&user, true, None);
            }
            (LoginState::ProcessingLogin, false) => {
                self.set_state(LoginState::LoggedOut);
                self.pending_logout = true;
                warn!("Login for {} failed: {:?}", user, event);
                self.fire_login_complete(&user, false, event.to_error().as_ref());
            }
            (LoginState::LoggedIn, false) => {
                self.set_state(LoginState::LoggedOut);
                self.pending_logout = true;
                warn!("Session for {} lost: {:?}", user, event);
                self.fire_login_changed(&user, LoginStatus::LoggedOut);
            }
            (state, _) => debug!("Ignoring {:?} while {}", event, state),
        }
    }

    fn set_state(&mut self, state: LoginState) -> bool {
        if self.state == state {
            return false;
        }
        debug!("Login state {} -> {}", self.state, state);
        self.state = state;
        true
    }

    fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        for stanza in self.outbox.take() {
            self.send_stanza(stanza);
        }
    }

    fn user_label(&self) -> String {
        self.identity
            .as_ref()
            .map(|i| i.bare().to_string())
            .unwrap_or_default()
    }

    fn fire_login_complete(&self, user: &str, success: bool, error: Option<&LoginError>) {
        for handler in &self.event_handlers {
            handler.on_login_complete(user, success, error);
        }
    }

    fn fire_login_changed(&self, user: &str, status: LoginStatus) {
        for handler in &self.event_handlers {
            handler.on_login_changed(user, status);
        }
    }

    fn fire_logout_complete(&self, user: &str, success: bool, error: Option<&LoginError>) {
        for handler in &self.event_handlers {
            handler.on_logout_complete(user, success, error);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.config.socket_addr())
            .field("state", &self.state)
            .field("identity", &self.identity.as_ref().map(|i| i.jid().to_string()))
            .field("handlers", &self.handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeepaliveConfig, LoginMode, TransportKind};
    use crate::features::FeatureEvent;
    use crate::handler::FeatureHandler;
    use crate::negotiation::script::{TCP_OPEN, WS_OPEN};
    use crate::testing::{spawn_server, FakeSocket, FakeSocketFactory};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::mpsc;
    use xmpp_stanza::NS_PING;

    #[derive(Debug, Clone, PartialEq)]
    enum Note {
        LoginComplete(bool),
        LoginChanged(LoginStatus),
        LogoutComplete(bool),
    }

    #[derive(Debug, Default)]
    struct Recorder {
        notes: Mutex<Vec<Note>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Note> {
            std::mem::take(&mut *self.notes.lock().unwrap())
        }
    }

    impl ConnectionEventHandler for Recorder {
        fn on_login_complete(&self, _user: &str, success: bool, _error: Option<&LoginError>) {
            self.notes.lock().unwrap().push(Note::LoginComplete(success));
        }

        fn on_login_changed(&self, _user: &str, status: LoginStatus) {
            self.notes.lock().unwrap().push(Note::LoginChanged(status));
        }

        fn on_logout_complete(&self, _user: &str, success: bool, _error: Option<&LoginError>) {
            self.notes.lock().unwrap().push(Note::LogoutComplete(success));
        }
    }

    struct Harness {
        connection: Connection,
        factory: Arc<FakeSocketFactory>,
        recorder: Arc<Recorder>,
        events: mpsc::UnboundedReceiver<FeatureEvent>,
        _runtime: tokio::runtime::Runtime,
    }

    impl Harness {
        fn new(keepalive: KeepaliveConfig) -> Self {
            let (tx, events) = mpsc::unbounded_channel();
            Self::with_chain(HandlerChain::standard(tx, keepalive), events)
        }

        fn with_chain(chain: HandlerChain, events: mpsc::UnboundedReceiver<FeatureEvent>) -> Self {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let factory = Arc::new(FakeSocketFactory::default());
            let context = ClientContext::new(runtime.handle().clone())
                .with_socket_factory(factory.clone());
            let mut connection = Connection::new(context, chain);
            connection.set_server(ServerConfig {
                domain: "example.com".to_string(),
                transport: TransportKind::EventDriven,
                login_mode: LoginMode::Raw,
                ..Default::default()
            });
            let recorder = Arc::new(Recorder::default());
            connection.set_event_handler(recorder.clone());
            Self {
                connection,
                factory,
                recorder,
                events,
                _runtime: runtime,
            }
        }

        fn socket(&self) -> Arc<FakeSocket> {
            self.factory.last().unwrap()
        }

        fn tick(&mut self) {
            assert!(self.connection.tick(Duration::from_millis(100)));
        }

        /// Log in over a fake socket in raw mode and settle
        fn logged_in(keepalive: KeepaliveConfig) -> Self {
            let mut harness = Self::new(keepalive);
            harness.connection.login("alice", "secret");
            harness.socket().open();
            harness.socket().deliver(WS_OPEN);
            harness.tick();
            assert_eq!(harness.connection.login_status(), LoginStatus::LoggedIn);
            assert_eq!(harness.recorder.take(), vec![Note::LoginComplete(true)]);
            harness
        }
    }

    #[test]
    fn test_login_connect_tick_logged_in() {
        let mut h = Harness::new(KeepaliveConfig::default());
        h.connection.login("alice", "secret");
        assert_eq!(h.connection.login_state(), LoginState::ProcessingLogin);
        assert_eq!(h.connection.login_status(), LoginStatus::LoggedOut);

        h.socket().open();
        h.socket().deliver(WS_OPEN);
        // Nothing changes until the owning thread ticks
        assert_eq!(h.connection.login_state(), LoginState::ProcessingLogin);
        assert!(h.recorder.take().is_empty());

        h.tick();
        assert_eq!(h.connection.login_state(), LoginState::LoggedIn);
        assert_eq!(h.recorder.take(), vec![Note::LoginComplete(true)]);
        assert_eq!(h.connection.identity().unwrap().jid().to_string(), "alice@example.com/redb");
    }

    #[test]
    fn test_login_fail_tick_logged_out() {
        let mut h = Harness::new(KeepaliveConfig::default());
        h.connection.login("alice", "secret");
        h.socket().error("connection refused");
        h.tick();

        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);
        assert_eq!(h.recorder.take(), vec![Note::LoginComplete(false)]);

        // Cleanup runs on the next tick without further notifications
        h.tick();
        assert!(h.recorder.take().is_empty());
        assert!(h.socket().was_closed());
    }

    #[test]
    fn test_unsolicited_disconnect_deferred_logout_once() {
        let mut h = Harness::logged_in(KeepaliveConfig::default());
        h.socket().remote_close();
        h.tick();

        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);
        assert_eq!(h.recorder.take(), vec![Note::LoginChanged(LoginStatus::LoggedOut)]);

        h.tick();
        h.tick();
        assert!(h.recorder.take().is_empty());
        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);
    }

    #[test]
    fn test_logout_twice_single_notification() {
        let mut h = Harness::logged_in(KeepaliveConfig::default());
        h.connection.logout();
        h.connection.logout();
        assert_eq!(h.recorder.take(), vec![Note::LogoutComplete(true)]);
        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);
        assert!(h.socket().was_closed());

        let mut fresh = Harness::new(KeepaliveConfig::default());
        fresh.connection.logout();
        fresh.connection.logout();
        assert!(fresh.recorder.take().is_empty());
    }

    #[test]
    fn test_logout_abandons_pending_login_silently() {
        let mut h = Harness::new(KeepaliveConfig::default());
        h.connection.login("alice", "secret");
        h.socket().open();
        h.connection.logout();
        // A late open from the abandoned socket is stale
        h.socket().deliver(WS_OPEN);
        h.tick();
        assert!(h.recorder.take().is_empty());
        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);
    }

    #[test]
    fn test_login_rejected_synchronously() {
        let mut h = Harness::new(KeepaliveConfig::default());
        h.connection.login("not a user", "pw");
        assert_eq!(h.recorder.take(), vec![Note::LoginComplete(false)]);
        assert_eq!(h.factory.count(), 0);

        h.connection.login("alice", "pw");
        h.connection.login("alice", "pw");
        assert_eq!(h.recorder.take(), vec![Note::LoginComplete(false)]);
        assert_eq!(h.factory.count(), 1);
        assert_eq!(h.connection.login_state(), LoginState::ProcessingLogin);
    }

    #[test]
    fn test_relogin_tears_down_previous_session() {
        let mut h = Harness::logged_in(KeepaliveConfig::default());
        let first = h.socket();
        h.connection.login("alice", "secret");
        assert!(first.was_closed());
        assert_eq!(h.recorder.take(), vec![Note::LogoutComplete(true)]);
        assert_eq!(h.factory.count(), 2);

        // Events from the old socket are ignored
        first.remote_close();
        h.tick();
        assert!(h.recorder.take().is_empty());
        assert_eq!(h.connection.login_state(), LoginState::ProcessingLogin);
    }

    #[test]
    fn test_set_server_ignored_mid_session() {
        let mut h = Harness::logged_in(KeepaliveConfig::default());
        h.connection.set_server(ServerConfig {
            host: "elsewhere".to_string(),
            ..Default::default()
        });
        assert_eq!(h.connection.server().host, "localhost");
    }

    #[test]
    fn test_send_only_when_logged_in() {
        let mut h = Harness::new(KeepaliveConfig::default());
        assert!(!h.connection.send_stanza(Stanza::builder("presence").build()));

        let mut h = Harness::logged_in(KeepaliveConfig::default());
        assert!(h.connection.send_stanza(Stanza::builder("presence").build()));
        assert_eq!(h.socket().sent().last().map(String::as_str), Some("<presence/>"));
    }

    #[test]
    fn test_stanza_and_state_events_in_order() {
        let mut h = Harness::logged_in(KeepaliveConfig::default());
        let socket = h.socket();
        socket.deliver("<message type='chat' from='bob@example.com'><body>one</body></message>");
        socket.deliver("<presence from='bob@example.com'/>");
        socket.deliver("<message type='chat' from='bob@example.com'><body>two</body></message>");
        socket.remote_close();
        // Delivered after the close report; same generation, still in order
        h.connection
            .receive_connection_state_change(ConnectionEvent::Fail("late".to_string()), true);
        h.tick();

        let kinds: Vec<String> = std::iter::from_fn(|| h.events.try_recv().ok())
            .map(|e| match e {
                FeatureEvent::ChatMessage { body, .. } => body,
                FeatureEvent::Presence { .. } => "presence".to_string(),
                other => format!("{:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec!["one", "presence", "two"]);
        assert_eq!(h.recorder.take(), vec![Note::LoginChanged(LoginStatus::LoggedOut)]);
    }

    #[test]
    fn test_ping_reply_sent_through_transport() {
        let mut h = Harness::logged_in(KeepaliveConfig::default());
        h.socket().deliver(
            "<iq type='get' id='p1' from='example.com'><ping xmlns='urn:xmpp:ping'/></iq>",
        );
        h.tick();
        let sent = h.socket().sent();
        assert!(sent.last().unwrap().contains("type=\"result\""));
        assert!(sent.last().unwrap().contains("id=\"p1\""));
    }

    #[test]
    fn test_keepalive_exactly_one_ping_when_idle() {
        let mut h = Harness::logged_in(KeepaliveConfig {
            enabled: true,
            idle_threshold: Duration::from_millis(250),
        });
        let pings = |socket: &FakeSocket| {
            socket.sent().iter().filter(|s| s.contains(NS_PING)).count()
        };

        // The login tick already counted 100ms of idle time
        h.tick();
        assert_eq!(pings(&h.socket()), 0);
        h.tick();
        assert_eq!(pings(&h.socket()), 1);
        // Sending the ping reset the timer
        h.tick();
        h.tick();
        assert_eq!(pings(&h.socket()), 1);

        // Inbound traffic also resets it
        h.socket().deliver("<presence from='bob@example.com'/>");
        h.tick();
        h.tick();
        assert_eq!(pings(&h.socket()), 1);
        h.tick();
        assert_eq!(pings(&h.socket()), 2);
    }

    #[test]
    fn test_dispatch_priority_in_connection() {
        struct Grab {
            name: &'static str,
            hits: Rc<RefCell<Vec<&'static str>>>,
        }
        impl FeatureHandler for Grab {
            fn name(&self) -> &'static str {
                self.name
            }
            fn receive_stanza(&mut self, _stanza: &Stanza, _outbox: &mut Outbox) -> bool {
                self.hits.borrow_mut().push(self.name);
                true
            }
            fn on_disconnect(&mut self) {}
        }

        let hits = Rc::new(RefCell::new(Vec::new()));
        let chain = HandlerChain::new()
            .with(Grab { name: "early", hits: hits.clone() })
            .with(Grab { name: "late", hits: hits.clone() });
        let (_tx, events) = mpsc::unbounded_channel();
        let mut h = Harness::with_chain(chain, events);
        h.connection.receive_stanza(Stanza::builder("message").build());
        assert_eq!(*hits.borrow(), vec!["early"]);
    }

    #[test]
    fn test_direct_state_change() {
        let mut h = Harness::new(KeepaliveConfig::default());
        h.connection.login("alice", "secret");
        h.connection
            .receive_connection_state_change(ConnectionEvent::RawConnect, false);
        assert_eq!(h.connection.login_status(), LoginStatus::LoggedIn);
        // Duplicate transition is suppressed
        h.connection
            .receive_connection_state_change(ConnectionEvent::Connect, false);
        assert_eq!(h.recorder.take(), vec![Note::LoginComplete(true)]);
    }

    /// Connection over the threaded TCP transport against a scripted server
    struct ThreadedHarness {
        connection: Connection,
        recorder: Arc<Recorder>,
        events: mpsc::UnboundedReceiver<FeatureEvent>,
        notes: Vec<Note>,
        bodies: Vec<String>,
        _runtime: tokio::runtime::Runtime,
    }

    impl ThreadedHarness {
        fn new(lines: Vec<&'static str>, hold_open: bool) -> Self {
            let port = spawn_server(lines, hold_open);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (tx, events) = mpsc::unbounded_channel();
            let mut connection = Connection::new(
                ClientContext::new(runtime.handle().clone()),
                HandlerChain::standard(tx, KeepaliveConfig::default()),
            );
            connection.set_server(ServerConfig {
                host: "127.0.0.1".to_string(),
                port,
                domain: "example.com".to_string(),
                transport: TransportKind::ThreadedSocket,
                login_mode: LoginMode::Raw,
                connect_timeout: Duration::from_secs(2),
                shutdown_timeout: Duration::from_secs(2),
                ..Default::default()
            });
            let recorder = Arc::new(Recorder::default());
            connection.set_event_handler(recorder.clone());
            Self {
                connection,
                recorder,
                events,
                notes: Vec::new(),
                bodies: Vec::new(),
                _runtime: runtime,
            }
        }

        /// Tick until `done` holds or five seconds pass, keeping every note
        /// and chat body seen on the way
        fn tick_until<F>(&mut self, done: F) -> bool
        where
            F: Fn(&Self) -> bool,
        {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                assert!(self.connection.tick(Duration::from_millis(10)));
                self.notes.extend(self.recorder.take());
                while let Ok(event) = self.events.try_recv() {
                    if let FeatureEvent::ChatMessage { body, .. } = event {
                        self.bodies.push(body);
                    }
                }
                if done(&*self) {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            false
        }
    }

    #[test]
    fn test_threaded_login_stanza_logout() {
        let mut h = ThreadedHarness::new(
            vec![TCP_OPEN, "<message type='chat' from='bob@example.com'><body>hi</body></message>"],
            true,
        );
        h.connection.login("alice", "secret");
        assert_eq!(h.connection.login_state(), LoginState::ProcessingLogin);

        assert!(h.tick_until(|h| h.connection.login_status() == LoginStatus::LoggedIn));
        assert_eq!(h.notes, vec![Note::LoginComplete(true)]);

        assert!(h.tick_until(|h| !h.bodies.is_empty()));
        assert_eq!(h.bodies, vec!["hi"]);
        assert!(h.connection.send_stanza(Stanza::builder("presence").build()));

        // Logout joins the socket thread within the shutdown timeout
        let started = Instant::now();
        h.connection.logout();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(h.recorder.take(), vec![Note::LogoutComplete(true)]);
        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);
        assert!(!h.connection.send_stanza(Stanza::builder("presence").build()));
    }

    #[test]
    fn test_threaded_server_close_logs_out_on_next_tick() {
        let mut h = ThreadedHarness::new(vec![TCP_OPEN, "</stream:stream>"], false);
        h.connection.login("alice", "secret");

        assert!(h.tick_until(|h| h.notes.contains(&Note::LoginChanged(LoginStatus::LoggedOut))));
        assert_eq!(
            h.notes,
            vec![Note::LoginComplete(true), Note::LoginChanged(LoginStatus::LoggedOut)]
        );
        assert_eq!(h.connection.login_state(), LoginState::LoggedOut);

        // The deferred logout joins the finished thread and reports nothing
        h.connection.tick(Duration::from_millis(10));
        assert!(h.recorder.take().is_empty());
        h.connection.logout();
        assert!(h.recorder.take().is_empty());
    }
}
