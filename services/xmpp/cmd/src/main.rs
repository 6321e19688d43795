//! XMPP client binary.
//!
//! Logs one account in over the configured transport, drives the connection
//! from a dedicated owning thread, prints feature events as JSON lines on
//! stdout, and logs out on Ctrl-C or after `--run-for`.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xmpp_session::{
    ClientContext, Connection, ConnectionEventHandler, FeatureEvent, FeatureEventSender,
    HandlerChain, LoginError, LoginMode, LoginStatus, ServerConfig, TransportKind,
};
use xmpp_stanza::{Jid, Stanza};

#[macro_use]
mod logging;
mod config;

use config::XmppConfig;
use logging::XmppLogFormatter;

/// XMPP client connection
#[derive(Parser, Debug)]
#[command(name = "xmpp", version, about = "XMPP client over TCP or WebSocket")]
struct Args {
    /// Server host to connect to
    #[arg(long)]
    server: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// XMPP domain of the account
    #[arg(long)]
    domain: Option<String>,

    /// Resource for the full JID
    #[arg(long)]
    resource: Option<String>,

    /// Account local part or bare JID
    #[arg(long)]
    user: Option<String>,

    /// Account password
    #[arg(long, env = "XMPP_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    /// Transport: tcp or websocket
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Negotiation: sasl or raw
    #[arg(long)]
    login_mode: Option<LoginMode>,

    /// Use wss:// for the websocket transport
    #[arg(long)]
    tls: bool,

    /// Idle time before a keepalive ping, e.g. 60s
    #[arg(long)]
    keepalive_idle: Option<humantime::Duration>,

    /// Disable keepalive pings
    #[arg(long)]
    no_keepalive: bool,

    /// Socket connect timeout, e.g. 15s
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,

    /// Owning loop tick interval, e.g. 50ms
    #[arg(long)]
    tick_interval: Option<humantime::Duration>,

    /// Log out and exit after this long, e.g. 5m
    #[arg(long)]
    run_for: Option<humantime::Duration>,

    /// Send one chat message to this JID after login
    #[arg(long, requires = "message")]
    send_to: Option<String>,

    /// Body of the chat message
    #[arg(long, requires = "send_to")]
    message: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

impl Args {
    /// Flags take precedence over file and environment values
    fn apply(&self, config: &mut XmppConfig) {
        let server = &mut config.server;
        if let Some(host) = &self.server {
            server.host = host.clone();
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(domain) = &self.domain {
            server.domain = domain.clone();
        }
        if let Some(resource) = &self.resource {
            server.resource = resource.clone();
        }
        if let Some(transport) = self.transport {
            server.transport = transport;
        }
        if let Some(mode) = self.login_mode {
            server.login_mode = mode;
        }
        if self.tls {
            server.use_tls = true;
        }
        if let Some(idle) = &self.keepalive_idle {
            server.keepalive.idle_threshold = **idle;
        }
        if self.no_keepalive {
            server.keepalive.enabled = false;
        }
        if let Some(timeout) = &self.connect_timeout {
            server.connect_timeout = **timeout;
        }
        if let Some(interval) = &self.tick_interval {
            config.tick_interval = **interval;
        }
        if let Some(user) = &self.user {
            config.user = Some(user.clone());
        }
    }
}

/// What the owning loop does besides ticking
#[derive(Debug)]
struct RunPlan {
    user: String,
    password: String,
    tick_interval: Duration,
    run_for: Option<Duration>,
    outgoing: Option<(Jid, String)>,
}

/// Latest notification seen by the owning loop
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Pending,
    LoggedIn,
    LoginFailed(String),
    SessionLost,
    LoggedOut,
}

/// Records login notifications for the owning loop
#[derive(Debug)]
struct LoginTracker {
    outcome: Mutex<Outcome>,
}

impl LoginTracker {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome::Pending),
        }
    }

    fn set(&self, outcome: Outcome) {
        if let Ok(mut current) = self.outcome.lock() {
            *current = outcome;
        }
    }

    fn get(&self) -> Outcome {
        self.outcome
            .lock()
            .map(|o| o.clone())
            .unwrap_or(Outcome::Pending)
    }
}

impl ConnectionEventHandler for LoginTracker {
    fn on_login_complete(&self, user: &str, success: bool, error: Option<&LoginError>) {
        if success {
            component_info!("session", "Logged in as {}", user);
            self.set(Outcome::LoggedIn);
        } else {
            let reason = error.map(|e| e.to_string()).unwrap_or_default();
            component_error!("session", "Login as {} failed: {}", user, reason);
            self.set(Outcome::LoginFailed(reason));
        }
    }

    fn on_login_changed(&self, user: &str, status: LoginStatus) {
        component_warn!("session", "Session for {} changed to {:?}", user, status);
        if status == LoginStatus::LoggedOut {
            self.set(Outcome::SessionLost);
        }
    }

    fn on_logout_complete(&self, user: &str, success: bool, _error: Option<&LoginError>) {
        component_info!("session", "Logout of {} complete (success={})", user, success);
        self.set(Outcome::LoggedOut);
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("xmpp={}", args.log_level).parse()?)
        .add_directive(format!("xmpp_session={}", args.log_level).parse()?)
        .add_directive(format!("xmpp_stanza={}", args.log_level).parse()?)
        .add_directive(format!("redb_xmpp={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(XmppLogFormatter::new("xmpp".to_string()))
        .init();

    info!("Starting reDB XMPP client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = XmppConfig::load_from_file(&args.config)?;
    args.apply(&mut config);

    let Some(user) = config.user.clone() else {
        bail!("no account given: pass --user, set XMPP_USER, or configure services.xmpp.user");
    };
    let outgoing = match (&args.send_to, &args.message) {
        (Some(to), Some(body)) => {
            let to: Jid = to.parse().with_context(|| format!("invalid --send-to JID {}", to))?;
            Some((to, body.clone()))
        }
        _ => None,
    };
    let plan = RunPlan {
        user,
        password: args.password.clone(),
        tick_interval: config.tick_interval,
        run_for: args.run_for.as_ref().map(|d| **d),
        outgoing,
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let context = ClientContext::new(Handle::current()).with_max_stanza_size(config.max_stanza_size);
    let server = config.server;

    let owner = tokio::task::spawn_blocking(owning_thread(
        server,
        context,
        events_tx,
        events_rx,
        plan,
        shutdown_rx,
    ));
    tokio::pin!(owner);

    let result = tokio::select! {
        result = &mut owner => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            component_info!("cli", "Received Ctrl-C, logging out");
            let _ = shutdown_tx.send(true);
            owner.await
        }
    };

    result.context("connection thread panicked")??;
    info!("XMPP client stopped");
    Ok(())
}

/// Body of the owning thread
///
/// `Connection` is not `Send`, so it is built on the thread that drives it and
/// only its inputs cross over.
fn owning_thread(
    server: ServerConfig,
    context: ClientContext,
    events_tx: FeatureEventSender,
    events_rx: mpsc::UnboundedReceiver<FeatureEvent>,
    plan: RunPlan,
    shutdown: watch::Receiver<bool>,
) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
    move || {
        let handlers = HandlerChain::standard(events_tx, server.keepalive.clone());
        let mut connection = Connection::new(context, handlers);
        connection.set_server(server);
        run_connection(connection, plan, events_rx, shutdown)
    }
}

/// Drive the connection from this thread until shutdown, timeout, or failure
fn run_connection(
    mut connection: Connection,
    plan: RunPlan,
    mut events: mpsc::UnboundedReceiver<FeatureEvent>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let tracker = Arc::new(LoginTracker::new());
    connection.set_event_handler(tracker.clone());
    connection.login(&plan.user, &plan.password);

    let started = Instant::now();
    let mut last_tick = Instant::now();
    let mut outgoing = plan.outgoing;

    loop {
        std::thread::sleep(plan.tick_interval);
        let now = Instant::now();
        connection.tick(now - last_tick);
        last_tick = now;

        while let Ok(event) = events.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }

        match tracker.get() {
            Outcome::LoginFailed(reason) => bail!("login failed: {}", reason),
            Outcome::SessionLost => {
                // Let the deferred logout run before leaving
                connection.tick(Duration::ZERO);
                bail!("session lost");
            }
            Outcome::LoggedIn => {
                if let Some((to, body)) = outgoing.take() {
                    let message = Stanza::builder("message")
                        .attr("to", to.to_string())
                        .attr("type", "chat")
                        .child(Stanza::builder("body").text(&body).build())
                        .build();
                    if connection.send_stanza(message) {
                        component_info!("cli", "Sent message to {}", to);
                    } else {
                        component_warn!("cli", "Could not send message to {}", to);
                    }
                }
            }
            Outcome::Pending | Outcome::LoggedOut => {}
        }

        let expired = plan.run_for.is_some_and(|limit| started.elapsed() >= limit);
        if *shutdown.borrow() || expired {
            if expired {
                component_info!("cli", "Run time elapsed, logging out");
            }
            break;
        }
    }

    connection.logout();
    component_debug!("cli", "Final state {}", connection.login_state());
    Ok(())
}
