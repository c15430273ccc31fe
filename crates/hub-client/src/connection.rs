//! Supervised hub connection.
//!
//! A [`HubConnection`] owns exactly one background task which owns the
//! transport link. The task:
//! - connects with a token resolved fresh from the [`TokenProvider`],
//!   retrying the initial connect every `start_retry_interval` until stopped
//! - re-issues the re-subscription invocations after every (re)connect,
//!   before publishing `Connected`
//! - forwards inbound invocations, in arrival order, to a single consumer
//! - reconnects after a drop using the fixed [`ReconnectPolicy`] sequence and
//!   settles into `Disconnected` once it is exhausted
//! - releases the link on every exit path (stop, drop of the handle, server close)

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{HubError, Result};
use crate::policy::{DEFAULT_START_RETRY_INTERVAL, ReconnectPolicy};
use crate::protocol::HubMessage;
use crate::state::{ConnectionCounters, ConnectionState, ConnectionStats};
use crate::transport::{HubLink, HubTransport, TokenProvider, with_access_token};

/// Default keep-alive ping interval.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default time without any server traffic before the link is considered dead.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the inbound message channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

/// Capacity of the handle -> task command channel.
const COMMAND_CAPACITY: usize = 32;

/// A method call issued to the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct HubInvocation {
    pub target: String,
    pub arguments: Vec<Value>,
}

impl HubInvocation {
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }
}

/// Produces the invocations to re-issue after every successful connect.
pub type Resubscribe = Arc<dyn Fn() -> Vec<HubInvocation> + Send + Sync>;

/// A server-originated invocation delivered to the consumer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Client method the hub invoked.
    pub target: String,
    /// Positional arguments, untouched.
    pub arguments: Vec<Value>,
    /// When the message came off the link.
    pub received_at: DateTime<Utc>,
}

/// The single consumer side of a connection's inbound messages.
#[derive(Debug)]
pub struct HubMessages {
    rx: mpsc::Receiver<InboundMessage>,
}

impl HubMessages {
    /// Next inbound message, in arrival order. `None` once the connection task ended.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

enum Command {
    Invoke {
        invocation: HubInvocation,
        reply: oneshot::Sender<Result<Value>>,
    },
    Send {
        invocation: HubInvocation,
        reply: oneshot::Sender<Result<()>>,
    },
    Restart,
}

impl Command {
    /// Answer a command that arrived while no link is established.
    fn reject(self) {
        match self {
            Self::Invoke { reply, .. } => {
                let _ = reply.send(Err(HubError::NotConnected));
            }
            Self::Send { reply, .. } => {
                let _ = reply.send(Err(HubError::NotConnected));
            }
            Self::Restart => {}
        }
    }
}

/// Builder for a [`HubConnection`].
pub struct HubConnectionBuilder {
    url: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
    resubscribe: Option<Resubscribe>,
    reconnect_policy: ReconnectPolicy,
    start_retry_interval: Duration,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    inbound_capacity: usize,
}

impl HubConnectionBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token_provider: None,
            resubscribe: None,
            reconnect_policy: ReconnectPolicy::default(),
            start_retry_interval: DEFAULT_START_RETRY_INTERVAL,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Invocations to re-issue after every connect (group joins).
    pub fn with_resubscribe<F>(mut self, resubscribe: F) -> Self
    where
        F: Fn() -> Vec<HubInvocation> + Send + Sync + 'static,
    {
        self.resubscribe = Some(Arc::new(resubscribe));
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn with_start_retry_interval(mut self, interval: Duration) -> Self {
        self.start_retry_interval = interval;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Spawn the connection task.
    ///
    /// Must be called from within a tokio runtime. Connection failures never
    /// surface here; they are retried and reflected in the connection state.
    /// Invalid settings (bad URL, zero timers) are rejected before spawning.
    pub fn start(self, transport: Arc<dyn HubTransport>) -> Result<(HubConnection, HubMessages)> {
        self.validate()?;
        let url = Url::parse(&self.url)?;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.inbound_capacity);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let cancel = CancellationToken::new();
        let counters = Arc::new(ConnectionCounters::default());

        let task = ConnectionTask {
            url,
            transport,
            token_provider: self.token_provider,
            resubscribe: self.resubscribe,
            reconnect_policy: self.reconnect_policy,
            start_retry_interval: self.start_retry_interval,
            keep_alive_interval: self.keep_alive_interval,
            server_timeout: self.server_timeout,
            state_tx,
            inbound_tx,
            command_rx,
            cancel: cancel.clone(),
            counters: counters.clone(),
            next_invocation_id: 0,
        };

        info!(url = %self.url, transport = task.transport.name(), "Starting hub connection");
        let handle = tokio::spawn(task.run());

        Ok((
            HubConnection {
                command_tx,
                state_rx,
                cancel,
                task: Mutex::new(Some(handle)),
                counters,
            },
            HubMessages { rx: inbound_rx },
        ))
    }

    fn validate(&self) -> Result<()> {
        let timers = [
            ("start retry interval", self.start_retry_interval),
            ("keep-alive interval", self.keep_alive_interval),
            ("server timeout", self.server_timeout),
        ];
        for (name, value) in timers {
            if value.is_zero() {
                return Err(HubError::config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Handle to a running hub connection.
///
/// Dropping the handle stops the connection task and releases the link.
pub struct HubConnection {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<ConnectionCounters>,
}

impl HubConnection {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }

    /// Invoke a hub method and wait for its completion.
    ///
    /// Errors are returned to the caller and never retried.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Invoke {
                invocation: HubInvocation::new(target, arguments),
                reply,
            })
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)?
    }

    /// Invoke a hub method without waiting for a completion.
    pub async fn send(&self, target: &str, arguments: Vec<Value>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send {
                invocation: HubInvocation::new(target, arguments),
                reply,
            })
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)?
    }

    /// Manually restart a connection that settled into `Disconnected`.
    ///
    /// No-op in any other state.
    pub async fn restart(&self) -> Result<()> {
        self.command_tx
            .send(Command::Restart)
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Stop the connection task and wait until the link is released.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!("Hub connection task ended abnormally: {}", e);
        }
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why a link's session loop ended.
enum LinkEnd {
    /// Stop requested.
    Cancelled,
    /// The link was lost; whether the hub allows reconnecting.
    Lost { allow_reconnect: bool },
}

/// Outcome of the automatic reconnect sequence.
enum Reconnect {
    Connected(Box<dyn HubLink>),
    Exhausted,
    Cancelled,
}

struct ConnectionTask {
    url: Url,
    transport: Arc<dyn HubTransport>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    resubscribe: Option<Resubscribe>,
    reconnect_policy: ReconnectPolicy,
    start_retry_interval: Duration,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    command_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    counters: Arc<ConnectionCounters>,
    next_invocation_id: u64,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut link = match self.establish().await {
            Some(link) => link,
            None => return self.finish(),
        };

        loop {
            let end = self.drive(link.as_mut()).await;
            link.close().await;

            let allow_reconnect = match end {
                LinkEnd::Cancelled => break,
                LinkEnd::Lost { allow_reconnect } => allow_reconnect,
            };

            let next = if allow_reconnect {
                self.reconnect().await
            } else {
                Reconnect::Exhausted
            };

            link = match next {
                Reconnect::Connected(link) => link,
                Reconnect::Cancelled => break,
                Reconnect::Exhausted => {
                    self.set_state(ConnectionState::Disconnected);
                    info!("Hub connection disconnected; waiting for a manual restart");
                    if !self.wait_for_restart().await {
                        break;
                    }
                    match self.establish().await {
                        Some(link) => link,
                        None => break,
                    }
                }
            };
        }

        self.finish();
    }

    fn finish(&self) {
        self.set_state(ConnectionState::Disconnected);
        debug!("Hub connection task for {} stopped", self.url.path());
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Hub connection state changed");
        }
    }

    fn next_id(&mut self) -> String {
        self.next_invocation_id += 1;
        self.next_invocation_id.to_string()
    }

    /// Initial connect (or manual restart): retry at a fixed interval until stopped.
    async fn establish(&mut self) -> Option<Box<dyn HubLink>> {
        self.set_state(ConnectionState::Connecting);
        let cancel = self.cancel.clone();

        loop {
            let attempt = tokio::select! {
                result = self.connect_once(false) => result,
                _ = cancel.cancelled() => return None,
            };

            match attempt {
                Ok(link) => return Some(link),
                Err(e) => {
                    warn!(
                        "Hub connection failed, retrying in {:?}: {}",
                        self.start_retry_interval, e
                    );
                    if !self.sleep_serving_commands(self.start_retry_interval).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Automatic reconnect after a drop, following the policy's delays.
    async fn reconnect(&mut self) -> Reconnect {
        self.set_state(ConnectionState::Reconnecting);
        let cancel = self.cancel.clone();

        for attempt in 0..self.reconnect_policy.max_attempts() {
            let Some(delay) = self.reconnect_policy.delay_for_attempt(attempt) else {
                break;
            };
            if !self.sleep_serving_commands(delay).await {
                return Reconnect::Cancelled;
            }

            let result = tokio::select! {
                result = self.connect_once(true) => result,
                _ = cancel.cancelled() => return Reconnect::Cancelled,
            };

            match result {
                Ok(link) => return Reconnect::Connected(link),
                Err(e) => warn!(
                    attempt = attempt + 1,
                    max_attempts = self.reconnect_policy.max_attempts(),
                    "Hub reconnect attempt failed: {}",
                    e
                ),
            }
        }

        warn!("Hub reconnect attempts exhausted");
        Reconnect::Exhausted
    }

    /// One connect attempt: fresh token, transport connect, re-subscriptions.
    async fn connect_once(&mut self, is_reconnect: bool) -> Result<Box<dyn HubLink>> {
        let token = match &self.token_provider {
            Some(provider) => provider.access_token().await,
            None => None,
        };
        let url = with_access_token(&self.url, token.as_deref());

        let mut link = self.transport.connect(&url).await?;
        if let Err(e) = self.resubscribe(link.as_mut()).await {
            link.close().await;
            return Err(e);
        }

        self.counters.record_connect(is_reconnect);
        self.set_state(ConnectionState::Connected);
        Ok(link)
    }

    /// Issue every re-subscription invocation and wait for its completion.
    ///
    /// Server invocations arriving meanwhile are delivered in order.
    async fn resubscribe(&mut self, link: &mut dyn HubLink) -> Result<()> {
        let Some(resubscribe) = self.resubscribe.clone() else {
            return Ok(());
        };

        for invocation in resubscribe() {
            let id = self.next_id();
            debug!(target_method = %invocation.target, "Re-issuing hub subscription");
            link.send(HubMessage::invocation(
                Some(id.clone()),
                invocation.target.clone(),
                invocation.arguments,
            ))
            .await?;

            loop {
                let message = match tokio::time::timeout(self.server_timeout, link.recv()).await {
                    Ok(Some(message)) => message?,
                    Ok(None) => return Err(HubError::ConnectionLost),
                    Err(_) => {
                        return Err(HubError::connection(format!(
                            "no completion for {} within {:?}",
                            invocation.target, self.server_timeout
                        )));
                    }
                };

                match message {
                    HubMessage::Completion {
                        invocation_id,
                        error,
                        ..
                    } if invocation_id == id => match error {
                        Some(error) => {
                            return Err(HubError::invocation(format!(
                                "{}: {}",
                                invocation.target, error
                            )));
                        }
                        None => break,
                    },
                    HubMessage::Invocation {
                        target, arguments, ..
                    } => self.deliver(target, arguments).await,
                    HubMessage::Close { error, .. } => {
                        return Err(HubError::connection(format!(
                            "hub closed during subscription: {}",
                            error.unwrap_or_default()
                        )));
                    }
                    HubMessage::Completion { invocation_id, .. } => {
                        debug!(%invocation_id, "Ignoring unexpected completion");
                    }
                    HubMessage::Ping => {}
                }
            }
        }

        Ok(())
    }

    /// Hand a server invocation to the consumer. Applies backpressure.
    async fn deliver(&self, target: String, arguments: Vec<Value>) {
        self.counters.record_message();
        let message = InboundMessage {
            target,
            arguments,
            received_at: Utc::now(),
        };
        if self.inbound_tx.send(message).await.is_err() {
            debug!("Inbound consumer gone, dropping hub message");
        }
    }

    /// Serve one established link until it ends.
    async fn drive(&mut self, link: &mut dyn HubLink) -> LinkEnd {
        let cancel = self.cancel.clone();
        let mut pending: HashMap<String, oneshot::Sender<Result<Value>>> = HashMap::new();

        let mut keep_alive = tokio::time::interval_at(
            Instant::now() + self.keep_alive_interval,
            self.keep_alive_interval,
        );
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let idle = tokio::time::sleep(self.server_timeout);
        tokio::pin!(idle);

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break LinkEnd::Cancelled,

                command = self.command_rx.recv() => match command {
                    Some(Command::Invoke { invocation, reply }) => {
                        let id = self.next_id();
                        let message = HubMessage::invocation(
                            Some(id.clone()),
                            invocation.target,
                            invocation.arguments,
                        );
                        if let Err(e) = link.send(message).await {
                            warn!("Failed to send invocation: {}", e);
                            let _ = reply.send(Err(HubError::ConnectionLost));
                            break LinkEnd::Lost { allow_reconnect: true };
                        }
                        pending.insert(id, reply);
                    }
                    Some(Command::Send { invocation, reply }) => {
                        let message =
                            HubMessage::invocation(None, invocation.target, invocation.arguments);
                        match link.send(message).await {
                            Ok(()) => {
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                warn!("Failed to send message: {}", e);
                                let _ = reply.send(Err(HubError::ConnectionLost));
                                break LinkEnd::Lost { allow_reconnect: true };
                            }
                        }
                    }
                    Some(Command::Restart) => debug!("Restart requested while connected, ignoring"),
                    None => break LinkEnd::Cancelled,
                },

                _ = keep_alive.tick() => {
                    if let Err(e) = link.send(HubMessage::Ping).await {
                        warn!("Failed to send keep-alive: {}", e);
                        break LinkEnd::Lost { allow_reconnect: true };
                    }
                    trace!("Sent hub keep-alive");
                }

                _ = &mut idle => {
                    warn!("No hub traffic for {:?}, treating link as lost", self.server_timeout);
                    break LinkEnd::Lost { allow_reconnect: true };
                }

                message = link.recv() => {
                    idle.as_mut().reset(Instant::now() + self.server_timeout);
                    match message {
                        Some(Ok(HubMessage::Invocation { target, arguments, .. })) => {
                            self.deliver(target, arguments).await;
                        }
                        Some(Ok(HubMessage::Completion { invocation_id, result, error })) => {
                            match pending.remove(&invocation_id) {
                                Some(reply) => {
                                    let outcome = match error {
                                        Some(error) => Err(HubError::invocation(error)),
                                        None => Ok(result.unwrap_or(Value::Null)),
                                    };
                                    let _ = reply.send(outcome);
                                }
                                None => debug!(%invocation_id, "Completion for unknown invocation"),
                            }
                        }
                        Some(Ok(HubMessage::Ping)) => trace!("Received hub keep-alive"),
                        Some(Ok(HubMessage::Close { error, allow_reconnect })) => {
                            match error {
                                Some(error) => warn!(allow_reconnect, "Hub closed the connection: {}", error),
                                None => info!(allow_reconnect, "Hub closed the connection"),
                            }
                            break LinkEnd::Lost { allow_reconnect };
                        }
                        Some(Err(e)) => {
                            warn!("Hub link error: {}", e);
                            break LinkEnd::Lost { allow_reconnect: true };
                        }
                        None => {
                            warn!("Hub link closed");
                            break LinkEnd::Lost { allow_reconnect: true };
                        }
                    }
                }
            }
        };

        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(HubError::ConnectionLost));
        }
        end
    }

    /// Sleep while answering commands with `NotConnected`. Returns `false` when stopped.
    async fn sleep_serving_commands(&mut self, duration: Duration) -> bool {
        let cancel = self.cancel.clone();
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = cancel.cancelled() => return false,
                command = self.command_rx.recv() => match command {
                    Some(command) => command.reject(),
                    None => return false,
                },
            }
        }
    }

    /// Park in `Disconnected` until a manual restart. Returns `false` when stopped.
    async fn wait_for_restart(&mut self) -> bool {
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                command = self.command_rx.recv() => match command {
                    Some(Command::Restart) => {
                        info!("Manual hub restart requested");
                        return true;
                    }
                    Some(command) => command.reject(),
                    None => return false,
                },
            }
        }
    }
}
