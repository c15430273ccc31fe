//! Notification session lifecycle.
//!
//! A [`NotificationSession`] lives from login to logout. It owns the
//! notification center, one hub connection for the current identity, the
//! inbound handler feeding the center and the retention sweeper.

use async_trait::async_trait;
use hub_client::{
    ConnectionState, HubConnection, HubConnectionBuilder, HubError, HubInvocation, HubTransport,
    TokenProvider,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::center::NotificationCenter;
use crate::config::NotificationConfig;
use crate::error::{Error, Result};
use crate::handler::InboundEventHandler;
use crate::sweeper::RetentionSweeper;
use crate::toast::{Toast, ToastPresenter};

/// The authenticated user a connection is routed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// Accessors into the surrounding authentication system.
///
/// Both are read fresh on every connect attempt and never cached.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Current bearer token, `None` when there is none.
    async fn access_token(&self) -> Option<String>;

    /// Current identity, `None` when logged out.
    fn identity(&self) -> Option<Identity>;
}

struct AuthTokens(Arc<dyn AuthProvider>);

#[async_trait]
impl TokenProvider for AuthTokens {
    async fn access_token(&self) -> Option<String> {
        self.0.access_token().await
    }
}

/// Group joins for the identity the auth system reports right now.
fn group_joins(auth: &dyn AuthProvider, config: &NotificationConfig) -> Vec<HubInvocation> {
    let Some(identity) = auth.identity() else {
        return Vec::new();
    };

    let mut joins = vec![HubInvocation::new(
        config.join_user_group_method.clone(),
        vec![json!(identity.user_id)],
    )];
    joins.extend(
        identity
            .roles
            .iter()
            .filter(|role| !role.trim().is_empty())
            .map(|role| {
                HubInvocation::new(config.join_role_group_method.clone(), vec![json!(role)])
            }),
    );
    joins
}

struct ActiveConnection {
    identity: Identity,
    connection: Arc<HubConnection>,
    handler_cancel: CancellationToken,
    handler: JoinHandle<()>,
}

impl ActiveConnection {
    async fn shutdown(self) {
        self.connection.stop().await;
        self.handler_cancel.cancel();
        if let Err(e) = self.handler.await
            && !e.is_cancelled()
        {
            warn!("Inbound event handler ended abnormally: {}", e);
        }
        debug!(user_id = %self.identity.user_id, "Notification connection released");
    }
}

pub struct NotificationSession {
    config: Arc<NotificationConfig>,
    auth: Arc<dyn AuthProvider>,
    transport: Arc<dyn HubTransport>,
    toasts: Arc<dyn ToastPresenter>,
    center: NotificationCenter,
    active: tokio::sync::Mutex<Option<ActiveConnection>>,
    sweeper: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    cancel: CancellationToken,
}

impl NotificationSession {
    /// Create a session. Nothing connects until [`start`](Self::start).
    pub fn new(
        config: NotificationConfig,
        auth: Arc<dyn AuthProvider>,
        transport: Arc<dyn HubTransport>,
        toasts: Arc<dyn ToastPresenter>,
    ) -> Result<Self> {
        config.validate()?;
        let center = NotificationCenter::new(config.max_notifications);

        Ok(Self {
            config: Arc::new(config),
            auth,
            transport,
            toasts,
            center,
            active: tokio::sync::Mutex::new(None),
            sweeper: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.center.connection_state()
    }

    /// Identity the current connection was opened for.
    pub async fn connected_identity(&self) -> Option<Identity> {
        self.active.lock().await.as_ref().map(|a| a.identity.clone())
    }

    /// Connect for the current identity and start the sweeper.
    ///
    /// Connection failures are retried in the background and only show up in
    /// the connection state. Errors only when no identity is available.
    pub async fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::session("session was logged out"));
        }

        self.start_sweeper();

        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("Notification session already started");
            return Ok(());
        }

        let identity = self
            .auth
            .identity()
            .ok_or_else(|| Error::session("no authenticated identity"))?;
        *active = Some(self.connect(identity)?);
        Ok(())
    }

    /// Manually restart a connection that gave up reconnecting.
    pub async fn restart(&self) -> Result<()> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(active) => Ok(active.connection.restart().await?),
            None => Err(Error::Hub(HubError::NotConnected)),
        }
    }

    /// Reconnect when the authenticated identity changed.
    ///
    /// Returns `true` when the connection was replaced or released.
    pub async fn refresh_identity(&self) -> Result<bool> {
        let current = self.auth.identity();
        let mut active = self.active.lock().await;

        if active.as_ref().map(|a| &a.identity) == current.as_ref() {
            return Ok(false);
        }

        if let Some(previous) = active.take() {
            info!(user_id = %previous.identity.user_id, "Identity changed, closing notification connection");
            previous.shutdown().await;
        }

        if let Some(identity) = current
            && !self.cancel.is_cancelled()
        {
            *active = Some(self.connect(identity)?);
        } else {
            self.center.set_connection_state(ConnectionState::Disconnected);
        }
        Ok(true)
    }

    /// Round-trip a no-op hub method. Failures also show an error toast.
    pub async fn test_connection(&self) -> Result<()> {
        let method = self.config.test_connection_method.clone();
        self.diagnostic(&method, "Connection test failed").await?;
        info!("Hub connection test succeeded");
        Ok(())
    }

    /// Ask the hub to push one notification back through the normal path.
    pub async fn test_notification(&self) -> Result<()> {
        let method = self.config.test_notification_method.clone();
        self.diagnostic(&method, "Test notification failed").await?;
        info!("Test notification requested");
        Ok(())
    }

    /// Release the connection and stop background tasks. The store is kept.
    pub async fn stop(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.shutdown().await;
        }
        self.center.set_connection_state(ConnectionState::Disconnected);

        let sweeper = self.sweeper.lock().take();
        if let Some((token, handle)) = sweeper {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Retention sweeper ended abnormally: {}", e);
            }
        }
    }

    /// Stop everything and clear the store.
    pub async fn logout(&self) {
        self.cancel.cancel();
        self.stop().await;
        let cleared = self.center.clear_all_notifications();
        info!(cleared, "Notification session ended");
    }

    async fn diagnostic(&self, method: &str, failure_title: &str) -> Result<Value> {
        let connection = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.connection.clone());
        let result = match connection {
            Some(connection) => connection.invoke(method, Vec::new()).await,
            None => Err(HubError::NotConnected),
        };

        result.map_err(|e| {
            warn!(method, "Hub diagnostic failed: {}", e);
            self.toasts
                .show(Toast::ephemeral_error(failure_title, e.to_string()));
            Error::from(e)
        })
    }

    fn connect(&self, identity: Identity) -> Result<ActiveConnection> {
        let config = self.config.clone();
        let auth = self.auth.clone();

        let (connection, messages) = HubConnectionBuilder::new(config.hub_url.clone())
            .with_token_provider(Arc::new(AuthTokens(self.auth.clone())))
            .with_resubscribe(move || group_joins(auth.as_ref(), &config))
            .with_reconnect_policy(self.config.reconnect_policy())
            .with_start_retry_interval(self.config.start_retry_interval())
            .with_keep_alive_interval(self.config.keep_alive_interval())
            .with_server_timeout(self.config.server_timeout())
            .with_inbound_capacity(self.config.inbound_buffer)
            .start(self.transport.clone())?;

        let handler = InboundEventHandler::new(
            self.center.clone(),
            self.toasts.clone(),
            self.config.receive_target.clone(),
        );
        let handler_cancel = self.cancel.child_token();
        let state_rx = connection.watch_state();
        let handler = tokio::spawn(handler.run(messages, state_rx, handler_cancel.clone()));

        info!(user_id = %identity.user_id, roles = ?identity.roles, "Notification connection started");
        Ok(ActiveConnection {
            identity,
            connection: Arc::new(connection),
            handler_cancel,
            handler,
        })
    }

    fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        let token = self.cancel.child_token();
        let handle = RetentionSweeper::new(self.center.clone())
            .with_interval(self.config.sweep_interval())
            .with_horizon(self.config.retention_horizon())
            .spawn(token.clone());
        *sweeper = Some((token, handle));
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
