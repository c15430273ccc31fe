//! End-to-end session tests over the in-memory hub.

use async_trait::async_trait;
use hub_client::{HubError, MemoryTransport};
use notify_center::{
    AuthProvider, ChannelToasts, ConnectionState, Error, Identity, NotificationConfig,
    NotificationSession, NotificationType, StoreChange, Toast, ToastSeverity,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const HUB_URL: &str = "https://events.example.com/hubs/notifications";

#[derive(Default)]
struct TestAuth {
    token: Mutex<Option<String>>,
    identity: Mutex<Option<Identity>>,
}

impl TestAuth {
    fn new(identity: Identity) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some("secret".to_string())),
            identity: Mutex::new(Some(identity)),
        })
    }

    fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.lock() = identity;
    }
}

#[async_trait]
impl AuthProvider for TestAuth {
    async fn access_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }
}

struct Harness {
    session: NotificationSession,
    transport: MemoryTransport,
    auth: Arc<TestAuth>,
    toasts: UnboundedReceiver<Toast>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn harness(identity: Identity) -> Harness {
    init_tracing();
    let transport = MemoryTransport::new();
    let auth = TestAuth::new(identity);
    let (toasts, toast_rx) = ChannelToasts::new();

    let session = NotificationSession::new(
        NotificationConfig::new(HUB_URL),
        auth.clone(),
        Arc::new(transport.clone()),
        Arc::new(toasts),
    )
    .unwrap();

    Harness {
        session,
        transport,
        auth,
        toasts: toast_rx,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

async fn wait_connected(session: &NotificationSession) {
    let mut rx = session.center().watch_connection_state();
    tokio::time::timeout(
        Duration::from_secs(600),
        rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("timed out waiting for Connected")
    .expect("state channel closed");
}

fn admin() -> Identity {
    Identity::new("user-1").with_role("Admin")
}

#[tokio::test(start_paused = true)]
async fn start_joins_user_and_role_groups() {
    let h = harness(admin());
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    let user_joins = h.transport.received_for("JoinUserGroup");
    let role_joins = h.transport.received_for("JoinRoleGroup");
    assert_eq!(user_joins.len(), 1);
    assert_eq!(user_joins[0].arguments, vec![json!("user-1")]);
    assert_eq!(role_joins.len(), 1);
    assert_eq!(role_joins[0].arguments, vec![json!("Admin")]);
    assert!(
        h.transport.connect_urls()[0]
            .as_str()
            .ends_with("access_token=secret")
    );

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn user_without_role_only_joins_user_group() {
    let h = harness(Identity::new("user-2"));
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    assert_eq!(h.transport.received_for("JoinUserGroup").len(), 1);
    assert!(h.transport.received_for("JoinRoleGroup").is_empty());

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn pushed_notification_is_stored_and_toasted() {
    let mut h = harness(admin());
    let mut changes = h.session.center().subscribe();
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    assert!(h.transport.push(
        "ReceiveNotification",
        vec![json!({
            "id": "n1",
            "title": "Event created",
            "message": "Rust meetup is live",
            "type": "EventCreated",
            "actionUrl": "/events/7"
        })],
    ));

    let center = h.session.center().clone();
    wait_until(|| center.len() == 1).await;

    let record = center.get("n1").unwrap();
    assert_eq!(record.notification_type, NotificationType::EventCreated);
    assert_eq!(record.action_url.as_deref(), Some("/events/7"));
    assert_eq!(center.unread_count(), 1);

    let toast = h.toasts.recv().await.unwrap();
    assert_eq!(toast.notification_id.as_deref(), Some("n1"));
    assert_eq!(toast.severity, ToastSeverity::Success);

    let mut saw_added = false;
    while let Ok(change) = changes.try_recv() {
        if matches!(change, StoreChange::Added { ref notification } if notification.id == "n1") {
            saw_added = true;
        }
    }
    assert!(saw_added);

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_rejoins_groups_with_fresh_identity() {
    let h = harness(admin());
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    // Role changes between connects are picked up by the next join.
    h.auth
        .set_identity(Some(Identity::new("user-1").with_role("Organizer")));
    assert!(h.transport.drop_link());

    let transport = h.transport.clone();
    wait_until(|| transport.received_for("JoinUserGroup").len() == 2).await;
    wait_connected(&h.session).await;

    let role_joins = h.transport.received_for("JoinRoleGroup");
    assert_eq!(role_joins.len(), 2);
    assert_eq!(role_joins[1].arguments, vec![json!("Organizer")]);

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn connection_state_is_mirrored_into_center() {
    let h = harness(admin());
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);

    h.transport.refuse_next_connects(1);
    h.session.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.session.connection_state(), ConnectionState::Connecting);

    wait_connected(&h.session).await;
    assert_eq!(h.session.center().snapshot().connection_state, ConnectionState::Connected);

    h.session.stop().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn center_sees_reconnecting_between_connects() {
    let h = harness(admin());
    let mut changes = h.session.center().subscribe();
    let mut state_rx = h.session.center().watch_connection_state();
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    // The immediate retry is refused, so the next attempt waits 2s.
    h.transport.refuse_next_connects(1);
    assert!(h.transport.drop_link());
    tokio::time::timeout(
        Duration::from_secs(600),
        state_rx.wait_for(|s| *s == ConnectionState::Reconnecting),
    )
    .await
    .expect("timed out waiting for Reconnecting")
    .expect("state channel closed");

    let transport = h.transport.clone();
    wait_until(|| transport.received_for("JoinUserGroup").len() == 2).await;
    wait_connected(&h.session).await;

    let mut states = Vec::new();
    while let Ok(change) = changes.try_recv() {
        if let StoreChange::ConnectionState { state } = change {
            states.push(state);
        }
    }
    assert!(
        states.windows(3).any(|w| w
            == [
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connected,
            ]),
        "unexpected state sequence: {states:?}"
    );

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_round_trips() {
    let mut h = harness(admin());
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    h.session.test_connection().await.unwrap();

    assert_eq!(h.transport.received_for("TestConnection").len(), 1);
    assert!(h.toasts.try_recv().is_err());

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_diagnostic_shows_ephemeral_error_toast() {
    let mut h = harness(admin());
    h.transport.fail_invocations("TestConnection", "hub rejected the call");
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    let err = h.session.test_connection().await.unwrap_err();
    assert!(matches!(err, Error::Hub(HubError::Invocation(_))));

    let toast = h.toasts.recv().await.unwrap();
    assert!(toast.is_ephemeral());
    assert_eq!(toast.severity, ToastSeverity::Error);
    assert!(toast.message.contains("hub rejected the call"));
    assert!(h.session.center().is_empty());

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn diagnostics_fail_when_not_started() {
    let mut h = harness(admin());

    let err = h.session.test_notification().await.unwrap_err();
    assert!(matches!(err, Error::Hub(HubError::NotConnected)));
    assert!(h.toasts.recv().await.unwrap().is_ephemeral());
}

#[tokio::test(start_paused = true)]
async fn test_notification_arrives_through_inbound_path() {
    let h = harness(admin());
    h.transport.push_on_invoke(
        "SendTestNotification",
        "ReceiveNotification",
        vec![json!({ "title": "Test", "message": "Hello from the hub", "type": "Info" })],
    );
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    h.session.test_notification().await.unwrap();

    let center = h.session.center().clone();
    wait_until(|| center.len() == 1).await;
    let snapshot = center.snapshot();
    assert_eq!(snapshot.notifications[0].title, "Test");
    assert_eq!(snapshot.unread_count, 1);

    h.session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn identity_change_replaces_the_connection() {
    let h = harness(admin());
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    assert!(!h.session.refresh_identity().await.unwrap());

    h.auth.set_identity(Some(Identity::new("user-9")));
    assert!(h.session.refresh_identity().await.unwrap());
    wait_connected(&h.session).await;

    let user_joins = h.transport.received_for("JoinUserGroup");
    assert_eq!(user_joins.len(), 2);
    assert_eq!(user_joins[1].arguments, vec![json!("user-9")]);
    assert_eq!(h.transport.connect_urls().len(), 2);
    assert_eq!(
        h.session.connected_identity().await,
        Some(Identity::new("user-9"))
    );

    h.auth.set_identity(None);
    assert!(h.session.refresh_identity().await.unwrap());
    assert!(!h.transport.has_link());
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn logout_releases_everything_and_clears_store() {
    let h = harness(admin());
    h.session.start().await.unwrap();
    wait_connected(&h.session).await;

    h.transport
        .push("ReceiveNotification", vec![json!({ "id": "n1", "message": "m" })]);
    let center = h.session.center().clone();
    wait_until(|| center.len() == 1).await;

    h.session.logout().await;

    assert!(!h.transport.has_link());
    assert!(center.is_empty());
    assert_eq!(center.unread_count(), 0);
    assert_eq!(center.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(h.session.start().await, Err(Error::Session(_))));
}

#[tokio::test(start_paused = true)]
async fn start_without_identity_fails() {
    let h = harness(admin());
    h.auth.set_identity(None);
    assert!(matches!(h.session.start().await, Err(Error::Session(_))));
}

#[test]
fn invalid_config_is_rejected() {
    let (toasts, _rx) = ChannelToasts::new();
    let result = NotificationSession::new(
        NotificationConfig::new(""),
        TestAuth::new(admin()),
        Arc::new(MemoryTransport::new()),
        Arc::new(toasts),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn zero_keep_alive_is_rejected_before_connecting() {
    let config = NotificationConfig::from_toml_str(&format!(
        "hub_url = \"{HUB_URL}\"\nkeep_alive_interval_ms = 0"
    ))
    .unwrap();
    let transport = MemoryTransport::new();
    let (toasts, _rx) = ChannelToasts::new();

    let result = NotificationSession::new(
        config,
        TestAuth::new(admin()),
        Arc::new(transport.clone()),
        Arc::new(toasts),
    );

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert!(transport.connect_urls().is_empty());
}
