//! Bridge from hub messages to the notification center.

use hub_client::{ConnectionState, HubMessages, InboundMessage};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::center::NotificationCenter;
use crate::error::{Error, Result};
use crate::model::{NewNotification, NotificationRecord, ServerNotification};
use crate::toast::{Toast, ToastPresenter};

/// Normalizes pushed notifications, stores them and shows their toasts.
///
/// The handler is the only reader of a connection's [`HubMessages`], so
/// notifications are applied one at a time in arrival order.
pub struct InboundEventHandler {
    center: NotificationCenter,
    toasts: Arc<dyn ToastPresenter>,
    receive_target: String,
}

impl InboundEventHandler {
    pub fn new(
        center: NotificationCenter,
        toasts: Arc<dyn ToastPresenter>,
        receive_target: impl Into<String>,
    ) -> Self {
        Self {
            center,
            toasts,
            receive_target: receive_target.into(),
        }
    }

    /// Consume messages until cancelled or the connection ends, mirroring the
    /// connection state into the center.
    pub async fn run(
        self,
        mut messages: HubMessages,
        mut state_rx: watch::Receiver<ConnectionState>,
        cancel: CancellationToken,
    ) {
        self.center.set_connection_state(*state_rx.borrow_and_update());
        let mut watching_state = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                message = messages.recv() => match message {
                    Some(message) => {
                        self.handle(message);
                    }
                    None => break,
                },

                changed = state_rx.changed(), if watching_state => match changed {
                    Ok(()) => {
                        let state = *state_rx.borrow_and_update();
                        self.center.set_connection_state(state);
                    }
                    Err(_) => watching_state = false,
                },
            }
        }

        debug!("Inbound event handler stopped");
    }

    /// Decode the notification carried by a message.
    ///
    /// `Ok(None)` for messages addressed to another client method.
    pub fn decode(&self, message: InboundMessage) -> Result<Option<NewNotification>> {
        if message.target != self.receive_target {
            debug!(target_method = %message.target, "Ignoring hub message for another method");
            return Ok(None);
        }

        let payload = message
            .arguments
            .into_iter()
            .next()
            .ok_or_else(|| Error::Other("notification message without payload".to_string()))?;
        let notification: ServerNotification = serde_json::from_value(payload)?;

        let mut new = NewNotification::from(notification);
        if new.created_at.is_none() {
            new.created_at = Some(message.received_at);
        }
        Ok(Some(new))
    }

    /// Apply one inbound message. Returns the stored record, if any.
    pub fn handle(&self, message: InboundMessage) -> Option<NotificationRecord> {
        let new = match self.decode(message) {
            Ok(Some(new)) => new,
            Ok(None) => return None,
            Err(e) => {
                warn!("Dropping notification message: {}", e);
                return None;
            }
        };

        let record = self.center.add(new)?;
        if record.interactive {
            self.toasts.show(Toast::from_record(&record));
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationType;
    use crate::toast::ChannelToasts;
    use chrono::Utc;
    use serde_json::{Value, json};

    fn inbound(target: &str, arguments: Vec<Value>) -> InboundMessage {
        InboundMessage {
            target: target.to_string(),
            arguments,
            received_at: Utc::now(),
        }
    }

    fn handler() -> (
        InboundEventHandler,
        NotificationCenter,
        tokio::sync::mpsc::UnboundedReceiver<Toast>,
    ) {
        let center = NotificationCenter::default();
        let (toasts, rx) = ChannelToasts::new();
        let handler =
            InboundEventHandler::new(center.clone(), Arc::new(toasts), "ReceiveNotification");
        (handler, center, rx)
    }

    #[test]
    fn test_stores_and_toasts() {
        let (handler, center, mut toasts) = handler();

        let payload = json!({
            "id": "n1",
            "title": "Hi",
            "message": "There",
            "type": "EventCreated"
        });
        let record = handler.handle(inbound("ReceiveNotification", vec![payload])).unwrap();

        assert_eq!(record.notification_type, NotificationType::EventCreated);
        assert!(!record.read);
        assert_eq!(center.unread_count(), 1);
        assert_eq!(toasts.try_recv().unwrap().notification_id.as_deref(), Some("n1"));
    }

    #[test]
    fn test_receipt_time_when_server_sends_none() {
        let (handler, _center, _toasts) = handler();
        let message = inbound("ReceiveNotification", vec![json!({ "message": "m" })]);
        let received_at = message.received_at;

        let record = handler.handle(message).unwrap();
        assert_eq!(record.created_at, received_at);
        assert_eq!(record.notification_type, NotificationType::Info);
    }

    #[test]
    fn test_non_interactive_is_stored_silently() {
        let (handler, center, mut toasts) = handler();
        handler.handle(inbound(
            "ReceiveNotification",
            vec![json!({ "message": "quiet", "interactive": false })],
        ));

        assert_eq!(center.len(), 1);
        assert!(toasts.try_recv().is_err());
    }

    #[test]
    fn test_ignores_other_targets_and_bad_payloads() {
        let (handler, center, mut toasts) = handler();

        assert!(handler.handle(inbound("SomethingElse", vec![json!({})])).is_none());
        assert!(handler.handle(inbound("ReceiveNotification", vec![])).is_none());
        assert!(
            handler
                .handle(inbound("ReceiveNotification", vec![json!("not an object")]))
                .is_none()
        );

        assert!(center.is_empty());
        assert!(toasts.try_recv().is_err());
    }

    #[test]
    fn test_decode_errors() {
        let (handler, _center, _toasts) = handler();

        assert!(matches!(
            handler.decode(inbound("ReceiveNotification", vec![json!(42)])),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            handler.decode(inbound("ReceiveNotification", vec![])),
            Err(Error::Other(_))
        ));
        assert!(matches!(
            handler.decode(inbound("SomethingElse", vec![json!({})])),
            Ok(None)
        ));
    }

    #[test]
    fn test_duplicate_delivery_toasts_once() {
        let (handler, center, mut toasts) = handler();
        let payload = json!({ "id": "dup", "message": "m" });

        handler.handle(inbound("ReceiveNotification", vec![payload.clone()]));
        handler.handle(inbound("ReceiveNotification", vec![payload]));

        assert_eq!(center.unread_count(), 1);
        assert!(toasts.try_recv().is_ok());
        assert!(toasts.try_recv().is_err());
    }
}
