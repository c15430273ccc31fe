//! In-process hub for tests and local demos.
//!
//! [`MemoryTransport`] plays the server side of the protocol: it completes
//! every invocation, answers keep-alives unless told to go silent, records
//! what the client sent and lets the caller push messages, fail connects, or
//! drop the current link.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use crate::connection::HubInvocation;
use crate::error::{HubError, Result};
use crate::protocol::HubMessage;
use crate::transport::{HubLink, HubTransport};

enum LinkEvent {
    Message(HubMessage),
    Drop,
}

/// What the in-memory server does when a method is invoked.
#[derive(Debug, Clone)]
enum ServerRule {
    Fail(String),
    Push(HubInvocation),
}

#[derive(Default)]
struct MemoryHub {
    refuse_connects: usize,
    ignore_pings: bool,
    connect_urls: Vec<Url>,
    received: Vec<HubInvocation>,
    rules: HashMap<String, ServerRule>,
    current: Option<mpsc::UnboundedSender<LinkEvent>>,
}

/// A scripted in-process hub.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Mutex<MemoryHub>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` connect attempts with a handshake error.
    pub fn refuse_next_connects(&self, count: usize) {
        self.hub.lock().refuse_connects = count;
    }

    /// Stop (or resume) answering keep-alive pings, on this and later links.
    pub fn ignore_pings(&self, ignore: bool) {
        self.hub.lock().ignore_pings = ignore;
    }

    /// Complete invocations of `target` with an error.
    pub fn fail_invocations(&self, target: impl Into<String>, error: impl Into<String>) {
        self.hub
            .lock()
            .rules
            .insert(target.into(), ServerRule::Fail(error.into()));
    }

    /// When `target` is invoked, also push `push_target(arguments)` back to the client.
    pub fn push_on_invoke(
        &self,
        target: impl Into<String>,
        push_target: impl Into<String>,
        arguments: Vec<Value>,
    ) {
        self.hub.lock().rules.insert(
            target.into(),
            ServerRule::Push(HubInvocation::new(push_target, arguments)),
        );
    }

    /// Push a server invocation over the current link. Returns `false` without a link.
    pub fn push(&self, target: impl Into<String>, arguments: Vec<Value>) -> bool {
        self.send_event(LinkEvent::Message(HubMessage::invocation(
            None, target, arguments,
        )))
    }

    /// Send a protocol-level close over the current link.
    pub fn close_link(&self, allow_reconnect: bool) -> bool {
        self.send_event(LinkEvent::Message(HubMessage::Close {
            error: Some("closed by test hub".to_string()),
            allow_reconnect,
        }))
    }

    /// Drop the current link as if the network went away.
    pub fn drop_link(&self) -> bool {
        let sent = self.send_event(LinkEvent::Drop);
        self.hub.lock().current = None;
        sent
    }

    /// Whether a link is currently open.
    pub fn has_link(&self) -> bool {
        self.hub.lock().current.is_some()
    }

    /// URLs of every successful connect, in order.
    pub fn connect_urls(&self) -> Vec<Url> {
        self.hub.lock().connect_urls.clone()
    }

    /// Every invocation the client sent, in order.
    pub fn received(&self) -> Vec<HubInvocation> {
        self.hub.lock().received.clone()
    }

    /// Invocations of one method the client sent, in order.
    pub fn received_for(&self, target: &str) -> Vec<HubInvocation> {
        self.hub
            .lock()
            .received
            .iter()
            .filter(|i| i.target == target)
            .cloned()
            .collect()
    }

    fn send_event(&self, event: LinkEvent) -> bool {
        match &self.hub.lock().current {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl HubTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, url: &Url) -> Result<Box<dyn HubLink>> {
        let mut hub = self.hub.lock();
        if hub.refuse_connects > 0 {
            hub.refuse_connects -= 1;
            return Err(HubError::handshake("memory hub refused the connection"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        hub.connect_urls.push(url.clone());
        hub.current = Some(tx.clone());

        Ok(Box::new(MemoryLink {
            hub: self.hub.clone(),
            loopback: tx,
            incoming: rx,
            closed: false,
        }))
    }
}

struct MemoryLink {
    hub: Arc<Mutex<MemoryHub>>,
    /// Sender into our own queue, used for completions and keep-alive replies.
    loopback: mpsc::UnboundedSender<LinkEvent>,
    incoming: mpsc::UnboundedReceiver<LinkEvent>,
    closed: bool,
}

#[async_trait]
impl HubLink for MemoryLink {
    async fn send(&mut self, message: HubMessage) -> Result<()> {
        if self.closed {
            return Err(HubError::ConnectionLost);
        }

        let replies = match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                let mut hub = self.hub.lock();
                hub.received
                    .push(HubInvocation::new(target.clone(), arguments));
                let rule = hub.rules.get(&target).cloned();

                let mut replies = Vec::new();
                match rule {
                    Some(ServerRule::Fail(error)) => {
                        if let Some(id) = invocation_id {
                            replies.push(HubMessage::completion_error(id, error));
                        }
                    }
                    Some(ServerRule::Push(push)) => {
                        replies.push(HubMessage::invocation(None, push.target, push.arguments));
                        if let Some(id) = invocation_id {
                            replies.push(HubMessage::completion(id, None));
                        }
                    }
                    None => {
                        if let Some(id) = invocation_id {
                            replies.push(HubMessage::completion(id, None));
                        }
                    }
                }
                replies
            }
            HubMessage::Ping if self.hub.lock().ignore_pings => Vec::new(),
            HubMessage::Ping => vec![HubMessage::Ping],
            HubMessage::Completion { .. } | HubMessage::Close { .. } => Vec::new(),
        };

        for reply in replies {
            let _ = self.loopback.send(LinkEvent::Message(reply));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<HubMessage>> {
        if self.closed {
            return None;
        }
        match self.incoming.recv().await {
            Some(LinkEvent::Message(message)) => Some(Ok(message)),
            Some(LinkEvent::Drop) | None => {
                self.closed = true;
                None
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut hub = self.hub.lock();
        if hub
            .current
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.loopback))
        {
            hub.current = None;
        }
    }
}
