// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process broker for driving workers without a network.
//!
//! Routes publishes to every session holding a matching filter (`+` and `#`
//! wildcards supported). Two degraded modes model a broker that never answers
//! and one that refuses connections outright.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{ConnectAck, Connector, InboundMessage, Session};
use crate::config::BrokerEndpoint;
use crate::error::TransportError;
use crate::types::{QosLevel, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accepting,
    /// Connection attempts hang forever.
    Unreachable,
    /// Connection attempts fail immediately.
    Refusing,
}

#[derive(Debug)]
struct Subscriber {
    filters: Vec<String>,
    inbox: mpsc::UnboundedSender<InboundMessage>,
}

#[derive(Debug)]
struct Inner {
    mode: Mode,
    sessions: DashMap<String, Subscriber>,
    published: AtomicU64,
    delivered: AtomicU64,
}

/// Cloneable handle to one in-process broker.
#[derive(Debug, Clone)]
pub struct LoopbackBroker {
    inner: Arc<Inner>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBroker {
    /// A broker accepting every connection.
    pub fn new() -> Self {
        Self::with_mode(Mode::Accepting)
    }

    /// A broker whose connection attempts never complete.
    pub fn unreachable() -> Self {
        Self::with_mode(Mode::Unreachable)
    }

    /// A broker refusing every connection.
    pub fn refusing() -> Self {
        Self::with_mode(Mode::Refusing)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                sessions: DashMap::new(),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Messages accepted from publishers.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Message copies handed to subscribers.
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Connected sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Drop every session, as a broker restart would.
    pub fn drop_sessions(&self) {
        self.inner.sessions.clear();
    }

    fn route(&self, topic: &str, payload: &[u8]) {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        for entry in self.inner.sessions.iter() {
            if !entry.filters.iter().any(|f| topic_matches(f, topic)) {
                continue;
            }
            let message = InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                arrived_at: Timestamp::now(),
            };
            if entry.inbox.send(message).is_ok() {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[async_trait]
impl Connector for LoopbackBroker {
    type Session = LoopbackSession;

    async fn connect(
        &self,
        client_id: &str,
        endpoint: &BrokerEndpoint,
    ) -> Result<(Self::Session, ConnectAck), TransportError> {
        match self.inner.mode {
            Mode::Unreachable => std::future::pending().await,
            Mode::Refusing => Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
            Mode::Accepting => {
                let (inbox, rx) = mpsc::unbounded_channel();
                // A reused client id takes over the old session
                let session_present = self
                    .inner
                    .sessions
                    .insert(
                        client_id.to_string(),
                        Subscriber {
                            filters: Vec::new(),
                            inbox,
                        },
                    )
                    .is_some();

                let session = LoopbackSession {
                    broker: self.clone(),
                    client_id: client_id.to_string(),
                    rx,
                    published: 0,
                    closed: false,
                };
                let ack = ConnectAck {
                    session_present,
                    acked_at: Timestamp::now(),
                };
                Ok((session, ack))
            }
        }
    }
}

/// Session on a [`LoopbackBroker`].
#[derive(Debug)]
pub struct LoopbackSession {
    broker: LoopbackBroker,
    client_id: String,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    published: u64,
    closed: bool,
}

impl LoopbackSession {
    fn ensure_open(&self, operation: &'static str) -> Result<(), TransportError> {
        if self.closed || !self.broker.inner.sessions.contains_key(&self.client_id) {
            return Err(TransportError::Request {
                operation,
                reason: "session is closed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Session for LoopbackSession {
    async fn subscribe(&mut self, topic: &str, _qos: QosLevel) -> Result<(), TransportError> {
        self.ensure_open("subscribe")?;
        if let Some(mut entry) = self.broker.inner.sessions.get_mut(&self.client_id) {
            if !entry.filters.iter().any(|f| f == topic) {
                entry.filters.push(topic.to_string());
            }
        }
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        _qos: QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.ensure_open("publish")?;
        self.broker.route(topic, &payload);
        self.published += 1;
        Ok(())
    }

    /// Routing is synchronous, so every publish is confirmed on return.
    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn confirmed(&mut self) -> u64 {
        self.published
    }

    async fn next_message(&mut self) -> Result<InboundMessage, TransportError> {
        self.rx.recv().await.ok_or_else(|| TransportError::Closed {
            reason: "broker dropped the session".to_string(),
        })
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.broker.inner.sessions.remove(&self.client_id);
        Ok(())
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        if !self.closed {
            self.broker.inner.sessions.remove(&self.client_id);
        }
    }
}

/// MQTT topic filter matching with `+` (one level) and `#` (remaining levels).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;

    fn endpoint() -> BrokerEndpoint {
        BrokerEndpoint::plain("loopback", Port::MQTT)
    }

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/c"));
        assert!(topic_matches("a/+/c", "a/x/c"));
        assert!(!topic_matches("a/+", "a/x/c"));
        assert!(topic_matches("a/#", "a/x/c"));
        assert!(topic_matches("a/#", "a"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("a/b/c", "a/b"));
    }

    #[tokio::test]
    async fn test_routing_to_matching_sessions() {
        let broker = LoopbackBroker::new();
        let (mut all, _) = broker.connect("sub0", &endpoint()).await.unwrap();
        let (mut room, _) = broker.connect("sub1", &endpoint()).await.unwrap();
        all.subscribe("#", QosLevel::AtMostOnce).await.unwrap();
        room.subscribe("room/1", QosLevel::AtMostOnce).await.unwrap();

        let (mut publisher, _) = broker.connect("pub0", &endpoint()).await.unwrap();
        publisher
            .publish("room/2", QosLevel::AtMostOnce, b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(all.next_message().await.unwrap().topic, "room/2");
        assert_eq!(broker.published(), 1);
        assert_eq!(broker.delivered(), 1);
    }

    #[tokio::test]
    async fn test_refusing_broker() {
        let broker = LoopbackBroker::refusing();
        let result = broker.connect("pub0", &endpoint()).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_broker_never_acks() {
        let broker = LoopbackBroker::unreachable();
        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            broker.connect("pub0", &endpoint()),
        )
        .await;
        assert!(attempt.is_err());
    }

    #[tokio::test]
    async fn test_dropped_sessions_close() {
        let broker = LoopbackBroker::new();
        let (mut session, _) = broker.connect("sub0", &endpoint()).await.unwrap();
        assert_eq!(broker.session_count(), 1);

        broker.drop_sessions();
        assert!(matches!(
            session.next_message().await,
            Err(TransportError::Closed { .. })
        ));
    }
}
