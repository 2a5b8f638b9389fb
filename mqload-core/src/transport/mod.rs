// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Broker connection abstraction.
//!
//! Workers never talk to a client library directly. A [`Connector`] opens one
//! [`Session`] per worker; inbound traffic is handed to a [`MessageHandler`]
//! through a fixed callback contract by [`pump`].

pub mod loopback;
pub mod mqtt;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::BrokerEndpoint;
use crate::error::TransportError;
use crate::types::{QosLevel, Timestamp};

pub use loopback::LoopbackBroker;
pub use mqtt::MqttConnector;

/// Broker acknowledgement of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAck {
    pub session_present: bool,
    /// When the acknowledgement was observed locally.
    pub acked_at: Timestamp,
}

/// A message delivered to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Taken as soon as the transport hands the message over.
    pub arrived_at: Timestamp,
}

/// Opens broker sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// Connect and wait for the broker acknowledgement.
    ///
    /// Implementations may wait indefinitely; callers bound the attempt with
    /// their own deadline.
    async fn connect(
        &self,
        client_id: &str,
        endpoint: &BrokerEndpoint,
    ) -> Result<(Self::Session, ConnectAck), TransportError>;
}

/// One live broker connection, owned by exactly one worker.
///
/// Dropping a session closes the connection without a clean disconnect.
#[async_trait]
pub trait Session: Send + 'static {
    async fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), TransportError>;

    async fn publish(
        &mut self,
        topic: &str,
        qos: QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Wait until the broker has confirmed every publish issued so far.
    ///
    /// QoS 0 counts once the packet is written, QoS 1 on PUBACK and QoS 2 on
    /// PUBCOMP. Cancel-safe.
    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Publishes confirmed so far.
    fn confirmed(&mut self) -> u64;

    /// Wait for the next inbound message. Cancel-safe.
    async fn next_message(&mut self) -> Result<InboundMessage, TransportError>;

    /// Flush pending requests and close the connection.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Whether a handler wants more messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Callback contract between a session and the worker consuming it.
pub trait MessageHandler: Send {
    fn on_connect(&mut self, ack: &ConnectAck);

    fn on_message(&mut self, message: InboundMessage) -> Flow;
}

/// How [`pump`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The handler returned [`Flow::Stop`].
    Stopped,
    /// No message arrived within the idle timeout.
    Idle,
    /// The connection went away.
    Closed(TransportError),
}

/// Feed inbound messages to `handler` until it stops, the session closes, or
/// `idle_timeout` passes without a message.
pub async fn pump<S, H>(session: &mut S, handler: &mut H, idle_timeout: Duration) -> PumpOutcome
where
    S: Session + ?Sized,
    H: MessageHandler + ?Sized,
{
    loop {
        match tokio::time::timeout(idle_timeout, session.next_message()).await {
            Err(_) => return PumpOutcome::Idle,
            Ok(Err(e)) => return PumpOutcome::Closed(e),
            Ok(Ok(message)) => {
                if handler.on_message(message) == Flow::Stop {
                    return PumpOutcome::Stopped;
                }
            }
        }
    }
}

/// Map a QoS level onto the MQTT client's own type.
pub(crate) fn to_mqtt_qos(qos: QosLevel) -> rumqttc::QoS {
    match qos {
        QosLevel::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QosLevel::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;

    struct Counter {
        seen: usize,
        stop_after: usize,
        connected: bool,
    }

    impl MessageHandler for Counter {
        fn on_connect(&mut self, _ack: &ConnectAck) {
            self.connected = true;
        }

        fn on_message(&mut self, _message: InboundMessage) -> Flow {
            self.seen += 1;
            if self.seen >= self.stop_after {
                Flow::Stop
            } else {
                Flow::Continue
            }
        }
    }

    #[tokio::test]
    async fn test_pump_stops_and_idles() {
        let broker = LoopbackBroker::new();
        let endpoint = BrokerEndpoint::plain("loopback", Port::MQTT);

        let (mut sub, ack) = broker.connect("sub0", &endpoint).await.unwrap();
        sub.subscribe("t", QosLevel::AtMostOnce).await.unwrap();
        let (mut publisher, _) = broker.connect("pub0", &endpoint).await.unwrap();
        for _ in 0..3 {
            publisher
                .publish("t", QosLevel::AtMostOnce, b"m".to_vec())
                .await
                .unwrap();
        }

        let mut handler = Counter {
            seen: 0,
            stop_after: 2,
            connected: false,
        };
        handler.on_connect(&ack);
        assert!(handler.connected);

        let outcome = pump(&mut sub, &mut handler, Duration::from_millis(200)).await;
        assert_eq!(outcome, PumpOutcome::Stopped);
        assert_eq!(handler.seen, 2);

        // One message left, then silence
        handler.stop_after = 10;
        let outcome = pump(&mut sub, &mut handler, Duration::from_millis(100)).await;
        assert_eq!(outcome, PumpOutcome::Idle);
        assert_eq!(handler.seen, 3);
    }

    #[tokio::test]
    async fn test_pump_reports_closed_session() {
        let broker = LoopbackBroker::new();
        let endpoint = BrokerEndpoint::plain("loopback", Port::MQTT);
        let (mut sub, _) = broker.connect("sub0", &endpoint).await.unwrap();
        broker.drop_sessions();

        let mut handler = Counter {
            seen: 0,
            stop_after: 1,
            connected: false,
        };
        let outcome = pump(&mut sub, &mut handler, Duration::from_secs(1)).await;
        assert_eq!(
            outcome,
            PumpOutcome::Closed(TransportError::Closed {
                reason: "broker dropped the session".to_string()
            })
        );
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_mqtt_qos(QosLevel::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(to_mqtt_qos(QosLevel::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }
}
