// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! MQTT transport over rumqttc.
//!
//! The rumqttc event loop must be polled for any request to reach the broker,
//! so each session runs it in a background task. Inbound publishes are
//! timestamped there and forwarded through a channel. Subscription
//! acknowledgements and publish confirmations travel on their own channels.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{to_mqtt_qos, ConnectAck, Connector, InboundMessage, Session};
use crate::config::BrokerEndpoint;
use crate::error::{ConfigurationError, TransportError};
use crate::types::{QosLevel, Timestamp, MAX_PAYLOAD_SIZE};

/// Room for the fixed header, topic and properties on top of the payload.
const PACKET_OVERHEAD: usize = 64 * 1024;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// How long a disconnect waits for queued requests to drain.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

type Inbound = Result<InboundMessage, TransportError>;
type SubAckResult = Result<(), TransportError>;

/// Connector opening rumqttc sessions.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    keep_alive: Duration,
    channel_capacity: usize,
    ca_cert: Option<Vec<u8>>,
}

impl MqttConnector {
    /// Connector for an endpoint, loading its CA certificate if TLS is enabled.
    pub fn for_endpoint(endpoint: &BrokerEndpoint) -> Result<Self, ConfigurationError> {
        let ca_cert = endpoint.ca_cert.as_deref().map(read_ca).transpose()?;
        Ok(Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            ca_cert,
        })
    }

    fn options(&self, client_id: &str, endpoint: &BrokerEndpoint) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, endpoint.host.as_str(), endpoint.port.value());
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(
            MAX_PAYLOAD_SIZE + PACKET_OVERHEAD,
            MAX_PAYLOAD_SIZE + PACKET_OVERHEAD,
        );

        if let Some(credentials) = &endpoint.credentials {
            options.set_credentials(
                credentials.username.clone(),
                credentials.password.clone().unwrap_or_default(),
            );
        }

        if let Some(ca) = &self.ca_cert {
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: None,
            }));
        }

        options
    }
}

fn read_ca(path: &Path) -> Result<Vec<u8>, ConfigurationError> {
    std::fs::read(path).map_err(|source| ConfigurationError::CaCertificate {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(
        &self,
        client_id: &str,
        endpoint: &BrokerEndpoint,
    ) -> Result<(Self::Session, ConnectAck), TransportError> {
        let (client, mut eventloop) =
            AsyncClient::new(self.options(client_id, endpoint), self.channel_capacity);

        let ack = loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    if connack.code != ConnectReturnCode::Success {
                        return Err(TransportError::Rejected {
                            reason: format!("{:?}", connack.code),
                        });
                    }
                    break ConnectAck {
                        session_present: connack.session_present,
                        acked_at: Timestamp::now(),
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(TransportError::ConnectFailed {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        };

        tracing::debug!(client_id, endpoint = %endpoint, "Connection acknowledged");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (suback_tx, suback_rx) = mpsc::unbounded_channel();
        let (confirm_tx, confirm_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(eventloop, tx, suback_tx, confirm_tx));

        let session = MqttSession {
            client,
            inbound: rx,
            subacks: suback_rx,
            confirmations: confirm_rx,
            published: 0,
            confirmed: 0,
            driver,
            disconnected: false,
        };
        Ok((session, ack))
    }
}

/// Poll the event loop until the connection ends, forwarding publishes.
async fn drive(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<Inbound>,
    subacks: mpsc::UnboundedSender<SubAckResult>,
    confirmations: mpsc::UnboundedSender<()>,
) {
    loop {
        match eventloop.poll().await {
            // QoS 0 publishes carry packet id 0 and are done once written
            Ok(Event::Outgoing(Outgoing::Publish(0)))
            | Ok(Event::Incoming(Packet::PubAck(_)))
            | Ok(Event::Incoming(Packet::PubComp(_))) => {
                let _ = confirmations.send(());
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let result = if suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Err(TransportError::Rejected {
                        reason: "subscription refused by the broker".to_string(),
                    })
                } else {
                    Ok(())
                };
                let _ = subacks.send(result);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    arrived_at: Timestamp::now(),
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if tx.send(Ok(message)).await.is_err() {
                    break;
                }
            }
            // Everything queued before the disconnect has been written
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                let _ = tx
                    .send(Err(TransportError::Closed {
                        reason: e.to_string(),
                    }))
                    .await;
                break;
            }
        }
    }
}

/// One rumqttc connection.
pub struct MqttSession {
    client: AsyncClient,
    inbound: mpsc::Receiver<Inbound>,
    subacks: mpsc::UnboundedReceiver<SubAckResult>,
    confirmations: mpsc::UnboundedReceiver<()>,
    published: u64,
    confirmed: u64,
    driver: JoinHandle<()>,
    disconnected: bool,
}

#[async_trait]
impl Session for MqttSession {
    /// Returns once the broker acknowledged the subscription.
    async fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, to_mqtt_qos(qos))
            .await
            .map_err(|e| TransportError::Request {
                operation: "subscribe",
                reason: e.to_string(),
            })?;

        match self.subacks.recv().await {
            Some(result) => result,
            None => Err(TransportError::Closed {
                reason: "event loop stopped before the subscription was acknowledged".to_string(),
            }),
        }
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.client
            .publish(topic, to_mqtt_qos(qos), false, payload)
            .await
            .map_err(|e| TransportError::Request {
                operation: "publish",
                reason: e.to_string(),
            })?;
        self.published += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        while self.confirmed < self.published {
            match self.confirmations.recv().await {
                Some(()) => self.confirmed += 1,
                None => {
                    return Err(TransportError::Closed {
                        reason: format!(
                            "event loop stopped with {} of {} publishes unconfirmed",
                            self.published - self.confirmed,
                            self.published
                        ),
                    })
                }
            }
        }
        Ok(())
    }

    fn confirmed(&mut self) -> u64 {
        while self.confirmations.try_recv().is_ok() {
            self.confirmed += 1;
        }
        self.confirmed
    }

    async fn next_message(&mut self) -> Result<InboundMessage, TransportError> {
        match self.inbound.recv().await {
            Some(message) => message,
            None => Err(TransportError::Closed {
                reason: "event loop stopped".to_string(),
            }),
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.disconnected {
            return Ok(());
        }
        self.disconnected = true;

        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::Request {
                operation: "disconnect",
                reason: e.to_string(),
            })?;

        // Messages forwarded from now on are never read
        self.inbound.close();
        if tokio::time::timeout(DISCONNECT_GRACE, &mut self.driver)
            .await
            .is_err()
        {
            tracing::debug!("Event loop did not drain before the disconnect grace period");
        }
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
