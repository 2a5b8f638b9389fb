// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Subscriber worker: subscribe to every topic, then receive until the
//! message target is reached or the idle timeout expires.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};

use super::{close, connect, WorkerContext};
use crate::aggregator::{DelayRecord, Sample};
use crate::config::WorkerConfig;
use crate::envelope::Envelope;
use crate::error::WorkerFailure;
use crate::state::WorkerState;
use crate::transport::{
    pump, ConnectAck, Connector, Flow, InboundMessage, MessageHandler, PumpOutcome, Session,
};
use crate::types::Role;

/// Run one subscriber to completion.
///
/// `ready` fires once every subscription is in place. It is dropped without
/// firing if the worker fails before that. The reported duration runs from
/// the first to the last received message.
pub async fn run_subscriber<C: Connector>(
    connector: Arc<C>,
    config: WorkerConfig,
    ctx: WorkerContext,
    ready: oneshot::Sender<()>,
) {
    let id = config.id.clone();
    let deadline = Instant::now() + config.timeout;

    ctx.enter(&id, WorkerState::Connecting);
    let (mut session, ack) = match connect(connector.as_ref(), &config, deadline).await {
        Ok(connection) => connection,
        Err(failure) => {
            ctx.report(Sample::failed(id, Role::Subscriber, 0, failure), Vec::new());
            return;
        }
    };
    ctx.enter(&id, WorkerState::Connected);

    if let Err(failure) = subscribe_all(&mut session, &config, deadline).await {
        close(&mut session, &id).await;
        ctx.report(Sample::failed(id, Role::Subscriber, 0, failure), Vec::new());
        return;
    }
    ctx.enter(&id, WorkerState::Subscribed);
    let _ = ready.send(());

    let mut receiver = Receiver::new(&config, &ctx);
    receiver.on_connect(&ack);

    let outcome = if config.message_count == 0 {
        PumpOutcome::Stopped
    } else {
        pump(&mut session, &mut receiver, config.idle_timeout).await
    };
    close(&mut session, &id).await;

    let received = receiver.received;
    let duration = receiver.active_duration();
    let Receiver { delays, records, .. } = receiver;

    let sample = match outcome {
        PumpOutcome::Stopped => Sample::completed(id, Role::Subscriber, received, duration),
        PumpOutcome::Idle => Sample::failed(
            id,
            Role::Subscriber,
            received,
            WorkerFailure::IdleTimeout {
                received,
                target: config.message_count,
            },
        ),
        PumpOutcome::Closed(e) => Sample::failed(
            id,
            Role::Subscriber,
            received,
            WorkerFailure::ConnectionLost {
                reason: e.to_string(),
            },
        ),
    };
    ctx.report(sample.with_delays(delays), records);
}

async fn subscribe_all<S: Session>(
    session: &mut S,
    config: &WorkerConfig,
    deadline: Instant,
) -> Result<(), WorkerFailure> {
    for topic in config.topics.as_slice() {
        match timeout_at(deadline, session.subscribe(topic, config.qos)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(WorkerFailure::ConnectionLost {
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(WorkerFailure::SubscribeTimeout),
        }
    }
    Ok(())
}

/// Message handler accumulating one subscriber's observations.
struct Receiver<'a> {
    config: &'a WorkerConfig,
    ctx: &'a WorkerContext,
    received: u64,
    malformed: u64,
    first_arrival: Option<Instant>,
    last_arrival: Option<Instant>,
    delays: Vec<i64>,
    records: Vec<DelayRecord>,
}

impl<'a> Receiver<'a> {
    fn new(config: &'a WorkerConfig, ctx: &'a WorkerContext) -> Self {
        let capacity = usize::try_from(config.message_count)
            .unwrap_or(0)
            .min(1 << 20);
        Self {
            config,
            ctx,
            received: 0,
            malformed: 0,
            first_arrival: None,
            last_arrival: None,
            delays: Vec::with_capacity(capacity),
            records: Vec::with_capacity(capacity),
        }
    }

    fn active_duration(&self) -> std::time::Duration {
        match (self.first_arrival, self.last_arrival) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => std::time::Duration::ZERO,
        }
    }
}

impl MessageHandler for Receiver<'_> {
    fn on_connect(&mut self, ack: &ConnectAck) {
        tracing::debug!(
            worker_id = %self.config.id,
            session_present = ack.session_present,
            topics = %self.config.topics,
            "Subscribed"
        );
    }

    fn on_message(&mut self, message: InboundMessage) -> Flow {
        let now = Instant::now();
        if self.first_arrival.is_none() {
            self.first_arrival = Some(now);
            self.ctx.enter(&self.config.id, WorkerState::Receiving);
        }
        self.last_arrival = Some(now);
        self.received += 1;

        match Envelope::decode(&message.payload) {
            Ok(envelope) => {
                let delay = envelope.e2e_delay_micros(message.arrived_at);
                self.delays.push(delay);
                self.records.push(DelayRecord {
                    publisher_id: envelope.publisher_id,
                    origin_host: envelope.origin_host,
                    sent_at: envelope.publish_time,
                    subscriber_id: self.config.id.clone(),
                    destination_host: self.config.origin_host.clone(),
                    arrived_at: message.arrived_at,
                    e2e_delay_micros: delay,
                });
            }
            Err(e) => {
                self.malformed += 1;
                if self.malformed == 1 {
                    tracing::warn!(
                        worker_id = %self.config.id,
                        topic = %message.topic,
                        error = %e,
                        "Received a message without a valid envelope; no delay recorded"
                    );
                } else {
                    tracing::debug!(worker_id = %self.config.id, error = %e, "Malformed envelope");
                }
            }
        }

        if self.received >= self.config.message_count {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}
