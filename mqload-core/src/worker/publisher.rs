// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Publisher worker: connect, publish `message_count` envelopes, disconnect.

use std::sync::Arc;

use tokio::time::{sleep_until, timeout_at, Instant};

use super::{close, connect, WorkerContext};
use crate::aggregator::Sample;
use crate::config::WorkerConfig;
use crate::envelope::Envelope;
use crate::error::WorkerFailure;
use crate::state::WorkerState;
use crate::transport::{Connector, Session};
use crate::types::{Role, Timestamp};

/// Run one publisher to completion.
///
/// The worker timeout covers the connection, the publishing and the broker
/// confirming every message. The reported duration runs from the connection
/// acknowledgement to the last confirmation.
pub async fn run_publisher<C: Connector>(
    connector: Arc<C>,
    config: WorkerConfig,
    ctx: WorkerContext,
) {
    let id = config.id.clone();
    let deadline = Instant::now() + config.timeout;

    ctx.enter(&id, WorkerState::Connecting);
    let connect_init = Timestamp::now();
    let (mut session, ack) = match connect(connector.as_ref(), &config, deadline).await {
        Ok(connection) => connection,
        Err(failure) => {
            ctx.report(Sample::failed(id, Role::Publisher, 0, failure), Vec::new());
            return;
        }
    };
    let connected_at = Instant::now();
    ctx.enter(&id, WorkerState::Connected);
    ctx.enter(&id, WorkerState::Publishing);

    let mut envelope = Envelope {
        origin_host: config.origin_host.clone(),
        publisher_id: id.to_string(),
        connect_init,
        connect_ack: ack.acked_at,
        publish_time: ack.acked_at,
        qos: config.qos,
    };

    let result = match publish_all(&mut session, &config, &mut envelope, deadline).await {
        Ok(()) => confirm_all(&mut session, &config, deadline).await,
        Err(failure) => Err(failure),
    };
    let elapsed = connected_at.elapsed();
    let confirmed = session.confirmed();
    close(&mut session, &id).await;

    let sample = match result {
        Ok(()) => Sample::completed(id, Role::Publisher, confirmed, elapsed),
        Err(failure) => Sample::failed(id, Role::Publisher, confirmed, failure),
    };
    ctx.report(sample, Vec::new());
}

fn timed_out<S: Session>(session: &mut S, target: u64) -> WorkerFailure {
    WorkerFailure::PublishTimeout {
        sent: session.confirmed(),
        target,
    }
}

/// Issue every publish, cycling through the topic set.
async fn publish_all<S: Session>(
    session: &mut S,
    config: &WorkerConfig,
    envelope: &mut Envelope,
    deadline: Instant,
) -> Result<(), WorkerFailure> {
    let target = config.message_count;

    for index in 0..target {
        if index > 0 && !config.delay.is_zero() {
            let wake = Instant::now() + config.delay;
            if wake >= deadline {
                sleep_until(deadline).await;
                return Err(timed_out(session, target));
            }
            sleep_until(wake).await;
        }

        if Instant::now() >= deadline {
            return Err(timed_out(session, target));
        }

        envelope.publish_time = Timestamp::now();
        let payload = envelope.encode(config.payload_size);
        let topic = config.topics.topic_for(index);

        match timeout_at(deadline, session.publish(topic, config.qos, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(WorkerFailure::ConnectionLost {
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(timed_out(session, target)),
        }
    }

    Ok(())
}

/// Wait for the broker to confirm everything published.
async fn confirm_all<S: Session>(
    session: &mut S,
    config: &WorkerConfig,
    deadline: Instant,
) -> Result<(), WorkerFailure> {
    match timeout_at(deadline, session.flush()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WorkerFailure::ConnectionLost {
            reason: e.to_string(),
        }),
        Err(_) => Err(timed_out(session, config.message_count)),
    }
}
