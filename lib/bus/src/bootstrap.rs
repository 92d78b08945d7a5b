// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide messaging bootstrap.
//!
//! The facade that wires the messaging core together: it reads the platform
//! configuration, builds the shared [`EventCodec`], resolves and configures
//! the receiver for the configured transport, starts its inbound loop on a
//! caller-supplied runtime handle, and publishes the resulting
//! sender/receiver pair into the shared [`Environment`]. At most one pair
//! exists per process; any bootstrap failure tears down whatever partial
//! state was created and leaves messaging disabled while the hosting
//! process keeps running.

use std::sync::Arc;

use crate::codec::EventCodec;
use crate::environment::{Environment, MessagingPair};
use crate::error::BusError;
use crate::node::NodeId;
use crate::registry::EventHandler;
use crate::transport::{EventSender, ReceiverFactory};

/// Resolve this process's node identity from the platform configuration's
/// explicit override, with env-var and hostname fallback. Idempotent after
/// the first resolution.
pub fn node_id(env: &Environment) -> NodeId {
    NodeId::resolve(env.platform_config().node_id_override.as_deref())
}

/// Whether cluster messaging is enabled for this process.
pub fn is_enabled(env: &Environment) -> bool {
    env.platform_config().messaging_enabled
}

/// Build and publish the process-wide messaging pair, returning its sender.
///
/// Returns `None` when messaging is disabled or when any build step fails;
/// in the failure case whatever partial state was created is shut down and
/// nothing is published. When a pair is already published, its sender is
/// returned unchanged — concurrent bootstrap attempts cannot create two
/// pairs because the publish slot's lock is held across the whole
/// check-then-create sequence.
pub fn create_message_sender(
    env: &Environment,
    handle: &tokio::runtime::Handle,
    node_id: &NodeId,
    default_handler: Option<Arc<dyn EventHandler>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    factory: &ReceiverFactory,
) -> Option<Arc<dyn EventSender>> {
    if !is_enabled(env) {
        tracing::info!("cluster messaging is disabled; no sender created");
        return None;
    }

    let mut slot = env.messaging_slot().lock();
    if let Some(pair) = slot.as_ref() {
        return Some(pair.sender.clone());
    }

    match build_messaging(env, handle, node_id, default_handler, handlers, factory) {
        Ok(pair) => {
            tracing::info!(
                node = %node_id,
                transport = %env.platform_config().transport,
                "cluster messaging started"
            );
            let sender = pair.sender.clone();
            *slot = Some(pair);
            Some(sender)
        }
        Err(err) => {
            tracing::error!(node = %node_id, %err, "failed to start cluster messaging");
            None
        }
    }
}

fn build_messaging(
    env: &Environment,
    handle: &tokio::runtime::Handle,
    node_id: &NodeId,
    default_handler: Option<Arc<dyn EventHandler>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    factory: &ReceiverFactory,
) -> Result<MessagingPair, BusError> {
    let codec = Arc::new(EventCodec::new(env.clone(), node_id.clone()));
    let receiver = factory.build(&env.platform_config().transport)?;

    let wired = (|| {
        receiver.configure(codec)?;
        if let Some(handler) = default_handler {
            receiver.set_default_handler(handler);
        }
        for handler in handlers {
            receiver.register_handler(handler)?;
        }
        receiver.run_with(handle)?;
        receiver.create_sender()
    })();

    match wired {
        Ok(sender) => Ok(MessagingPair { sender, receiver }),
        Err(err) => {
            // Release whatever the partially wired receiver holds before
            // reporting the failure.
            let partial = receiver.clone();
            handle.spawn(async move { partial.close().await });
            Err(err)
        }
    }
}

/// Best-effort shutdown of the published pair: the receiver is closed
/// first, then the sender. Idempotent; never fails the caller.
pub async fn shutdown(env: &Environment) {
    let Some(pair) = env.take_messaging() else {
        return;
    };

    pair.receiver.close().await;
    pair.sender.close().await;
    tracing::info!("cluster messaging shut down");
}
