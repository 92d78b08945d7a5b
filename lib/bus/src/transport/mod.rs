// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Transport-agnostic sender/receiver abstraction.
//!
//! A receiver owns the inbound loop for one transport: it decodes inbound
//! bytes through the shared [`EventCodec`] and dispatches the result through
//! its [`EventRegistry`]. A receiver can manufacture a matching sender bound
//! to the same transport and codec. Concrete transports are selected by
//! configuration through the [`ReceiverFactory`]; the in-process
//! [`local::LocalBus`] implementation ships with this crate.

pub mod local;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::codec::EventCodec;
use crate::config::TransportKind;
use crate::error::BusError;
use crate::event::{ClusterEvent, EventKind};
use crate::registry::{EventHandler, EventRegistry};

pub use local::{LocalBus, LocalReceiver, LocalSender};

/// Receiver lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    New,
    Configured,
    Running,
    Closed,
}

/// Transmits events to the cluster.
#[async_trait]
pub trait EventSender: Send + Sync {
    /// Serialize and transmit one event, returning whether transmission
    /// succeeded. May block on I/O. Performs no retries — callers decide
    /// whether and how to retry on `false`; the underlying failure is
    /// logged by the implementation.
    async fn send(&self, event: ClusterEvent) -> bool;

    /// Release any transport resources. By default a no-op; idempotent.
    async fn close(&self) {}
}

/// Receives events from the cluster and dispatches them to handlers.
///
/// Lifecycle: **New → Configured → Running → Closed**. `configure` binds the
/// codec, `run_with` submits the single inbound loop to a caller-supplied
/// runtime handle (the receiver never spawns its own runtime), `close`
/// cancels the loop and is idempotent.
#[async_trait]
pub trait EventReceiver: Send + Sync {
    /// New → Configured. Binds the codec used to decode inbound bytes.
    fn configure(&self, codec: Arc<EventCodec>) -> Result<(), BusError>;

    /// Register a handler in the receiver's registry. Allowed while the
    /// inbound loop is running.
    fn register_handler(&self, handler: Arc<dyn EventHandler>) -> Result<(), BusError>;

    /// Replace the registry's fallback handler. Allowed while the inbound
    /// loop is running.
    fn set_default_handler(&self, handler: Arc<dyn EventHandler>);

    /// Configured → Running. Submits the inbound loop to the given runtime
    /// handle. Exactly one logical inbound loop per receiver instance.
    fn run_with(&self, handle: &tokio::runtime::Handle) -> Result<(), BusError>;

    /// A new sender bound to the same transport and codec. Available once
    /// configured.
    fn create_sender(&self) -> Result<Arc<dyn EventSender>, BusError>;

    /// Running | Configured → Closed. Releases blocking I/O resources;
    /// idempotent.
    async fn close(&self);

    fn state(&self) -> ReceiverState;
}

/// Shared state for receiver implementations: the lifecycle state machine,
/// the bound codec, the handler registry, and the loop cancellation token.
pub struct ReceiverCore {
    state: Mutex<ReceiverState>,
    codec: RwLock<Option<Arc<EventCodec>>>,
    registry: Arc<EventRegistry>,
    cancel: CancellationToken,
}

impl ReceiverCore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReceiverState::New),
            codec: RwLock::new(None),
            registry: Arc::new(EventRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.lock()
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// New → Configured.
    pub fn configure(&self, codec: Arc<EventCodec>) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if *state != ReceiverState::New {
            return Err(BusError::configuration(format!(
                "receiver cannot be configured in state {:?}",
                *state
            )));
        }
        *self.codec.write() = Some(codec);
        *state = ReceiverState::Configured;
        Ok(())
    }

    /// The bound codec; a configuration error before `configure` was called.
    pub fn codec(&self) -> Result<Arc<EventCodec>, BusError> {
        self.codec
            .read()
            .clone()
            .ok_or_else(|| BusError::configuration("receiver is not configured"))
    }

    /// Configured → Running. Guards the single-inbound-loop invariant.
    pub fn begin_run(&self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if *state != ReceiverState::Configured {
            return Err(BusError::configuration(format!(
                "receiver cannot start in state {:?}",
                *state
            )));
        }
        *state = ReceiverState::Running;
        Ok(())
    }

    /// Running | Configured → Closed. Returns whether the transition
    /// happened, so `close` stays idempotent.
    pub fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ReceiverState::Configured | ReceiverState::Running => {
                *state = ReceiverState::Closed;
                true
            }
            _ => false,
        }
    }
}

impl Default for ReceiverCore {
    fn default() -> Self {
        Self::new()
    }
}

/// One inbound-loop iteration: decode, then dispatch.
///
/// Returns `Ok(None)` when the message was dropped by the codec, `Ok(kind)`
/// when an event was dispatched, and the (context-enriched) handler error
/// when dispatch failed. The loop host logs the error and continues with
/// the next message — one failing event never stops the loop.
pub fn dispatch_inbound(
    codec: &EventCodec,
    registry: &EventRegistry,
    bytes: &[u8],
) -> Result<Option<EventKind>, BusError> {
    let Some(event) = codec.decode(bytes) else {
        return Ok(None);
    };

    let kind = event.kind();
    registry.dispatch(&event, codec.environment()).map_err(|err| {
        BusError::new(
            err.error_type(),
            format!(
                "handler failed for {kind} event (site {:?}, node {:?})",
                event.site_name(),
                event.node_id()
            ),
            Some(err),
        )
    })?;
    Ok(Some(kind))
}

/// Builds a receiver for one factory key.
pub type ReceiverBuilder = Box<dyn Fn() -> Arc<dyn EventReceiver> + Send + Sync>;

/// Startup-time mapping from a configuration value to a receiver builder.
///
/// This replaces instantiate-by-class-name: every transport is registered
/// explicitly under a key, resolved once at bootstrap, with no runtime
/// reflection. The default factory knows the in-process local transport;
/// embedding code registers additional transports under their own keys.
pub struct ReceiverFactory {
    builders: HashMap<String, ReceiverBuilder>,
}

impl ReceiverFactory {
    /// An empty factory with no registered transports.
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Register a builder under a key. Later registrations for the same key
    /// replace earlier ones.
    pub fn register<F>(&mut self, key: impl Into<String>, builder: F)
    where
        F: Fn() -> Arc<dyn EventReceiver> + Send + Sync + 'static,
    {
        self.builders.insert(key.into(), Box::new(builder));
    }

    /// Build the receiver configured for `kind`. An unknown key is a
    /// configuration error.
    pub fn build(&self, kind: &TransportKind) -> Result<Arc<dyn EventReceiver>, BusError> {
        let builder = self.builders.get(kind.as_key()).ok_or_else(|| {
            BusError::configuration(format!("no receiver registered for transport '{kind}'"))
        })?;
        Ok(builder())
    }
}

impl Default for ReceiverFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(TransportKind::Local.as_key(), || {
            Arc::new(LocalReceiver::new(LocalBus::new())) as Arc<dyn EventReceiver>
        });
        factory
    }
}
