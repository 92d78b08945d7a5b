// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Handler strategies and the concurrent handler registry.
//!
//! Dispatch is routed by [`EventKind`]: the registry maps each kind to an
//! ordered list of handlers and guarantees that every event yields at least
//! one handler — the registered list, or the configured default, which is an
//! explicit [`PassThroughHandler`] unless replaced. Registration and
//! dispatch may interleave from concurrent tasks; a dispatch that began just
//! before a registration completes may use the pre-registration state.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::environment::{Environment, Site};
use crate::error::BusError;
use crate::event::{ClusterEvent, EventKind};

/// A stateless processing strategy bound to exactly one event kind.
pub trait EventHandler: Send + Sync {
    /// The single kind this handler is routed for. Invariant for the
    /// handler's lifetime. `None` means the handler routes nowhere and can
    /// only serve as a registry's default handler.
    fn kind(&self) -> Option<EventKind>;

    /// Handler-specific processing, typically delegating to
    /// [`ClusterEvent::perform`]. Errors propagate to the dispatch layer.
    fn on_event(
        &self,
        event: &ClusterEvent,
        env: &Environment,
        site: Option<&Site>,
    ) -> Result<(), BusError>;
}

/// The library-supplied fallback: invokes the event's own `perform`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughHandler;

impl EventHandler for PassThroughHandler {
    fn kind(&self) -> Option<EventKind> {
        None
    }

    fn on_event(
        &self,
        event: &ClusterEvent,
        env: &Environment,
        site: Option<&Site>,
    ) -> Result<(), BusError> {
        event.perform(env, site)
    }
}

/// Concurrent mapping from event kind to an ordered list of handlers, plus
/// one default handler used when no specific handler is registered.
pub struct EventRegistry {
    handlers: DashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
    default_handler: RwLock<Arc<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::with_default(Arc::new(PassThroughHandler))
    }

    /// A registry with an explicit fallback handler.
    pub fn with_default(default_handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handlers: DashMap::new(),
            default_handler: RwLock::new(default_handler),
        }
    }

    /// Append a handler to the list for its kind, creating the list on
    /// first use. Safe under concurrent registration; no entry is lost.
    pub fn register(&self, handler: Arc<dyn EventHandler>) -> Result<(), BusError> {
        let Some(kind) = handler.kind() else {
            return Err(BusError::configuration(
                "handler declares no event kind; it can only be installed as the default handler",
            ));
        };
        self.handlers.entry(kind).or_default().push(handler);
        Ok(())
    }

    /// Replace the fallback handler. Visible to subsequent lookups, not
    /// retroactive to in-flight dispatch.
    pub fn set_default_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.default_handler.write() = handler;
    }

    /// The handlers responsible for this event, in registration order. When
    /// no handler is registered for the event's kind, a one-element list
    /// with the default handler.
    pub fn handlers_for(&self, event: &ClusterEvent) -> Vec<Arc<dyn EventHandler>> {
        if let Some(list) = self.handlers.get(&event.kind()) {
            if !list.is_empty() {
                return list.value().clone();
            }
        }
        vec![self.default_handler.read().clone()]
    }

    /// Invoke every responsible handler sequentially, resolving the site
    /// from the event's site name.
    ///
    /// The first handler error aborts the remaining handlers for this event
    /// and is returned to the caller — a deliberate choice, documented in
    /// DESIGN.md, not an inherited guarantee.
    pub fn dispatch(&self, event: &ClusterEvent, env: &Environment) -> Result<(), BusError> {
        let site = event.site_name().and_then(|name| env.site(name));
        for handler in self.handlers_for(event) {
            handler.on_event(event, env, site.as_deref())?;
        }
        Ok(())
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
