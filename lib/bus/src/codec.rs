// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event encoding and decoding.
//!
//! One [`EventCodec`] is built per bootstrap and shared by the sender and
//! receiver that were built together. The wire form is a single JSON
//! envelope: the site name field first, then the event payload, with the
//! sending node's identity stamped immediately before encoding.
//!
//! Decoding resolves the owning site's [`SiteContext`] and passes it as an
//! explicit parameter into payload decoding — there is no thread-bound
//! decoding context to install or restore. Decode failures are logged and
//! yield `None`; the caller treats that as "nothing to dispatch", never as a
//! fatal condition.

use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::environment::{Environment, Site, SiteContext};
use crate::error::{BusError, ErrorType};
use crate::event::{ClusterEvent, EventPayload, ExtensionPayload};
use crate::node::NodeId;

/// The ambient context used when an event carries no site or an unknown one.
/// It has no extension decoders, so only the core payload variants decode
/// under it.
static DEFAULT_CONTEXT: Lazy<Arc<SiteContext>> = Lazy::new(|| Arc::new(SiteContext::new()));

/// The wire envelope. Field order matters for readers of the raw wire form:
/// the site name comes first, then the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEnvelope {
    site: Option<String>,
    node: Option<String>,
    event: WirePayload,
}

/// Wire form of the payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePayload {
    SiteConfigChanged { version: u64 },
    CacheFlush { keys: Vec<String> },
    Broadcast { message: String },
    Extension { tag: String, payload: serde_json::Value },
}

impl WirePayload {
    fn from_payload(payload: &EventPayload) -> Result<Self, BusError> {
        Ok(match payload {
            EventPayload::SiteConfigChanged { version } => {
                WirePayload::SiteConfigChanged { version: *version }
            }
            EventPayload::CacheFlush { keys } => WirePayload::CacheFlush { keys: keys.clone() },
            EventPayload::Broadcast { message } => WirePayload::Broadcast {
                message: message.clone(),
            },
            EventPayload::Extension { tag, payload } => WirePayload::Extension {
                tag: tag.clone(),
                payload: match payload {
                    ExtensionPayload::Typed(ext) => ext.to_value()?,
                    ExtensionPayload::Opaque(value) => value.clone(),
                },
            },
        })
    }

    /// Decode under an explicit site context. Core variants always decode;
    /// extension payloads require a decoder registered for their tag.
    fn into_payload(self, context: &SiteContext) -> Result<EventPayload, BusError> {
        Ok(match self {
            WirePayload::SiteConfigChanged { version } => {
                EventPayload::SiteConfigChanged { version }
            }
            WirePayload::CacheFlush { keys } => EventPayload::CacheFlush { keys },
            WirePayload::Broadcast { message } => EventPayload::Broadcast { message },
            WirePayload::Extension { tag, payload } => {
                let typed = context.decode(&tag, &payload)?;
                EventPayload::Extension {
                    tag,
                    payload: ExtensionPayload::Typed(typed),
                }
            }
        })
    }
}

/// Encodes and decodes cluster events for one node.
///
/// Immutable for its lifetime: the environment reference and the local node
/// identity are fixed at construction.
pub struct EventCodec {
    environment: Environment,
    node_id: NodeId,
}

impl EventCodec {
    pub fn new(environment: Environment, node_id: NodeId) -> Self {
        Self {
            environment,
            node_id,
        }
    }

    /// Stamp the event with this node's identity (overwriting any prior
    /// value) and encode it: site name first, then the event payload, in a
    /// single serialization scheme.
    pub fn encode(&self, event: &mut ClusterEvent) -> Result<Bytes, BusError> {
        event.stamp_node_id(&self.node_id);

        let wire = WireEnvelope {
            site: event.site_name().map(str::to_owned),
            node: event.node_id().map(str::to_owned),
            event: WirePayload::from_payload(event.payload())?,
        };

        let bytes = serde_json::to_vec(&wire)
            .map_err(|e| BusError::new(ErrorType::Serialization, "failed to encode event", Some(e)))?;
        Ok(Bytes::from(bytes))
    }

    /// Decode an inbound byte payload.
    ///
    /// The site name field is read first and used to resolve the decoding
    /// context: an unknown or absent site is a warning, and decoding
    /// continues under the default context. Any decode failure is logged
    /// and yields `None` — the offending message is dropped, nothing more.
    pub fn decode(&self, bytes: &[u8]) -> Option<ClusterEvent> {
        let envelope: WireEnvelope = match serde_json::from_slice(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(%err, "failed to decode event envelope; dropping message");
                return None;
            }
        };

        let context = match envelope.site.as_deref() {
            Some(name) => match self.environment.site_context(name) {
                Some(context) => context,
                None => {
                    tracing::warn!(
                        site = %name,
                        "no context found for site, decoding under the default context"
                    );
                    DEFAULT_CONTEXT.clone()
                }
            },
            None => {
                tracing::warn!("no site given, decoding under the default context");
                DEFAULT_CONTEXT.clone()
            }
        };

        match envelope.event.into_payload(&context) {
            Ok(payload) => Some(ClusterEvent::from_wire(envelope.site, envelope.node, payload)),
            Err(err) => {
                tracing::error!(
                    site = ?envelope.site,
                    node = ?envelope.node,
                    %err,
                    "failed to decode event payload; dropping message"
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Read-only accessors for consumers of a decoded event
    // ------------------------------------------------------------------

    pub fn site(&self, name: &str) -> Option<Arc<Site>> {
        self.environment.site(name)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn platform_config(&self) -> &crate::config::PlatformConfig {
        self.environment.platform_config()
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}
