// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The cluster event model.
//!
//! [`ClusterEvent`] is the unit of work broadcast between nodes: a closed
//! set of payload variants tagged with the tenant the event concerns and the
//! node that sent it. The payload set is deliberately a sum type — handler
//! routing is by [`EventKind`] with an explicit fallback arm, not by runtime
//! type inspection. Tenant-defined behavior plugs in through the
//! [`ExtensionEvent`] trait rather than by opening the enum.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use crate::environment::{Environment, Scope, Site};
use crate::error::BusError;
use crate::node::NodeId;

/// The routing key for handler dispatch: one tag per payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SiteConfigChanged,
    CacheFlush,
    Broadcast,
    Extension,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::SiteConfigChanged => write!(f, "site_config_changed"),
            EventKind::CacheFlush => write!(f, "cache_flush"),
            EventKind::Broadcast => write!(f, "broadcast"),
            EventKind::Extension => write!(f, "extension"),
        }
    }
}

/// A tenant-defined event payload.
///
/// Sites register decoders for their tags in their
/// [`crate::environment::SiteContext`]; the codec resolves inbound extension
/// payloads through the owning site's context. `to_value` must produce the
/// wire form the registered decoder accepts back.
pub trait ExtensionEvent: fmt::Debug + Send + Sync {
    /// The tag identifying this payload type on the wire.
    fn tag(&self) -> &str;

    /// The wire form of this payload.
    fn to_value(&self) -> Result<serde_json::Value, BusError>;

    /// The business effect of this event on the receiving node.
    fn perform(&self, env: &Environment, site: Option<&Site>) -> Result<(), BusError>;
}

/// An extension payload in one of its two resolution states.
#[derive(Debug, Clone)]
pub enum ExtensionPayload {
    /// Wire form only; the owning site's context has not resolved it.
    Opaque(serde_json::Value),
    /// Resolved against a site context into a typed payload.
    Typed(Arc<dyn ExtensionEvent>),
}

/// The closed set of event payloads this platform broadcasts.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A site's configuration changed; receiving nodes record the new
    /// version so stale local state can be refreshed.
    SiteConfigChanged { version: u64 },
    /// Invalidate cached values: the listed keys, or the entire scope when
    /// the list is empty.
    CacheFlush { keys: Vec<String> },
    /// An operator-visible notice with no state effect.
    Broadcast { message: String },
    /// A tenant-defined payload, see [`ExtensionEvent`].
    Extension {
        tag: String,
        payload: ExtensionPayload,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::SiteConfigChanged { .. } => EventKind::SiteConfigChanged,
            EventPayload::CacheFlush { .. } => EventKind::CacheFlush,
            EventPayload::Broadcast { .. } => EventKind::Broadcast,
            EventPayload::Extension { .. } => EventKind::Extension,
        }
    }
}

/// One unit of work broadcast across the cluster.
///
/// The site name is fixed at construction; the node id is written exactly
/// once, by the codec, when the event is encoded for transmission.
#[derive(Debug, Clone)]
pub struct ClusterEvent {
    site_name: Option<String>,
    node_id: Option<String>,
    payload: EventPayload,
}

impl ClusterEvent {
    /// An event concerning one hosted site.
    pub fn for_site(site_name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            site_name: Some(site_name.into()),
            node_id: None,
            payload,
        }
    }

    /// A platform-wide event with no owning site.
    pub fn platform_wide(payload: EventPayload) -> Self {
        Self {
            site_name: None,
            node_id: None,
            payload,
        }
    }

    /// Rebuild an event from its decoded wire fields.
    pub(crate) fn from_wire(
        site_name: Option<String>,
        node_id: Option<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            site_name,
            node_id,
            payload,
        }
    }

    pub fn site_name(&self) -> Option<&str> {
        self.site_name.as_deref()
    }

    /// Identity of the sending node. Absent until the event has passed
    /// through a codec.
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub(crate) fn stamp_node_id(&mut self, node: &NodeId) {
        self.node_id = Some(node.as_str().to_string());
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Execute the event's business effect on the receiving node.
    ///
    /// Effects land in the site's scope when the event carries a site, and
    /// in the platform scope otherwise. Errors propagate to the dispatch
    /// layer; nothing is swallowed here.
    pub fn perform(&self, env: &Environment, site: Option<&Site>) -> Result<(), BusError> {
        let scope = match site {
            Some(site) => Scope::Site(site.name().to_string()),
            None => Scope::Platform,
        };

        match &self.payload {
            EventPayload::SiteConfigChanged { version } => {
                env.set_value(scope, "config.version", json!(version));
                Ok(())
            }
            EventPayload::CacheFlush { keys } => {
                if keys.is_empty() {
                    env.clear_scope(&scope);
                } else {
                    for key in keys {
                        env.remove_value(&scope, key);
                    }
                }
                Ok(())
            }
            EventPayload::Broadcast { message } => {
                tracing::info!(
                    site = ?self.site_name,
                    node = ?self.node_id,
                    message = %message,
                    "cluster broadcast"
                );
                Ok(())
            }
            EventPayload::Extension { tag, payload } => match payload {
                ExtensionPayload::Typed(ext) => ext.perform(env, site),
                ExtensionPayload::Opaque(_) => Err(BusError::configuration(format!(
                    "extension event '{tag}' was not resolved by any site context"
                ))),
            },
        }
    }
}
