// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Node identity resolution.
//!
//! Every process participating in the cluster carries exactly one immutable
//! [`NodeId`]. It is resolved once at process start from, in order: an
//! explicit override (usually `PlatformConfig::node_id_override`), the
//! `SITEBUS_NODE_ID` environment variable, and finally the local hostname.
//! The resolved value is cached so repeated resolution is stable for the
//! lifetime of the process.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// ENV used to set an explicit node identity
const NODE_ID_ENV: &str = "SITEBUS_NODE_ID";

/// Fallback identity when even the hostname cannot be determined
const UNKNOWN_NODE: &str = "localhost";

static RESOLVED: OnceLock<NodeId> = OnceLock::new();

/// The identity of one cluster node. Immutable once resolved; stamped into
/// every outbound event by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an already-known identity. Prefer [`NodeId::resolve`] in process
    /// startup paths so the cached value stays consistent.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the process-wide node identity.
    ///
    /// The first call decides the value; subsequent calls return the same
    /// identity regardless of their arguments.
    pub fn resolve(override_id: Option<&str>) -> NodeId {
        RESOLVED
            .get_or_init(|| Self::resolve_uncached(override_id, local_hostname))
            .clone()
    }

    /// Resolution logic without the process-wide cache. The hostname source
    /// is injectable so the fallback chain is testable.
    fn resolve_uncached(override_id: Option<&str>, hostname: impl FnOnce() -> Option<String>) -> NodeId {
        if let Some(id) = override_id.filter(|s| !s.is_empty()) {
            return NodeId(id.to_string());
        }
        if let Ok(id) = std::env::var(NODE_ID_ENV) {
            if !id.is_empty() {
                return NodeId(id);
            }
        }
        let host = hostname().unwrap_or_else(|| UNKNOWN_NODE.to_string());
        tracing::info!(node = %host, "no node id configured, falling back to local hostname");
        NodeId(host)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn local_hostname() -> Option<String> {
    whoami::fallible::hostname().ok()
}
