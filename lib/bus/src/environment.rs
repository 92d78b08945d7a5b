// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The shared process environment.
//!
//! [`Environment`] is the collaborator every messaging component reads
//! through: a scoped key/value store, the registry of hosted sites and their
//! decoding contexts, the platform configuration, and the slot holding the
//! process-wide published sender/receiver pair. It is a cheaply clonable
//! handle over shared state, in the style of the runtime handles the rest of
//! the platform passes around.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::config::PlatformConfig;
use crate::error::BusError;
use crate::event::ExtensionEvent;
use crate::transport::{EventReceiver, EventSender};

/// Addressing scope for the environment's key/value store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Platform-wide values shared by every site on this node
    Platform,
    /// Values owned by the messaging runtime itself
    Runtime,
    /// Values owned by one hosted site
    Site(String),
}

/// Decoder for one tenant-defined extension event tag.
pub type ExtensionDecoder =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn ExtensionEvent>, BusError> + Send + Sync>;

/// A site's payload-decoding context.
///
/// This is the closed-world counterpart of a tenant classloader: it knows
/// how to turn the wire form of tenant-defined extension events back into
/// typed values. The default context carries no decoders, so extension
/// payloads cannot be resolved under it — the same observable behavior as a
/// class that is unavailable on the receiving node.
#[derive(Clone, Default)]
pub struct SiteContext {
    decoders: HashMap<String, ExtensionDecoder>,
}

impl SiteContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder for an extension tag. Later registrations for the
    /// same tag replace earlier ones.
    pub fn register_decoder<F>(&mut self, tag: impl Into<String>, decoder: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn ExtensionEvent>, BusError> + Send + Sync + 'static,
    {
        self.decoders.insert(tag.into(), Arc::new(decoder));
    }

    /// Builder-style variant of [`SiteContext::register_decoder`].
    pub fn with_decoder<F>(mut self, tag: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&Value) -> Result<Arc<dyn ExtensionEvent>, BusError> + Send + Sync + 'static,
    {
        self.register_decoder(tag, decoder);
        self
    }

    pub fn has_decoder(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Resolve an extension payload under this context.
    pub fn decode(&self, tag: &str, payload: &Value) -> Result<Arc<dyn ExtensionEvent>, BusError> {
        let decoder = self.decoders.get(tag).ok_or_else(|| {
            BusError::deserialization(format!(
                "no decoder for extension event '{tag}' in this context"
            ))
        })?;
        decoder(payload)
    }
}

impl fmt::Debug for SiteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteContext")
            .field("tags", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One isolated tenant hosted by this node.
#[derive(Debug, Clone)]
pub struct Site {
    name: String,
    context: Arc<SiteContext>,
}

impl Site {
    pub fn new(name: impl Into<String>, context: SiteContext) -> Self {
        Self {
            name: name.into(),
            context: Arc::new(context),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<SiteContext> {
        &self.context
    }
}

/// The process-wide published messaging pair.
#[derive(Clone)]
pub struct MessagingPair {
    pub sender: Arc<dyn EventSender>,
    pub receiver: Arc<dyn EventReceiver>,
}

struct EnvironmentInner {
    config: PlatformConfig,
    values: RwLock<HashMap<(Scope, String), Value>>,
    sites: RwLock<HashMap<String, Arc<Site>>>,
    messaging: Mutex<Option<MessagingPair>>,
}

/// Cheaply clonable handle over the shared process state.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl Environment {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            inner: Arc::new(EnvironmentInner {
                config,
                values: RwLock::new(HashMap::new()),
                sites: RwLock::new(HashMap::new()),
                messaging: Mutex::new(None),
            }),
        }
    }

    pub fn platform_config(&self) -> &PlatformConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Scoped key/value store
    // ------------------------------------------------------------------

    pub fn set_value(&self, scope: Scope, key: impl Into<String>, value: Value) {
        self.inner.values.write().insert((scope, key.into()), value);
    }

    pub fn value(&self, scope: &Scope, key: &str) -> Option<Value> {
        self.inner
            .values
            .read()
            .get(&(scope.clone(), key.to_string()))
            .cloned()
    }

    pub fn remove_value(&self, scope: &Scope, key: &str) -> Option<Value> {
        self.inner
            .values
            .write()
            .remove(&(scope.clone(), key.to_string()))
    }

    /// Drop every value stored under the given scope.
    pub fn clear_scope(&self, scope: &Scope) {
        self.inner.values.write().retain(|(s, _), _| s != scope);
    }

    // ------------------------------------------------------------------
    // Sites
    // ------------------------------------------------------------------

    /// Register a hosted site. Replaces any site already registered under
    /// the same name and returns the stored handle.
    pub fn add_site(&self, site: Site) -> Arc<Site> {
        let site = Arc::new(site);
        self.inner
            .sites
            .write()
            .insert(site.name().to_string(), site.clone());
        site
    }

    pub fn site(&self, name: &str) -> Option<Arc<Site>> {
        self.inner.sites.read().get(name).cloned()
    }

    pub fn site_context(&self, name: &str) -> Option<Arc<SiteContext>> {
        self.site(name).map(|site| site.context().clone())
    }

    // ------------------------------------------------------------------
    // Published messaging singletons
    // ------------------------------------------------------------------

    /// The slot holding the process-wide messaging pair. The bootstrap
    /// facade holds this lock across its check-then-create sequence so
    /// concurrent bootstrap attempts cannot publish two pairs.
    pub(crate) fn messaging_slot(&self) -> &Mutex<Option<MessagingPair>> {
        &self.inner.messaging
    }

    pub fn published_sender(&self) -> Option<Arc<dyn EventSender>> {
        self.inner
            .messaging
            .lock()
            .as_ref()
            .map(|pair| pair.sender.clone())
    }

    pub fn published_receiver(&self) -> Option<Arc<dyn EventReceiver>> {
        self.inner
            .messaging
            .lock()
            .as_ref()
            .map(|pair| pair.receiver.clone())
    }

    /// Remove and return the published pair, if any.
    pub fn take_messaging(&self) -> Option<MessagingPair> {
        self.inner.messaging.lock().take()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("sites", &self.inner.sites.read().len())
            .field("published", &self.inner.messaging.lock().is_some())
            .finish()
    }
}
