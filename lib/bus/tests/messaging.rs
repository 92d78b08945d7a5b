// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests for the messaging core: bootstrap through the facade,
//! loopback transport delivery, tenant-context decoding, and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;

use sitebus::{
    bootstrap, BusError, ClusterEvent, Environment, EventHandler, EventKind, EventPayload,
    ExtensionEvent, ExtensionPayload, NodeId, PlatformConfig, ReceiverFactory,
    ReceiverState, Scope, Site, SiteContext, TransportKind,
};

struct RecordingHandler {
    kind: EventKind,
    seen: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl RecordingHandler {
    fn new(kind: EventKind) -> (Arc<Self>, Arc<AtomicUsize>, Arc<Notify>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        (
            Arc::new(Self {
                kind,
                seen: seen.clone(),
                notify: notify.clone(),
            }),
            seen,
            notify,
        )
    }
}

impl EventHandler for RecordingHandler {
    fn kind(&self) -> Option<EventKind> {
        Some(self.kind)
    }

    fn on_event(
        &self,
        _event: &ClusterEvent,
        _env: &Environment,
        _site: Option<&Site>,
    ) -> Result<(), BusError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        Ok(())
    }
}

struct FailingHandler(EventKind);

impl EventHandler for FailingHandler {
    fn kind(&self) -> Option<EventKind> {
        Some(self.0)
    }

    fn on_event(
        &self,
        _event: &ClusterEvent,
        _env: &Environment,
        _site: Option<&Site>,
    ) -> Result<(), BusError> {
        Err(BusError::business("handler rejected the event"))
    }
}

#[derive(Debug)]
struct AuditEntry {
    entry: String,
}

impl ExtensionEvent for AuditEntry {
    fn tag(&self) -> &str {
        "audit"
    }

    fn to_value(&self) -> Result<serde_json::Value, BusError> {
        Ok(json!({ "entry": self.entry }))
    }

    fn perform(&self, env: &Environment, site: Option<&Site>) -> Result<(), BusError> {
        let scope = match site {
            Some(site) => Scope::Site(site.name().to_string()),
            None => Scope::Platform,
        };
        env.set_value(scope, "audit.last", json!(self.entry));
        Ok(())
    }
}

fn audit_context() -> SiteContext {
    SiteContext::new().with_decoder("audit", |value| {
        let entry = value
            .get("entry")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BusError::deserialization("audit entry missing"))?;
        Ok(Arc::new(AuditEntry {
            entry: entry.to_string(),
        }) as Arc<dyn ExtensionEvent>)
    })
}

fn enabled_env() -> Environment {
    let env = Environment::new(PlatformConfig::enabled(TransportKind::Local));
    env.add_site(Site::new("alpha", audit_context()));
    env
}

async fn wait_dispatched(notify: &Notify) {
    tokio::time::timeout(Duration::from_secs(2), notify.notified())
        .await
        .expect("event was not dispatched in time");
}

#[tokio::test]
async fn end_to_end_bootstrap_send_and_shutdown() {
    let env = enabled_env();
    let handle = tokio::runtime::Handle::current();
    let node = NodeId::new("node-A");
    let factory = ReceiverFactory::default();

    let (handler, seen, notify) = RecordingHandler::new(EventKind::CacheFlush);
    let sender = bootstrap::create_message_sender(
        &env,
        &handle,
        &node,
        None,
        vec![handler],
        &factory,
    )
    .expect("messaging should start");

    assert!(env.published_sender().is_some());
    let receiver = env.published_receiver().expect("receiver published");
    assert_eq!(receiver.state(), ReceiverState::Running);

    let event = ClusterEvent::for_site("alpha", EventPayload::CacheFlush { keys: vec![] });
    assert!(sender.send(event).await);
    wait_dispatched(&notify).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    bootstrap::shutdown(&env).await;
    assert_eq!(receiver.state(), ReceiverState::Closed);
    assert!(env.published_sender().is_none());

    // A second shutdown must be a quiet no-op.
    bootstrap::shutdown(&env).await;
}

#[tokio::test]
async fn bootstrap_is_gated_by_the_enabled_flag() {
    let env = Environment::new(PlatformConfig::default());
    let sender = bootstrap::create_message_sender(
        &env,
        &tokio::runtime::Handle::current(),
        &NodeId::new("node-A"),
        None,
        vec![],
        &ReceiverFactory::default(),
    );

    assert!(sender.is_none());
    assert!(env.published_sender().is_none());
    assert!(env.published_receiver().is_none());
}

#[tokio::test]
async fn bootstrap_failure_leaves_no_published_state() {
    let env = Environment::new(PlatformConfig::enabled(TransportKind::Custom(
        "nonexistent".into(),
    )));
    let sender = bootstrap::create_message_sender(
        &env,
        &tokio::runtime::Handle::current(),
        &NodeId::new("node-A"),
        None,
        vec![],
        &ReceiverFactory::default(),
    );

    assert!(sender.is_none());
    assert!(env.published_sender().is_none());
    assert!(env.published_receiver().is_none());
}

#[tokio::test]
async fn default_handler_receives_unrouted_kinds() {
    let env = enabled_env();
    let handle = tokio::runtime::Handle::current();

    let (default_handler, seen, notify) = RecordingHandler::new(EventKind::Broadcast);
    let sender = bootstrap::create_message_sender(
        &env,
        &handle,
        &NodeId::new("node-A"),
        Some(default_handler),
        vec![],
        &ReceiverFactory::default(),
    )
    .expect("messaging should start");

    // No handler registered for site_config_changed, so the configured
    // default handler receives it.
    let event =
        ClusterEvent::for_site("alpha", EventPayload::SiteConfigChanged { version: 5 });
    assert!(sender.send(event).await);
    wait_dispatched(&notify).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    bootstrap::shutdown(&env).await;
}

#[tokio::test]
async fn pass_through_default_performs_the_event() {
    let env = enabled_env();
    let handle = tokio::runtime::Handle::current();

    // No handlers at all: the library pass-through default invokes the
    // event's own perform, which records the new config version.
    let sender = bootstrap::create_message_sender(
        &env,
        &handle,
        &NodeId::new("node-A"),
        None,
        vec![],
        &ReceiverFactory::default(),
    )
    .expect("messaging should start");

    let event =
        ClusterEvent::for_site("alpha", EventPayload::SiteConfigChanged { version: 11 });
    assert!(sender.send(event).await);

    let scope = Scope::Site("alpha".into());
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if env.value(&scope, "config.version") == Some(json!(11)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("config version was not recorded");

    bootstrap::shutdown(&env).await;
}

#[tokio::test]
async fn failing_handler_does_not_stop_subsequent_dispatch() {
    let env = enabled_env();
    let handle = tokio::runtime::Handle::current();

    let (ok_handler, seen, notify) = RecordingHandler::new(EventKind::CacheFlush);
    let sender = bootstrap::create_message_sender(
        &env,
        &handle,
        &NodeId::new("node-A"),
        None,
        vec![Arc::new(FailingHandler(EventKind::Broadcast)), ok_handler],
        &ReceiverFactory::default(),
    )
    .expect("messaging should start");

    let failing = ClusterEvent::platform_wide(EventPayload::Broadcast {
        message: "boom".into(),
    });
    assert!(sender.send(failing).await);

    let ok = ClusterEvent::for_site("alpha", EventPayload::CacheFlush { keys: vec![] });
    assert!(sender.send(ok).await);

    wait_dispatched(&notify).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    bootstrap::shutdown(&env).await;
}

#[tokio::test]
async fn extension_event_round_trips_through_the_owning_site() {
    let env = enabled_env();
    let handle = tokio::runtime::Handle::current();

    let sender = bootstrap::create_message_sender(
        &env,
        &handle,
        &NodeId::new("node-A"),
        None,
        vec![],
        &ReceiverFactory::default(),
    )
    .expect("messaging should start");

    let event = ClusterEvent::for_site(
        "alpha",
        EventPayload::Extension {
            tag: "audit".into(),
            payload: ExtensionPayload::Typed(Arc::new(AuditEntry {
                entry: "login".into(),
            })),
        },
    );
    assert!(sender.send(event).await);

    let scope = Scope::Site("alpha".into());
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if env.value(&scope, "audit.last") == Some(json!("login")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("extension event was not performed");

    bootstrap::shutdown(&env).await;
}

#[tokio::test]
async fn handlers_can_register_while_the_loop_is_running() {
    let env = enabled_env();
    let handle = tokio::runtime::Handle::current();

    let sender = bootstrap::create_message_sender(
        &env,
        &handle,
        &NodeId::new("node-A"),
        None,
        vec![],
        &ReceiverFactory::default(),
    )
    .expect("messaging should start");

    let receiver = env.published_receiver().unwrap();
    let (handler, seen, notify) = RecordingHandler::new(EventKind::Broadcast);
    receiver.register_handler(handler).unwrap();

    let event = ClusterEvent::platform_wide(EventPayload::Broadcast {
        message: "late registration".into(),
    });
    assert!(sender.send(event).await);
    wait_dispatched(&notify).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    bootstrap::shutdown(&env).await;
}
