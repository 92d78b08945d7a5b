// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process loopback transport.
//!
//! [`LocalBus`] carries serialized events over a tokio broadcast channel.
//! Every receiver subscribed to the same bus sees every published message,
//! which makes a single process behave like a small cluster — the transport
//! used by the test suite and by single-node deployments that still want
//! the full messaging path exercised.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::codec::EventCodec;
use crate::error::BusError;
use crate::event::ClusterEvent;
use crate::registry::EventHandler;

use super::{
    dispatch_inbound, EventReceiver, EventSender, ReceiverCore, ReceiverState,
};

/// Buffered messages per subscriber before the bus starts dropping.
const LOCAL_BUS_CAPACITY: usize = 256;

/// The shared in-process message bus.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Bytes>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(LOCAL_BUS_CAPACITY);
        Self { tx }
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    fn publish(&self, bytes: Bytes) -> bool {
        self.tx.send(bytes).is_ok()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender half of the loopback transport.
pub struct LocalSender {
    bus: LocalBus,
    codec: Arc<EventCodec>,
}

#[async_trait]
impl EventSender for LocalSender {
    async fn send(&self, mut event: ClusterEvent) -> bool {
        let bytes = match self.codec.encode(&mut event) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(
                    site = ?event.site_name(),
                    kind = %event.kind(),
                    %err,
                    "failed to encode event"
                );
                return false;
            }
        };

        if !self.bus.publish(bytes) {
            tracing::warn!(kind = %event.kind(), "no receiver subscribed on local bus");
            return false;
        }
        true
    }
}

/// Receiver half of the loopback transport.
pub struct LocalReceiver {
    bus: LocalBus,
    core: ReceiverCore,
}

impl LocalReceiver {
    pub fn new(bus: LocalBus) -> Self {
        Self {
            bus,
            core: ReceiverCore::new(),
        }
    }

    /// The bus this receiver is subscribed to; senders built for the same
    /// bus reach this receiver.
    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }
}

#[async_trait]
impl EventReceiver for LocalReceiver {
    fn configure(&self, codec: Arc<EventCodec>) -> Result<(), BusError> {
        self.core.configure(codec)
    }

    fn register_handler(&self, handler: Arc<dyn EventHandler>) -> Result<(), BusError> {
        self.core.registry().register(handler)
    }

    fn set_default_handler(&self, handler: Arc<dyn EventHandler>) {
        self.core.registry().set_default_handler(handler);
    }

    fn run_with(&self, handle: &tokio::runtime::Handle) -> Result<(), BusError> {
        self.core.begin_run()?;

        let codec = self.core.codec()?;
        let registry = self.core.registry().clone();
        let cancel = self.core.cancel_token();
        let mut rx = self.bus.subscribe();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        tracing::info!("local receiver shutting down");
                        break;
                    }

                    msg = rx.recv() => match msg {
                        Ok(bytes) => match dispatch_inbound(&codec, &registry, &bytes) {
                            Ok(Some(kind)) => {
                                tracing::debug!(kind = %kind, "dispatched inbound event");
                            }
                            Ok(None) => {}
                            Err(err) => {
                                tracing::error!(%err, "inbound dispatch failed; continuing with next message");
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "local bus lagged; messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(())
    }

    fn create_sender(&self) -> Result<Arc<dyn EventSender>, BusError> {
        let codec = self.core.codec()?;
        Ok(Arc::new(LocalSender {
            bus: self.bus.clone(),
            codec,
        }))
    }

    async fn close(&self) {
        if self.core.mark_closed() {
            self.core.cancel_token().cancel();
        }
    }

    fn state(&self) -> ReceiverState {
        self.core.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::environment::{Environment, Site, SiteContext};
    use crate::event::{EventKind, EventPayload};
    use crate::node::NodeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct RecordingHandler {
        kind: EventKind,
        seen: Arc<AtomicUsize>,
        notify: Arc<Notify>,
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

    fn test_codec() -> Arc<EventCodec> {
        let env = Environment::new(PlatformConfig::default());
        env.add_site(Site::new("alpha", SiteContext::new()));
        Arc::new(EventCodec::new(env, NodeId::new("node-A")))
    }

    #[tokio::test]
    async fn test_loopback_delivery() {
        let receiver = LocalReceiver::new(LocalBus::new());
        receiver.configure(test_codec()).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        receiver
            .register_handler(Arc::new(RecordingHandler {
                kind: EventKind::CacheFlush,
                seen: seen.clone(),
                notify: notify.clone(),
            }))
            .unwrap();

        receiver.run_with(&tokio::runtime::Handle::current()).unwrap();
        let sender = receiver.create_sender().unwrap();

        let event = ClusterEvent::for_site("alpha", EventPayload::CacheFlush { keys: vec![] });
        assert!(sender.send(event).await);

        tokio::time::timeout(Duration::from_secs(2), notify.notified())
            .await
            .expect("event was not dispatched in time");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        receiver.close().await;
        assert_eq!(receiver.state(), ReceiverState::Closed);
    }

    #[tokio::test]
    async fn test_run_requires_configure() {
        let receiver = LocalReceiver::new(LocalBus::new());
        assert!(receiver
            .run_with(&tokio::runtime::Handle::current())
            .is_err());
    }

    #[tokio::test]
    async fn test_create_sender_requires_configure() {
        let receiver = LocalReceiver::new(LocalBus::new());
        assert!(receiver.create_sender().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let receiver = LocalReceiver::new(LocalBus::new());
        receiver.configure(test_codec()).unwrap();
        receiver.run_with(&tokio::runtime::Handle::current()).unwrap();

        receiver.close().await;
        receiver.close().await;
        assert_eq!(receiver.state(), ReceiverState::Closed);
    }

    #[tokio::test]
    async fn test_send_without_subscriber_reports_failure() {
        let bus = LocalBus::new();
        let sender = LocalSender {
            bus,
            codec: test_codec(),
        };

        let event = ClusterEvent::platform_wide(EventPayload::Broadcast {
            message: "nobody listening".into(),
        });
        assert!(!sender.send(event).await);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_the_loop() {
        struct FailingHandler;
        impl EventHandler for FailingHandler {
            fn kind(&self) -> Option<EventKind> {
                Some(EventKind::Broadcast)
            }
            fn on_event(
                &self,
                _event: &ClusterEvent,
                _env: &Environment,
                _site: Option<&Site>,
            ) -> Result<(), BusError> {
                Err(BusError::business("rejected"))
            }
        }

        let receiver = LocalReceiver::new(LocalBus::new());
        receiver.configure(test_codec()).unwrap();
        receiver.register_handler(Arc::new(FailingHandler)).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        receiver
            .register_handler(Arc::new(RecordingHandler {
                kind: EventKind::CacheFlush,
                seen: seen.clone(),
                notify: notify.clone(),
            }))
            .unwrap();

        receiver.run_with(&tokio::runtime::Handle::current()).unwrap();
        let sender = receiver.create_sender().unwrap();

        // First message fails in its handler; the loop must survive and
        // still dispatch the second, unrelated message.
        let failing = ClusterEvent::platform_wide(EventPayload::Broadcast {
            message: "boom".into(),
        });
        assert!(sender.send(failing).await);

        let ok = ClusterEvent::for_site("alpha", EventPayload::CacheFlush { keys: vec![] });
        assert!(sender.send(ok).await);

        tokio::time::timeout(Duration::from_secs(2), notify.notified())
            .await
            .expect("second event was not dispatched");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        receiver.close().await;
    }
}
