// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sitebus: the cluster event-messaging core of a multi-tenant site platform.
//!
//! One node broadcasts application-level events ("site configuration changed",
//! "cache must be invalidated") to every other node in the cluster. Each node
//! hosts multiple isolated tenants ("sites"); an event is decoded on the
//! receiving side under the owning site's decoding context and routed through
//! a concurrent handler registry.
//!
//! The crate is transport-agnostic: [`transport::EventSender`] and
//! [`transport::EventReceiver`] abstract over the concrete wire mechanism, and
//! implementations are selected by configuration through a
//! [`transport::ReceiverFactory`]. An in-process loopback transport
//! ([`transport::local`]) ships with the crate and doubles as the test
//! vehicle. Delivery ordering and at-least-once semantics are properties of
//! the chosen transport, not of this core.

pub use anyhow::{
    anyhow as error, bail as raise, Context as ErrorContext, Error, Ok as OK, Result,
};

pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod logging;
pub mod node;
pub mod registry;
pub mod transport;

pub use codec::EventCodec;
pub use config::{PlatformConfig, TransportKind};
pub use environment::{Environment, MessagingPair, Scope, Site, SiteContext};
pub use error::{BusError, ErrorType};
pub use event::{ClusterEvent, EventKind, EventPayload, ExtensionEvent, ExtensionPayload};
pub use node::NodeId;
pub use registry::{EventHandler, EventRegistry, PassThroughHandler};
pub use transport::{EventReceiver, EventSender, ReceiverFactory, ReceiverState};

pub use tokio_util::sync::CancellationToken;
