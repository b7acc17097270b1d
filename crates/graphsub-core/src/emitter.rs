//! In-process event emitter engine.
//!
//! The default, low-latency strategy for single-instance deployments: the
//! mutation-executing layer performs a write and immediately calls
//! [`EmitterEngine::publish`] with the canonical event. Fan-out is fully
//! synchronous from the publisher's point of view; there is no queue, so
//! `close` has nothing to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::engine::{
    open_subscription,
    SubscriptionEngine,
    SubscriptionHandle,
    SubscriptionRequest,
};
use crate::error::{Error, Result};
use crate::event::{ChangeEvent, EventClock};
use crate::schema::SchemaModel;
use crate::subscription::{SubscriptionId, SubscriptionRegistry};

/// Process-local publish/subscribe engine.
///
/// The listener registry is the only shared mutable state; its lock keeps
/// subscribe, unsubscribe and publish mutually exclusive, and publish
/// snapshots the listener list so removals during a fan-out apply to future
/// publishes only.
pub struct EmitterEngine {
    registry: SubscriptionRegistry,
    schema: RwLock<Option<Arc<dyn SchemaModel>>>,
    clock: EventClock,
    closed: AtomicBool,
}

impl EmitterEngine {
    /// Create an engine with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            schema: RwLock::new(None),
            clock: EventClock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Publish one canonical event to every subscription registered for its
    /// kind, synchronously and in registration order.
    ///
    /// The engine re-stamps the event from its monotonic clock so
    /// timestamps never decrease within this instance. After `close` the
    /// event is dropped.
    pub fn publish(&self, event: ChangeEvent) {
        if self.closed.load(Ordering::Acquire) {
            debug!(kind = %event.kind, "Engine closed; dropping event");
            return;
        }
        let mut event = event;
        event.timestamp = self.clock.now();
        self.registry.dispatch(Arc::new(event));
    }

    /// Number of live subscriptions for `kind` (diagnostics and tests).
    pub fn listener_count(&self, kind: crate::event::EventKind) -> usize {
        self.registry.listener_count(kind)
    }
}

impl Default for EmitterEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionEngine for EmitterEngine {
    async fn init(&self, schema: Arc<dyn SchemaModel>) -> Result<()> {
        *self.schema.write() = Some(schema);
        debug!("Emitter engine initialized");
        Ok(())
    }

    fn subscribe(&self, request: SubscriptionRequest) -> Result<SubscriptionHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        let schema = self.schema.read();
        let schema = schema.as_ref().ok_or(Error::SchemaUnavailable)?;
        open_subscription(&self.registry, schema.as_ref(), request)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.remove(id)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.clear();
        info!("Emitter engine closed");
    }
}
