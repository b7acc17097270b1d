//! Subscription registry shared by both event-sourcing engines.
//!
//! The registry is the single piece of shared mutable state behind an
//! engine: a mapping from event kind to the ordered list of live
//! subscriptions. Both the in-process emitter and the change-log poller
//! dispatch through it, which is what makes their consumer-facing contract
//! identical.
//!
//! Delivery rules per subscription:
//! - filter passes → the event is delivered;
//! - filter fails → the event is silently dropped for that subscriber only;
//! - filter raises a type error → the error is delivered to that subscriber
//!   and its stream is closed; other subscribers are unaffected;
//! - sink failures are logged and isolated, never propagated to the
//!   publisher or to other subscribers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::event::{ChangeEvent, EventKind};
use crate::filter::{evaluate, FilterNode, FilterTypeError};

/// Unique handle for one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One delivery to a subscriber: a matching event, or the filter type error
/// that terminates the stream.
pub type EventResult = std::result::Result<Arc<ChangeEvent>, FilterTypeError>;

/// Receives filtered events for one subscription.
///
/// Implementations are typically transport adapters. A returned error is
/// logged and isolated to this sink; it never affects the publisher or
/// other subscribers.
pub trait EventSink: Send + Sync {
    /// Deliver one outcome to the subscriber.
    fn deliver(&self, outcome: EventResult) -> anyhow::Result<()>;
}

/// [`EventSink`] backed by an unbounded tokio channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<EventResult>,
}

impl ChannelSink {
    /// Create a sink and the receiver a transport consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventResult>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, outcome: EventResult) -> anyhow::Result<()> {
        self.sender
            .send(outcome)
            .map_err(|_| anyhow::anyhow!("subscriber channel closed"))
    }
}

/// A live registration: target kinds, optional filter, delivery sink.
///
/// Subscriptions are transient observers; they do not own events and are
/// not persisted across restarts.
pub struct Subscription {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    typename: Option<String>,
    filter: Option<FilterNode>,
    sink: Box<dyn EventSink>,
    /// Set after a filter type error has been delivered; the stream is
    /// considered terminated and gets nothing further.
    errored: AtomicBool,
}

impl Subscription {
    /// Build a subscription delivering into `sink`.
    pub fn new(
        kinds: Vec<EventKind>,
        typename: Option<String>,
        filter: Option<FilterNode>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            kinds,
            typename,
            filter,
            sink,
            errored: AtomicBool::new(false),
        }
    }

    /// This subscription's handle.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event kinds this subscription observes.
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    /// Optional entity-type scope.
    pub fn typename(&self) -> Option<&str> {
        self.typename.as_deref()
    }

    /// Optional filter tree.
    pub fn filter(&self) -> Option<&FilterNode> {
        self.filter.as_ref()
    }

    fn wants(&self, event: &ChangeEvent) -> bool {
        if let Some(typename) = &self.typename {
            if *typename != event.typename {
                return false;
            }
        }
        true
    }

    /// Run the filter and deliver. Called by the registry with an immutable
    /// shared event.
    fn notify(&self, event: &Arc<ChangeEvent>) {
        if self.errored.load(Ordering::Acquire) || !self.wants(event) {
            return;
        }

        let outcome = match &self.filter {
            None => Some(Ok(Arc::clone(event))),
            Some(filter) => match evaluate(filter, event) {
                Ok(true) => Some(Ok(Arc::clone(event))),
                Ok(false) => None,
                Err(type_error) => {
                    warn!(
                        subscription_id = %self.id,
                        error = %type_error,
                        "Filter type error; terminating subscriber stream"
                    );
                    self.errored.store(true, Ordering::Release);
                    Some(Err(type_error))
                }
            },
        };

        if let Some(outcome) = outcome {
            if let Err(err) = self.sink.deliver(outcome) {
                // Isolated: a broken sink must not affect other subscribers.
                error!(
                    subscription_id = %self.id,
                    error = %err,
                    "Event delivery failed"
                );
            }
        }
    }
}

/// Ordered registry of live subscriptions, keyed by event kind.
///
/// Owned exclusively by one engine instance. Insertion order per kind is
/// delivery order; there is no ordering guarantee across kinds. Duplicate
/// registrations are distinct entries.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_kind: RwLock<HashMap<EventKind, Vec<Arc<Subscription>>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription under each of its target kinds.
    pub fn insert(&self, subscription: Subscription) -> SubscriptionId {
        let id = subscription.id();
        let subscription = Arc::new(subscription);
        let mut by_kind = self.by_kind.write();
        for kind in subscription.kinds() {
            by_kind
                .entry(*kind)
                .or_default()
                .push(Arc::clone(&subscription));
        }
        debug!(subscription_id = %id, kinds = ?subscription.kinds(), "Subscription added");
        id
    }

    /// Remove a subscription everywhere it is registered.
    ///
    /// Returns `true` if anything was removed. Removal affects future
    /// dispatches only; a dispatch already iterating its snapshot completes
    /// with the old listener list.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        let mut by_kind = self.by_kind.write();
        for subscriptions in by_kind.values_mut() {
            let before = subscriptions.len();
            subscriptions.retain(|s| s.id() != id);
            removed |= subscriptions.len() != before;
        }
        by_kind.retain(|_, subscriptions| !subscriptions.is_empty());
        if removed {
            debug!(subscription_id = %id, "Subscription removed");
        }
        removed
    }

    /// Drop all subscriptions.
    pub fn clear(&self) {
        self.by_kind.write().clear();
    }

    /// Number of subscriptions registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.by_kind.read().get(&kind).map_or(0, Vec::len)
    }

    /// Whether no subscription is registered at all.
    pub fn is_empty(&self) -> bool {
        self.by_kind.read().is_empty()
    }

    /// Fan one event out to every subscription registered for its kind, in
    /// registration order.
    ///
    /// The listener list is snapshotted before delivery, so subscribe and
    /// unsubscribe calls made while a dispatch runs apply to future
    /// dispatches only.
    pub fn dispatch(&self, event: Arc<ChangeEvent>) {
        let snapshot: Vec<Arc<Subscription>> = {
            let by_kind = self.by_kind.read();
            match by_kind.get(&event.kind) {
                Some(subscriptions) => subscriptions.clone(),
                None => return,
            }
        };
        for subscription in snapshot {
            subscription.notify(&event);
        }
    }
}
