//! The shared engine capability both event-sourcing strategies implement.
//!
//! Consumers select a strategy at construction time (in-process
//! [`EmitterEngine`](crate::emitter::EmitterEngine) for single-instance
//! deployments, the change-log poller in `graphsub-cdc` for multi-instance
//! ones) and hold it as `Arc<dyn SubscriptionEngine>`. The consumer-facing
//! contract is identical either way.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::filter::{validate, FilterNode};
use crate::schema::SchemaModel;
use crate::subscription::{
    ChannelSink,
    EventResult,
    Subscription,
    SubscriptionId,
    SubscriptionRegistry,
};

/// What a client asks an engine to observe.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRequest {
    /// Event kinds to observe.
    pub kinds: Vec<EventKind>,
    /// Restrict to one logical entity type, if set.
    pub typename: Option<String>,
    /// Declarative filter applied per event before delivery.
    pub filter: Option<FilterNode>,
}

impl SubscriptionRequest {
    /// Observe the given event kinds.
    pub fn new(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            typename: None,
            filter: None,
        }
    }

    /// Scope to one logical entity type.
    pub fn for_type(mut self, typename: impl Into<String>) -> Self {
        self.typename = Some(typename.into());
        self
    }

    /// Attach a filter tree.
    pub fn with_filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Handle returned from a successful subscribe call.
///
/// Dropping the receiver does not unregister the subscription; callers
/// unsubscribe explicitly on disconnect.
#[derive(Debug)]
pub struct SubscriptionHandle {
    /// Id for later [`SubscriptionEngine::unsubscribe`].
    pub id: SubscriptionId,
    /// Stream of matching events, or the filter type error terminating it.
    pub events: mpsc::UnboundedReceiver<EventResult>,
}

/// Capability set shared by both event-sourcing strategies.
#[async_trait]
pub trait SubscriptionEngine: Send + Sync {
    /// Prepare the engine for subscriptions.
    ///
    /// Stores the schema model; the change-log strategy additionally syncs
    /// its cursor baseline here. Failure is setup-fatal: the engine stays
    /// unusable and the caller must treat subscription setup as failed.
    async fn init(&self, schema: Arc<dyn SchemaModel>) -> Result<()>;

    /// Open a subscription. Fails before `init`, after `close`, or when the
    /// request's filter is incompatible with declared field kinds.
    fn subscribe(&self, request: SubscriptionRequest) -> Result<SubscriptionHandle>;

    /// Remove a subscription; returns whether it existed. Dispatches already
    /// in flight still complete with the old listener set.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Shut the engine down. Idempotent; after close no further deliveries
    /// occur even if in-flight work completes later.
    async fn close(&self);
}

/// Shared subscribe path for both engines: validate the filter against
/// declared kinds where the schema can, then register a channel-backed
/// subscription.
pub fn open_subscription(
    registry: &SubscriptionRegistry,
    schema: &dyn SchemaModel,
    request: SubscriptionRequest,
) -> Result<SubscriptionHandle> {
    if request.kinds.is_empty() {
        return Err(Error::InvalidSubscription(
            "at least one event kind is required".to_string(),
        ));
    }
    if let (Some(filter), Some(typename)) = (&request.filter, &request.typename) {
        validate(filter, typename, schema)?;
    }

    let (sink, events) = ChannelSink::new();
    let subscription = Subscription::new(
        request.kinds,
        request.typename,
        request.filter,
        Box::new(sink),
    );
    let id = registry.insert(subscription);
    Ok(SubscriptionHandle { id, events })
}
