//! # graphsub-core
//!
//! Change-notification core for a GraphQL-to-graph-database mapping layer:
//! canonical change events, declarative per-subscriber filtering, and the
//! in-process emitter engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────────┐     ┌───────────────┐
//! │  Mutation layer  │────▶│  SubscriptionEngine  │────▶│  Subscribers  │
//! │ (publish / CDC)  │     │ (emitter or poller)  │     │ (per-filter)  │
//! └──────────────────┘     └──────────────────────┘     └───────────────┘
//!                                     │
//!                                     ▼
//!                          ┌──────────────────────┐
//!                          │ SubscriptionRegistry │
//!                          │  (kind → listeners)  │
//!                          └──────────────────────┘
//! ```
//!
//! Both event-sourcing strategies implement [`SubscriptionEngine`] and fan
//! out through the same [`SubscriptionRegistry`], so subscribers observe an
//! identical contract whether events come from an in-process publish or
//! from polling a database change log (see the `graphsub-cdc` crate).
//!
//! Per event and per subscriber: the filter tree is evaluated first; events
//! that pass are delivered, events that fail are dropped for that
//! subscriber only, and a filter/type incompatibility errors just that
//! subscriber's stream.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod emitter;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod scalar;
pub mod schema;
pub mod subscription;

pub use emitter::EmitterEngine;
pub use engine::{
    open_subscription,
    SubscriptionEngine,
    SubscriptionHandle,
    SubscriptionRequest,
};
pub use error::{Error, Result};
pub use event::{
    ChangeEvent,
    EndpointInfo,
    EventClock,
    EventKind,
    EventProperties,
    PropertyMap,
    RelationshipDirection,
    RelationshipInfo,
};
pub use filter::{
    evaluate,
    validate,
    EndpointSide,
    FieldPath,
    FilterLeaf,
    FilterNode,
    FilterOp,
    FilterTypeError,
    RelationshipLifecycle,
};
pub use scalar::{FieldKind, ScalarKind, ScalarValue};
pub use schema::{SchemaModel, StaticSchemaModel, TypeDefinition};
pub use subscription::{
    ChannelSink,
    EventResult,
    EventSink,
    Subscription,
    SubscriptionId,
    SubscriptionRegistry,
};
