//! # graphsub-cdc
//!
//! Change-data-capture event sourcing for `graphsub-core`: instead of being
//! told about writes in-process, [`CdcEngine`] polls the database's change
//! log on an interval and replays committed changes as canonical events.
//! This is the strategy for multi-instance deployments, where a write made
//! by one instance must reach listeners on every instance.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   CALL db.cdc.*   ┌─────────────────┐   parse    ┌──────────────┐
//! │  Database  │◀─────────────────│  PollWorker      │──────────▶│ Subscription │
//! │ change log │   entries+cursor  │ (cursor-tracked) │  events    │   Registry   │
//! └────────────┘                   └─────────────────┘            └──────────────┘
//! ```
//!
//! The engine implements the same [`SubscriptionEngine`] contract as the
//! in-process emitter, so consumers cannot tell the strategies apart other
//! than by latency and by at-least-once redelivery after a failed round.
//!
//! [`SubscriptionEngine`]: graphsub_core::SubscriptionEngine

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cursor;
pub mod driver;
pub mod log;
pub mod parser;
pub mod poller;
pub mod strategy;

pub use cursor::ChangeCursor;
pub use driver::{ChangeLogSource, DriverError, GraphDatabase, ProcedureChangeLogSource};
pub use log::{
    ChangeLogEntry,
    ChangeLogPage,
    RawChange,
    RawEndpoint,
    RawNodeChange,
    RawOperation,
    RawRelationshipChange,
};
pub use parser::{EventParser, ParseError};
pub use poller::{CdcConfig, CdcEngine};
pub use strategy::EngineStrategy;
