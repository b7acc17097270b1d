//! Error types for the subscription core.

use thiserror::Error;

use crate::filter::FilterTypeError;

/// Errors surfaced by the subscription core.
#[derive(Error, Debug)]
pub enum Error {
    /// Subscription was attempted before the engine was initialized with a
    /// schema model. Setup-fatal; the caller must not continue silently.
    #[error("schema model is not available; initialize the engine before subscribing")]
    SchemaUnavailable,

    /// The engine has been closed; no further operations are accepted.
    #[error("engine is closed")]
    EngineClosed,

    /// A change-log engine failed to establish its cursor baseline during
    /// `init`. Setup-fatal; the engine never starts polling.
    #[error("cursor baseline sync failed: {0}")]
    CursorSync(String),

    /// A filter applied an operator to an incompatible field kind.
    #[error(transparent)]
    FilterType(#[from] FilterTypeError),

    /// Invalid subscription request.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
}

/// Result alias for the subscription core.
pub type Result<T> = std::result::Result<T, Error>;
