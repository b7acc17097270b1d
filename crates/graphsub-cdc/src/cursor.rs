//! Opaque change-log cursors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in the database's change log.
///
/// The token is minted by the database and is opaque to this crate: the
/// poller only stores it, hands it back on the next read, and replaces it
/// with the tail position the log reports. It is never inspected or
/// compared for ordering here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeCursor(String);

impl ChangeCursor {
    /// Wrap a database-provided cursor token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, as handed back to the database.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
