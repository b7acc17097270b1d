//! Database-driver collaborator seam.
//!
//! The actual driver lives outside this crate. The poller only needs two
//! primitives — "where is the log's tail right now" and "give me everything
//! after this cursor" — expressed by [`ChangeLogSource`]. Stores that expose
//! their change log through Cypher procedures can plug a plain query runner
//! ([`GraphDatabase`]) into [`ProcedureChangeLogSource`].

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use crate::cursor::ChangeCursor;
use crate::log::{ChangeLogEntry, ChangeLogPage};

/// A database call failed.
///
/// During a poll round this is recoverable; during `init` it is fatal to
/// engine startup.
#[derive(Debug, Clone, Error)]
#[error("database driver error: {message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    /// Wrap a driver failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query-execution primitive supplied by the driver collaborator.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    /// Run a Cypher query and return its rows as JSON objects.
    async fn run_query(
        &self,
        cypher: &str,
        params: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, DriverError>;
}

/// Incremental change-log access, consumed by the poller.
#[async_trait]
pub trait ChangeLogSource: Send + Sync {
    /// The log's current tail position. Used once, at `init`, as the
    /// baseline; history before it is never observed.
    async fn current_cursor(&self) -> Result<ChangeCursor, DriverError>;

    /// All entries strictly after `since`, in log order, plus the new tail.
    async fn query_change_log(&self, since: &ChangeCursor)
        -> Result<ChangeLogPage, DriverError>;
}

/// [`ChangeLogSource`] for stores that expose CDC as Cypher procedures.
pub struct ProcedureChangeLogSource<D> {
    db: D,
}

impl<D: GraphDatabase> ProcedureChangeLogSource<D> {
    /// Wrap a query runner.
    pub fn new(db: D) -> Self {
        Self { db }
    }
}

#[async_trait]
impl<D: GraphDatabase> ChangeLogSource for ProcedureChangeLogSource<D> {
    async fn current_cursor(&self) -> Result<ChangeCursor, DriverError> {
        let rows = self
            .db
            .run_query("CALL db.cdc.current()", serde_json::json!({}))
            .await?;
        let token = rows
            .first()
            .and_then(|row| row.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| DriverError::new("db.cdc.current() returned no cursor"))?;
        Ok(ChangeCursor::new(token))
    }

    async fn query_change_log(
        &self,
        since: &ChangeCursor,
    ) -> Result<ChangeLogPage, DriverError> {
        let rows = self
            .db
            .run_query(
                "CALL db.cdc.query($from)",
                serde_json::json!({ "from": since.as_str() }),
            )
            .await?;
        trace!(since = %since, rows = rows.len(), "Change-log query returned");

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry: ChangeLogEntry = serde_json::from_value(row)
                .map_err(|err| DriverError::new(format!("malformed change-log row: {err}")))?;
            entries.push(entry);
        }
        // With no new entries the tail is wherever we already were.
        let cursor = entries
            .last()
            .map(|entry| ChangeCursor::new(entry.id.clone()))
            .unwrap_or_else(|| since.clone());
        Ok(ChangeLogPage { entries, cursor })
    }
}
