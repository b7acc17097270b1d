//! Raw change-log entry model.
//!
//! The shape of one record as the database's CDC procedures return it,
//! deserialized from driver rows but not yet normalized: property bags are
//! still raw JSON and labels are still store labels. The
//! [`parser`](crate::parser) turns these into canonical events.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cursor::ChangeCursor;

/// One page of change-log entries plus the log's new tail position.
///
/// The cursor must advance to `cursor` after a fully processed round even
/// when `entries` is empty.
#[derive(Debug, Clone)]
pub struct ChangeLogPage {
    /// Entries strictly after the queried cursor, in log order.
    pub entries: Vec<ChangeLogEntry>,
    /// The log's tail position after these entries.
    pub cursor: ChangeCursor,
}

/// One committed change record from the log.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeLogEntry {
    /// The entry's own position token.
    pub id: String,
    /// Transaction the change was committed in.
    #[serde(rename = "txId")]
    pub tx_id: i64,
    /// Sequence number of the change within its transaction.
    #[serde(default)]
    pub seq: i64,
    /// The change itself.
    pub event: RawChange,
}

/// The entity-level payload of a change record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "elementType", rename_all = "lowercase")]
pub enum RawChange {
    /// A node mutation.
    Node(RawNodeChange),
    /// A relationship mutation.
    Relationship(RawRelationshipChange),
    /// Any element type this crate does not understand.
    #[serde(other)]
    Unknown,
}

/// Mutation kind as the log encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawOperation {
    /// Entity created.
    Create,
    /// Entity properties changed.
    Update,
    /// Entity deleted.
    Delete,
}

/// A node change, with raw before/after property bags.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNodeChange {
    /// Store-native element id.
    #[serde(rename = "elementId")]
    pub element_id: String,
    /// Store-native numeric id.
    #[serde(default)]
    pub id: i64,
    /// Labels on the node at change time.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Mutation kind.
    pub operation: RawOperation,
    /// Properties before the change; absent on create.
    #[serde(default)]
    pub before: Option<Map<String, Value>>,
    /// Properties after the change; absent on delete.
    #[serde(default)]
    pub after: Option<Map<String, Value>>,
}

/// A relationship change.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRelationshipChange {
    /// Store-native element id.
    #[serde(rename = "elementId")]
    pub element_id: String,
    /// Store-native numeric id.
    #[serde(default)]
    pub id: i64,
    /// Relationship type name.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Mutation kind.
    pub operation: RawOperation,
    /// Relationship properties before the change.
    #[serde(default)]
    pub before: Option<Map<String, Value>>,
    /// Relationship properties after the change.
    #[serde(default)]
    pub after: Option<Map<String, Value>>,
    /// Start node descriptor.
    pub start: RawEndpoint,
    /// End node descriptor.
    pub end: RawEndpoint,
}

/// Descriptor of a relationship endpoint node.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEndpoint {
    /// Store-native element id.
    #[serde(rename = "elementId")]
    pub element_id: String,
    /// Store-native numeric id.
    #[serde(default)]
    pub id: i64,
    /// Labels on the endpoint node.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Endpoint properties captured with the change.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn node_create_entry_deserializes() {
        let entry: ChangeLogEntry = serde_json::from_value(json!({
            "id": "A1",
            "txId": 17,
            "seq": 0,
            "event": {
                "elementType": "node",
                "elementId": "4:abc:1",
                "id": 1,
                "labels": ["Movie"],
                "operation": "create",
                "after": { "title": "movie1" }
            }
        }))
        .unwrap();
        assert_eq!(entry.tx_id, 17);
        match entry.event {
            RawChange::Node(node) => {
                assert_eq!(node.operation, RawOperation::Create);
                assert_eq!(node.labels, vec!["Movie".to_string()]);
                assert!(node.before.is_none());
                assert_eq!(node.after.unwrap()["title"], json!("movie1"));
            }
            other => panic!("expected node change, got {other:?}"),
        }
    }

    #[test]
    fn relationship_entry_deserializes_with_endpoints() {
        let entry: ChangeLogEntry = serde_json::from_value(json!({
            "id": "B2",
            "txId": 18,
            "event": {
                "elementType": "relationship",
                "elementId": "5:abc:9",
                "id": 9,
                "type": "ACTED_IN",
                "operation": "create",
                "after": { "role": "Neo" },
                "start": { "elementId": "4:abc:2", "id": 2, "labels": ["Actor"] },
                "end": { "elementId": "4:abc:1", "id": 1, "labels": ["Movie"] }
            }
        }))
        .unwrap();
        match entry.event {
            RawChange::Relationship(rel) => {
                assert_eq!(rel.rel_type, "ACTED_IN");
                assert_eq!(rel.start.labels, vec!["Actor".to_string()]);
            }
            other => panic!("expected relationship change, got {other:?}"),
        }
    }

    #[test]
    fn unknown_element_type_maps_to_unknown() {
        let entry: ChangeLogEntry = serde_json::from_value(json!({
            "id": "C3",
            "txId": 19,
            "event": { "elementType": "constraint" }
        }))
        .unwrap();
        assert!(matches!(entry.event, RawChange::Unknown));
    }
}
