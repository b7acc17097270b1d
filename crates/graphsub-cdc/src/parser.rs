//! Change-log entry parsing.
//!
//! Pure transformation from one raw log entry into zero or one canonical
//! events. "Zero" is normal: entries touching entities the schema model
//! does not declare are internal bookkeeping from the subscription layer's
//! point of view and produce nothing. An entry whose shape this crate does
//! not recognize is an error; call sites log and skip it rather than
//! failing the poll round.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use graphsub_core::event::{
    ChangeEvent,
    EndpointInfo,
    PropertyMap,
    RelationshipDirection,
    RelationshipInfo,
};
use graphsub_core::scalar::ScalarValue;
use graphsub_core::schema::SchemaModel;

use crate::log::{ChangeLogEntry, RawChange, RawEndpoint, RawNodeChange, RawOperation,
    RawRelationshipChange};

/// A change-log entry that could not be turned into an event.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The entry's element type is not one this crate understands.
    #[error("unrecognized change-log entry '{0}'")]
    Unrecognized(String),

    /// An operation arrived without the property state it requires (e.g. a
    /// create without `after`).
    #[error("change-log entry '{id}' is missing its {side} state for {op:?}")]
    MissingState {
        /// Entry id.
        id: String,
        /// Which state bag is missing (`before`/`after`).
        side: &'static str,
        /// The operation that required it.
        op: RawOperation,
    },
}

/// Parses raw change-log entries into canonical events.
///
/// Holds the schema model used to resolve label sets to logical typenames
/// and to steer wire decoding by declared field kind. When several logical
/// types share a label set the first match in the model's declared order
/// wins; the resolution must be deterministic, not "correct".
pub struct EventParser {
    schema: Arc<dyn SchemaModel>,
}

impl EventParser {
    /// Create a parser over the given schema model.
    pub fn new(schema: Arc<dyn SchemaModel>) -> Self {
        Self { schema }
    }

    /// Parse one entry. `timestamp` is assigned by the engine's monotonic
    /// clock, not read from the entry.
    pub fn parse(
        &self,
        entry: &ChangeLogEntry,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ChangeEvent>, ParseError> {
        match &entry.event {
            RawChange::Node(node) => self.parse_node(entry, node, timestamp),
            RawChange::Relationship(rel) => self.parse_relationship(rel, timestamp),
            RawChange::Unknown => Err(ParseError::Unrecognized(entry.id.clone())),
        }
    }

    fn parse_node(
        &self,
        entry: &ChangeLogEntry,
        node: &RawNodeChange,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ChangeEvent>, ParseError> {
        let Some(typename) = self.schema.typename_for_labels(&node.labels) else {
            return Ok(None);
        };

        let event = match node.operation {
            RawOperation::Create => {
                let after = require_state(entry, node.after.as_ref(), "after", node.operation)?;
                ChangeEvent::created(
                    typename.clone(),
                    node.id,
                    node.element_id.clone(),
                    self.decode_properties(after, &typename),
                    timestamp,
                )
            }
            RawOperation::Update => {
                let before = require_state(entry, node.before.as_ref(), "before", node.operation)?;
                let after = require_state(entry, node.after.as_ref(), "after", node.operation)?;
                ChangeEvent::updated(
                    typename.clone(),
                    node.id,
                    node.element_id.clone(),
                    self.decode_properties(before, &typename),
                    self.decode_properties(after, &typename),
                    timestamp,
                )
            }
            RawOperation::Delete => {
                let before = require_state(entry, node.before.as_ref(), "before", node.operation)?;
                ChangeEvent::deleted(
                    typename.clone(),
                    node.id,
                    node.element_id.clone(),
                    self.decode_properties(before, &typename),
                    timestamp,
                )
            }
        };
        Ok(Some(event))
    }

    fn parse_relationship(
        &self,
        rel: &RawRelationshipChange,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ChangeEvent>, ParseError> {
        // Only declared relationship types are user-visible.
        let Some(typename) = self.schema.typename_for_relationship(&rel.rel_type) else {
            return Ok(None);
        };
        let Some(from) = self.decode_endpoint(&rel.start) else {
            return Ok(None);
        };
        let Some(to) = self.decode_endpoint(&rel.end) else {
            return Ok(None);
        };

        // Log entries are normalized to the stored direction: start is the
        // `from` endpoint, so the direction is always Out here.
        let info = RelationshipInfo {
            rel_type: rel.rel_type.clone(),
            direction: RelationshipDirection::Out,
            from,
            to,
        };

        let event = match rel.operation {
            RawOperation::Create => {
                let props = rel
                    .after
                    .as_ref()
                    .map(|bag| self.decode_properties(bag, &typename))
                    .unwrap_or_default();
                ChangeEvent::relationship_created(
                    typename,
                    rel.id,
                    rel.element_id.clone(),
                    info,
                    props,
                    timestamp,
                )
            }
            RawOperation::Delete => {
                let props = rel
                    .before
                    .as_ref()
                    .map(|bag| self.decode_properties(bag, &typename))
                    .unwrap_or_default();
                ChangeEvent::relationship_deleted(
                    typename,
                    rel.id,
                    rel.element_id.clone(),
                    info,
                    props,
                    timestamp,
                )
            }
            // Relationship property updates have no event kind in the
            // consumer contract.
            RawOperation::Update => return Ok(None),
        };
        Ok(Some(event))
    }

    fn decode_endpoint(&self, raw: &RawEndpoint) -> Option<EndpointInfo> {
        let typename = self.schema.typename_for_labels(&raw.labels)?;
        let properties = self.decode_properties(&raw.properties, &typename);
        Some(EndpointInfo {
            typename,
            properties,
        })
    }

    fn decode_properties(&self, bag: &Map<String, Value>, typename: &str) -> PropertyMap {
        bag.iter()
            .map(|(field, value)| {
                let declared = self.schema.field_kind(typename, field);
                (
                    field.clone(),
                    ScalarValue::from_wire(value, declared.as_ref()),
                )
            })
            .collect()
    }
}

fn require_state<'a>(
    entry: &ChangeLogEntry,
    state: Option<&'a Map<String, Value>>,
    side: &'static str,
    op: RawOperation,
) -> Result<&'a Map<String, Value>, ParseError> {
    state.ok_or_else(|| ParseError::MissingState {
        id: entry.id.clone(),
        side,
        op,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use graphsub_core::event::EventKind;
    use graphsub_core::scalar::FieldKind;
    use graphsub_core::schema::StaticSchemaModel;

    use super::*;

    fn parser() -> EventParser {
        let schema = StaticSchemaModel::new()
            .with_simple_type(
                "Movie",
                [
                    ("title", FieldKind::String),
                    ("fileSize", FieldKind::BigInt),
                ],
            )
            .with_simple_type("Actor", [("name", FieldKind::String)])
            .with_simple_type("ActedIn", [("role", FieldKind::String)])
            .with_relationship("ACTED_IN", "ActedIn");
        EventParser::new(Arc::new(schema))
    }

    fn entry(event: Value) -> ChangeLogEntry {
        serde_json::from_value(json!({ "id": "A1", "txId": 1, "event": event })).unwrap()
    }

    #[test]
    fn node_create_maps_to_create_event() {
        let entry = entry(json!({
            "elementType": "node",
            "elementId": "4:abc:1",
            "id": 1,
            "labels": ["Movie"],
            "operation": "create",
            "after": { "title": "movie1", "fileSize": 9007199254740993i64 }
        }));
        let event = parser().parse(&entry, Utc::now()).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Create);
        assert_eq!(event.typename, "Movie");
        let new = event.properties.new.as_ref().unwrap();
        assert_eq!(new["title"], ScalarValue::from("movie1"));
        // Declared BigInt, so the number is preserved as a decimal string.
        assert_eq!(
            new["fileSize"],
            ScalarValue::BigInt("9007199254740993".to_string())
        );
    }

    #[test]
    fn node_update_carries_both_states() {
        let entry = entry(json!({
            "elementType": "node",
            "elementId": "4:abc:1",
            "labels": ["Movie"],
            "operation": "update",
            "before": { "title": "old" },
            "after": { "title": "new" }
        }));
        let event = parser().parse(&entry, Utc::now()).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Update);
        assert!(event.properties.old.is_some());
        assert!(event.properties.new.is_some());
    }

    #[test]
    fn node_delete_without_before_is_an_error() {
        let entry = entry(json!({
            "elementType": "node",
            "elementId": "4:abc:1",
            "labels": ["Movie"],
            "operation": "delete"
        }));
        assert!(matches!(
            parser().parse(&entry, Utc::now()),
            Err(ParseError::MissingState { .. })
        ));
    }

    #[test]
    fn undeclared_labels_produce_no_event() {
        let entry = entry(json!({
            "elementType": "node",
            "elementId": "4:abc:1",
            "labels": ["InternalBookkeeping"],
            "operation": "create",
            "after": {}
        }));
        assert!(parser().parse(&entry, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn relationship_create_attaches_endpoints() {
        let entry = entry(json!({
            "elementType": "relationship",
            "elementId": "5:abc:9",
            "id": 9,
            "type": "ACTED_IN",
            "operation": "create",
            "after": { "role": "Neo" },
            "start": {
                "elementId": "4:abc:2",
                "labels": ["Actor"],
                "properties": { "name": "Keanu" }
            },
            "end": {
                "elementId": "4:abc:1",
                "labels": ["Movie"],
                "properties": { "title": "movie1" }
            }
        }));
        let event = parser().parse(&entry, Utc::now()).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::CreateRelationship);
        assert_eq!(event.typename, "ActedIn");
        let rel = event.relationship.as_ref().unwrap();
        assert_eq!(rel.direction, RelationshipDirection::Out);
        assert_eq!(rel.from.typename, "Actor");
        assert_eq!(rel.to.typename, "Movie");
        assert_eq!(
            event.properties.new.as_ref().unwrap()["role"],
            ScalarValue::from("Neo")
        );
    }

    #[test]
    fn undeclared_relationship_type_produces_no_event() {
        let entry = entry(json!({
            "elementType": "relationship",
            "elementId": "5:abc:9",
            "type": "UNMAPPED",
            "operation": "create",
            "start": { "elementId": "4:abc:2", "labels": ["Actor"] },
            "end": { "elementId": "4:abc:1", "labels": ["Movie"] }
        }));
        assert!(parser().parse(&entry, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn relationship_update_produces_no_event() {
        let entry = entry(json!({
            "elementType": "relationship",
            "elementId": "5:abc:9",
            "type": "ACTED_IN",
            "operation": "update",
            "before": { "role": "Neo" },
            "after": { "role": "Thomas" },
            "start": { "elementId": "4:abc:2", "labels": ["Actor"] },
            "end": { "elementId": "4:abc:1", "labels": ["Movie"] }
        }));
        assert!(parser().parse(&entry, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn unknown_element_type_is_unrecognized() {
        let entry = entry(json!({ "elementType": "constraint" }));
        assert!(matches!(
            parser().parse(&entry, Utc::now()),
            Err(ParseError::Unrecognized(_))
        ));
    }
}
