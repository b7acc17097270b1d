//! Canonical change events.
//!
//! A [`ChangeEvent`] is the store-agnostic unit exchanged between an engine
//! and all subscriptions. Both sourcing strategies (in-process emitter and
//! change-log poller) produce exactly this shape, so consumers never know
//! which strategy fed them.
//!
//! Invariant: exactly one of `properties.old` / `properties.new` is absent
//! for create/delete events, both are present for updates, and both-absent
//! cannot be constructed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scalar::ScalarValue;

/// Property bag on a node or relationship, keyed by field name.
///
/// A `BTreeMap` keeps iteration (and therefore serialization) order
/// deterministic across deliveries.
pub type PropertyMap = BTreeMap<String, ScalarValue>;

/// Kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A node was created.
    Create,
    /// A node's properties changed.
    Update,
    /// A node was deleted.
    Delete,
    /// A relationship was created.
    CreateRelationship,
    /// A relationship was deleted.
    DeleteRelationship,
}

impl EventKind {
    /// All event kinds, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Create,
        EventKind::Update,
        EventKind::Delete,
        EventKind::CreateRelationship,
        EventKind::DeleteRelationship,
    ];

    /// String form used in subscription registration and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::CreateRelationship => "create_relationship",
            EventKind::DeleteRelationship => "delete_relationship",
        }
    }

    /// Whether this kind describes a relationship mutation.
    pub fn is_relationship(&self) -> bool {
        matches!(
            self,
            EventKind::CreateRelationship | EventKind::DeleteRelationship
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventKind::Create),
            "update" => Ok(EventKind::Update),
            "delete" => Ok(EventKind::Delete),
            "create_relationship" => Ok(EventKind::CreateRelationship),
            "delete_relationship" => Ok(EventKind::DeleteRelationship),
            other => Err(format!("unknown event kind '{other}'")),
        }
    }
}

/// Direction of a relationship relative to its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationshipDirection {
    /// Outgoing from the `from` endpoint.
    Out,
    /// Incoming to the `from` endpoint.
    In,
}

/// One endpoint of a relationship event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointInfo {
    /// Logical type of the endpoint node.
    pub typename: String,
    /// Endpoint node properties at event time.
    pub properties: PropertyMap,
}

/// Relationship metadata attached to relationship events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipInfo {
    /// Relationship type name.
    pub rel_type: String,
    /// Direction of the relationship.
    ///
    /// Change-log entries carry start/end endpoints already normalized to
    /// the stored direction, so events built from them are always [`Out`]
    /// (`from` = start node). [`In`] exists for producers that view the
    /// relationship from the end node's side.
    ///
    /// [`Out`]: RelationshipDirection::Out
    /// [`In`]: RelationshipDirection::In
    pub direction: RelationshipDirection,
    /// Start endpoint.
    pub from: EndpointInfo,
    /// End endpoint.
    pub to: EndpointInfo,
}

/// Before/after property state of the affected entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventProperties {
    /// State before the mutation; absent on create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<PropertyMap>,
    /// State after the mutation; absent on delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<PropertyMap>,
}

/// The canonical, typed representation of one mutation.
///
/// Events are shared between all matching subscriptions as `Arc<ChangeEvent>`
/// and must never be mutated after they leave the parser or emitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Mutation kind.
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Logical entity type, resolved from store labels.
    pub typename: String,
    /// Store-native numeric identity of the affected entity.
    pub id: i64,
    /// Store-native element id of the affected entity.
    pub element_id: String,
    /// Event time; non-decreasing within one engine instance.
    pub timestamp: DateTime<Utc>,
    /// Before/after property state.
    pub properties: EventProperties,
    /// Relationship metadata, present only on relationship events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipInfo>,
}

impl ChangeEvent {
    /// A node-create event. `new` is the created node's properties.
    pub fn created(
        typename: impl Into<String>,
        id: i64,
        element_id: impl Into<String>,
        new: PropertyMap,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::Create,
            typename: typename.into(),
            id,
            element_id: element_id.into(),
            timestamp,
            properties: EventProperties {
                old: None,
                new: Some(new),
            },
            relationship: None,
        }
    }

    /// A node-update event carrying both before and after state.
    pub fn updated(
        typename: impl Into<String>,
        id: i64,
        element_id: impl Into<String>,
        old: PropertyMap,
        new: PropertyMap,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::Update,
            typename: typename.into(),
            id,
            element_id: element_id.into(),
            timestamp,
            properties: EventProperties {
                old: Some(old),
                new: Some(new),
            },
            relationship: None,
        }
    }

    /// A node-delete event. `old` is the deleted node's last properties.
    pub fn deleted(
        typename: impl Into<String>,
        id: i64,
        element_id: impl Into<String>,
        old: PropertyMap,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::Delete,
            typename: typename.into(),
            id,
            element_id: element_id.into(),
            timestamp,
            properties: EventProperties {
                old: Some(old),
                new: None,
            },
            relationship: None,
        }
    }

    /// A relationship-create event. Relationship properties land in `new`.
    pub fn relationship_created(
        typename: impl Into<String>,
        id: i64,
        element_id: impl Into<String>,
        relationship: RelationshipInfo,
        properties: PropertyMap,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::CreateRelationship,
            typename: typename.into(),
            id,
            element_id: element_id.into(),
            timestamp,
            properties: EventProperties {
                old: None,
                new: Some(properties),
            },
            relationship: Some(relationship),
        }
    }

    /// A relationship-delete event. Relationship properties land in `old`.
    pub fn relationship_deleted(
        typename: impl Into<String>,
        id: i64,
        element_id: impl Into<String>,
        relationship: RelationshipInfo,
        properties: PropertyMap,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::DeleteRelationship,
            typename: typename.into(),
            id,
            element_id: element_id.into(),
            timestamp,
            properties: EventProperties {
                old: Some(properties),
                new: None,
            },
            relationship: Some(relationship),
        }
    }

    /// The current property view: `new` where present, otherwise `old`.
    ///
    /// This is the bag bare filter paths resolve against (the last known
    /// state of the entity for deletes).
    pub fn payload(&self) -> Option<&PropertyMap> {
        self.properties.new.as_ref().or(self.properties.old.as_ref())
    }

    /// The pre-mutation state, only meaningful on update events.
    pub fn previous_state(&self) -> Option<&PropertyMap> {
        match self.kind {
            EventKind::Update => self.properties.old.as_ref(),
            _ => None,
        }
    }
}

/// Monotonic event clock for a single engine instance.
///
/// Wall clocks can step backwards; event timestamps within one engine must
/// not. Each call returns `max(now, previous)`.
#[derive(Debug, Default)]
pub struct EventClock {
    last: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl EventClock {
    /// Create a clock with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current event time, clamped to be non-decreasing.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now < prev {
                now = prev;
            }
        }
        *last = Some(now);
        now
    }
}
