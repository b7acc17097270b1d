//! Declarative filter trees.
//!
//! A filter is a recursively composed boolean expression over the fields of
//! a canonical event, modeled as a tagged union and evaluated by structural
//! recursion (see [`super::eval`]). Trees arrive from the GraphQL layer
//! already parsed; this module only defines the shape and builders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scalar::ScalarValue;

/// Comparison operator on a filter leaf, one per GraphQL filter suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Structural equality (no suffix).
    Eq,
    /// Negated equality (`_NOT`).
    Ne,
    /// Less-than (`_LT`).
    Lt,
    /// Less-than-or-equal (`_LTE`).
    Lte,
    /// Greater-than (`_GT`).
    Gt,
    /// Greater-than-or-equal (`_GTE`).
    Gte,
    /// Set membership (`_IN`).
    In,
    /// Negated set membership (`_NOT_IN`).
    NotIn,
    /// Substring test (`_CONTAINS`).
    Contains,
    /// Negated substring test (`_NOT_CONTAINS`).
    NotContains,
    /// Prefix test (`_STARTS_WITH`).
    StartsWith,
    /// Negated prefix test (`_NOT_STARTS_WITH`).
    NotStartsWith,
    /// Suffix test (`_ENDS_WITH`).
    EndsWith,
    /// Negated suffix test (`_NOT_ENDS_WITH`).
    NotEndsWith,
    /// Array-contains test (`_INCLUDES`).
    Includes,
    /// Negated array-contains test (`_NOT_INCLUDES`).
    NotIncludes,
}

impl FilterOp {
    /// The GraphQL field-name suffix for this operator.
    pub fn suffix(&self) -> &'static str {
        match self {
            FilterOp::Eq => "",
            FilterOp::Ne => "_NOT",
            FilterOp::Lt => "_LT",
            FilterOp::Lte => "_LTE",
            FilterOp::Gt => "_GT",
            FilterOp::Gte => "_GTE",
            FilterOp::In => "_IN",
            FilterOp::NotIn => "_NOT_IN",
            FilterOp::Contains => "_CONTAINS",
            FilterOp::NotContains => "_NOT_CONTAINS",
            FilterOp::StartsWith => "_STARTS_WITH",
            FilterOp::NotStartsWith => "_NOT_STARTS_WITH",
            FilterOp::EndsWith => "_ENDS_WITH",
            FilterOp::NotEndsWith => "_NOT_ENDS_WITH",
            FilterOp::Includes => "_INCLUDES",
            FilterOp::NotIncludes => "_NOT_INCLUDES",
        }
    }

    /// Whether this is one of the relational ordering operators.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte
        )
    }

    /// Whether this is one of the string pattern operators.
    pub fn is_string_pattern(&self) -> bool {
        matches!(
            self,
            FilterOp::Contains
                | FilterOp::NotContains
                | FilterOp::StartsWith
                | FilterOp::NotStartsWith
                | FilterOp::EndsWith
                | FilterOp::NotEndsWith
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.suffix().is_empty() {
            f.write_str("_EQ")
        } else {
            f.write_str(self.suffix())
        }
    }
}

/// Which end of a relationship an endpoint path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSide {
    /// Start node of the relationship.
    From,
    /// End node of the relationship.
    To,
}

/// Whether a relationship path addresses created or deleted relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipLifecycle {
    /// `createdRelationship.*` paths, matching create-relationship events.
    Created,
    /// `deletedRelationship.*` paths, matching delete-relationship events.
    Deleted,
}

/// Path from the canonical event's flattened view to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldPath {
    /// A field of the current property view (`new`, or `old` on deletes).
    Payload(String),
    /// A field of the pre-mutation state (`previousState.<field>`), only
    /// present on update events.
    PreviousState(String),
    /// A relationship property, optionally scoped to one relationship type
    /// (`createdRelationship.<relType>.<field>`).
    Relationship {
        /// Created vs deleted relationship substructure.
        lifecycle: RelationshipLifecycle,
        /// Relationship type the path is scoped to, if any.
        rel_type: Option<String>,
        /// Relationship property name.
        field: String,
    },
    /// A property of one relationship endpoint (`from.<field>` /
    /// `to.<field>`).
    Endpoint {
        /// Which endpoint.
        side: EndpointSide,
        /// Endpoint property name.
        field: String,
    },
}

impl FieldPath {
    /// Bare payload field path.
    pub fn payload(field: impl Into<String>) -> Self {
        FieldPath::Payload(field.into())
    }

    /// `previousState.<field>` path.
    pub fn previous_state(field: impl Into<String>) -> Self {
        FieldPath::PreviousState(field.into())
    }

    /// The terminal field name of this path.
    pub fn field(&self) -> &str {
        match self {
            FieldPath::Payload(f)
            | FieldPath::PreviousState(f)
            | FieldPath::Relationship { field: f, .. }
            | FieldPath::Endpoint { field: f, .. } => f,
        }
    }
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('.').collect();
        match segments.as_slice() {
            [field] if !field.is_empty() => Ok(FieldPath::Payload((*field).to_string())),
            ["previousState", field] => Ok(FieldPath::PreviousState((*field).to_string())),
            ["from", field] => Ok(FieldPath::Endpoint {
                side: EndpointSide::From,
                field: (*field).to_string(),
            }),
            ["to", field] => Ok(FieldPath::Endpoint {
                side: EndpointSide::To,
                field: (*field).to_string(),
            }),
            ["createdRelationship", field] => Ok(FieldPath::Relationship {
                lifecycle: RelationshipLifecycle::Created,
                rel_type: None,
                field: (*field).to_string(),
            }),
            ["deletedRelationship", field] => Ok(FieldPath::Relationship {
                lifecycle: RelationshipLifecycle::Deleted,
                rel_type: None,
                field: (*field).to_string(),
            }),
            ["createdRelationship", rel_type, field] => Ok(FieldPath::Relationship {
                lifecycle: RelationshipLifecycle::Created,
                rel_type: Some((*rel_type).to_string()),
                field: (*field).to_string(),
            }),
            ["deletedRelationship", rel_type, field] => Ok(FieldPath::Relationship {
                lifecycle: RelationshipLifecycle::Deleted,
                rel_type: Some((*rel_type).to_string()),
                field: (*field).to_string(),
            }),
            _ => Err(format!("unrecognized field path '{s}'")),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Payload(field) => f.write_str(field),
            FieldPath::PreviousState(field) => write!(f, "previousState.{field}"),
            FieldPath::Relationship {
                lifecycle,
                rel_type,
                field,
            } => {
                let root = match lifecycle {
                    RelationshipLifecycle::Created => "createdRelationship",
                    RelationshipLifecycle::Deleted => "deletedRelationship",
                };
                match rel_type {
                    Some(rt) => write!(f, "{root}.{rt}.{field}"),
                    None => write!(f, "{root}.{field}"),
                }
            }
            FieldPath::Endpoint { side, field } => {
                let root = match side {
                    EndpointSide::From => "from",
                    EndpointSide::To => "to",
                };
                write!(f, "{root}.{field}")
            }
        }
    }
}

/// Field-comparison leaf of a filter tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterLeaf {
    /// Path to the compared field.
    pub path: FieldPath,
    /// Comparison operator.
    pub op: FilterOp,
    /// Literal to compare against. `In`/`NotIn` expect a list literal.
    pub value: ScalarValue,
}

/// A recursively composed boolean filter expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilterNode {
    /// Field comparison.
    Leaf(FilterLeaf),
    /// All children must hold; an empty list is vacuously true.
    And(Vec<FilterNode>),
    /// At least one child must hold; an empty list is false.
    Or(Vec<FilterNode>),
    /// Negation of the single child.
    Not(Box<FilterNode>),
}

impl FilterNode {
    /// Leaf on a bare payload field.
    pub fn field(name: impl Into<String>, op: FilterOp, value: impl Into<ScalarValue>) -> Self {
        FilterNode::Leaf(FilterLeaf {
            path: FieldPath::payload(name),
            op,
            value: value.into(),
        })
    }

    /// Leaf on an arbitrary path.
    pub fn at(path: FieldPath, op: FilterOp, value: impl Into<ScalarValue>) -> Self {
        FilterNode::Leaf(FilterLeaf {
            path,
            op,
            value: value.into(),
        })
    }

    /// Conjunction of children.
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::And(children)
    }

    /// Disjunction of children.
    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Or(children)
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: FilterNode) -> Self {
        FilterNode::Not(Box::new(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- path parsing --

    #[test]
    fn bare_field_parses_as_payload() {
        let p: FieldPath = "title".parse().unwrap();
        assert_eq!(p, FieldPath::Payload("title".to_string()));
    }

    #[test]
    fn previous_state_path_parses() {
        let p: FieldPath = "previousState.title".parse().unwrap();
        assert_eq!(p, FieldPath::PreviousState("title".to_string()));
    }

    #[test]
    fn scoped_relationship_path_parses() {
        let p: FieldPath = "createdRelationship.ACTED_IN.role".parse().unwrap();
        assert_eq!(
            p,
            FieldPath::Relationship {
                lifecycle: RelationshipLifecycle::Created,
                rel_type: Some("ACTED_IN".to_string()),
                field: "role".to_string(),
            }
        );
    }

    #[test]
    fn endpoint_path_parses() {
        let p: FieldPath = "to.name".parse().unwrap();
        assert_eq!(
            p,
            FieldPath::Endpoint {
                side: EndpointSide::To,
                field: "name".to_string(),
            }
        );
    }

    #[test]
    fn deep_unknown_path_is_rejected() {
        assert!("a.b.c.d".parse::<FieldPath>().is_err());
        assert!("".parse::<FieldPath>().is_err());
    }

    #[test]
    fn path_display_round_trips() {
        for s in [
            "title",
            "previousState.title",
            "createdRelationship.role",
            "deletedRelationship.ACTED_IN.role",
            "from.name",
        ] {
            let p: FieldPath = s.parse().unwrap();
            assert_eq!(p.to_string(), s);
        }
    }

    // -- op metadata --

    #[test]
    fn ordering_ops_are_flagged() {
        assert!(FilterOp::Lt.is_ordering());
        assert!(FilterOp::Gte.is_ordering());
        assert!(!FilterOp::Eq.is_ordering());
        assert!(!FilterOp::In.is_ordering());
    }

    #[test]
    fn op_display_uses_graphql_suffix() {
        assert_eq!(FilterOp::Gt.to_string(), "_GT");
        assert_eq!(FilterOp::NotIncludes.to_string(), "_NOT_INCLUDES");
    }
}
