//! Filter evaluation against canonical events.
//!
//! Evaluation is a pure structural recursion over the tree. A leaf that
//! references an absent field or substructure is a non-match, never an
//! error; applying an operator to a type-incompatible field is a
//! [`FilterTypeError`], never a silent `false`. That error is the only
//! subscriber-visible failure class in the core.
//!
//! BigInt fields are carried as decimal strings and compared through
//! `num_bigint::BigInt`, so values beyond the `f64`-safe range order
//! correctly.

use std::cmp::Ordering;

use num_bigint::BigInt;

use super::tree::{
    EndpointSide,
    FieldPath,
    FilterLeaf,
    FilterNode,
    FilterOp,
    RelationshipLifecycle,
};
use crate::event::{ChangeEvent, EventKind};
use crate::scalar::{FieldKind, ScalarKind, ScalarValue};
use crate::schema::SchemaModel;

/// An operator applied to a field of an incompatible scalar kind.
///
/// Surfaced to the one subscription whose filter contains the offending
/// leaf; never crashes the engine and never affects other subscribers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operator {op} cannot be applied to {kind}-typed field '{field}'")]
pub struct FilterTypeError {
    /// Path of the offending field.
    pub field: String,
    /// The incompatible operator.
    pub op: FilterOp,
    /// The field's scalar kind.
    pub kind: ScalarKind,
}

/// Evaluate a filter tree against one event.
///
/// `And` short-circuits at the first false child and `Or` at the first true
/// one; a type error in a branch that short-circuiting skips is not raised.
pub fn evaluate(node: &FilterNode, event: &ChangeEvent) -> Result<bool, FilterTypeError> {
    match node {
        FilterNode::And(children) => {
            for child in children {
                if !evaluate(child, event)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        FilterNode::Or(children) => {
            for child in children {
                if evaluate(child, event)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        FilterNode::Not(child) => Ok(!evaluate(child, event)?),
        FilterNode::Leaf(leaf) => evaluate_leaf(leaf, event),
    }
}

/// Check a filter tree against declared field kinds before any event flows.
///
/// Catches operator/kind mismatches on fields the schema knows even when
/// the field is absent on a particular event (where runtime evaluation
/// could only report a non-match). Fields unknown to the schema are left to
/// runtime checking.
pub fn validate(
    node: &FilterNode,
    typename: &str,
    schema: &dyn SchemaModel,
) -> Result<(), FilterTypeError> {
    match node {
        FilterNode::And(children) | FilterNode::Or(children) => {
            children.iter().try_for_each(|c| validate(c, typename, schema))
        }
        FilterNode::Not(child) => validate(child, typename, schema),
        FilterNode::Leaf(leaf) => {
            let declared = match &leaf.path {
                FieldPath::Payload(field) | FieldPath::PreviousState(field) => {
                    schema.field_kind(typename, field)
                }
                FieldPath::Relationship {
                    rel_type: Some(rel_type),
                    field,
                    ..
                } => schema
                    .typename_for_relationship(rel_type)
                    .and_then(|logical| schema.field_kind(&logical, field)),
                // Endpoint types are not named by the path; runtime checks
                // cover them.
                _ => None,
            };
            if let Some(kind) = declared {
                check_operator(leaf.op, declared_kind(&kind)).map_err(|kind| FilterTypeError {
                    field: leaf.path.to_string(),
                    op: leaf.op,
                    kind,
                })?;
            }
            Ok(())
        }
    }
}

fn evaluate_leaf(leaf: &FilterLeaf, event: &ChangeEvent) -> Result<bool, FilterTypeError> {
    let Some(value) = resolve_path(event, &leaf.path) else {
        return Ok(false);
    };

    // A present-but-null value can only satisfy (in)equality.
    if matches!(value, ScalarValue::Null) {
        return Ok(match leaf.op {
            FilterOp::Eq => scalar_eq(value, &leaf.value),
            FilterOp::Ne => !scalar_eq(value, &leaf.value),
            _ => false,
        });
    }

    check_operator(leaf.op, value.kind()).map_err(|kind| FilterTypeError {
        field: leaf.path.to_string(),
        op: leaf.op,
        kind,
    })?;

    Ok(match leaf.op {
        FilterOp::Eq => scalar_eq(value, &leaf.value),
        FilterOp::Ne => !scalar_eq(value, &leaf.value),
        FilterOp::Lt => matches_order(value, &leaf.value, Ordering::is_lt),
        FilterOp::Lte => matches_order(value, &leaf.value, Ordering::is_le),
        FilterOp::Gt => matches_order(value, &leaf.value, Ordering::is_gt),
        FilterOp::Gte => matches_order(value, &leaf.value, Ordering::is_ge),
        FilterOp::In => in_set(value, &leaf.value),
        FilterOp::NotIn => !in_set(value, &leaf.value),
        FilterOp::Contains => string_test(value, &leaf.value, |f, l| f.contains(l)),
        FilterOp::NotContains => !string_test(value, &leaf.value, |f, l| f.contains(l)),
        FilterOp::StartsWith => string_test(value, &leaf.value, |f, l| f.starts_with(l)),
        FilterOp::NotStartsWith => !string_test(value, &leaf.value, |f, l| f.starts_with(l)),
        FilterOp::EndsWith => string_test(value, &leaf.value, |f, l| f.ends_with(l)),
        FilterOp::NotEndsWith => !string_test(value, &leaf.value, |f, l| f.ends_with(l)),
        FilterOp::Includes => includes(value, &leaf.value),
        FilterOp::NotIncludes => !includes(value, &leaf.value),
    })
}

/// Resolve a path against the event's flattened view.
///
/// `None` means the substructure or field is absent on this event kind
/// (e.g. `previousState` on a create), which the caller turns into a
/// non-match.
fn resolve_path<'a>(event: &'a ChangeEvent, path: &FieldPath) -> Option<&'a ScalarValue> {
    match path {
        FieldPath::Payload(field) => event.payload()?.get(field),
        FieldPath::PreviousState(field) => event.previous_state()?.get(field),
        FieldPath::Relationship {
            lifecycle,
            rel_type,
            field,
        } => {
            let expected = match lifecycle {
                RelationshipLifecycle::Created => EventKind::CreateRelationship,
                RelationshipLifecycle::Deleted => EventKind::DeleteRelationship,
            };
            if event.kind != expected {
                return None;
            }
            let rel = event.relationship.as_ref()?;
            if let Some(scoped) = rel_type {
                if rel.rel_type != *scoped {
                    return None;
                }
            }
            event.payload()?.get(field)
        }
        FieldPath::Endpoint { side, field } => {
            let rel = event.relationship.as_ref()?;
            let endpoint = match side {
                EndpointSide::From => &rel.from,
                EndpointSide::To => &rel.to,
            };
            endpoint.properties.get(field)
        }
    }
}

/// Operator/kind compatibility table. `Err` carries the offending kind.
fn check_operator(op: FilterOp, kind: ScalarKind) -> Result<(), ScalarKind> {
    let compatible = match op {
        FilterOp::Eq | FilterOp::Ne => true,
        FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
            matches!(kind, ScalarKind::Int | ScalarKind::Float | ScalarKind::BigInt)
        }
        FilterOp::In | FilterOp::NotIn => matches!(
            kind,
            ScalarKind::String
                | ScalarKind::Id
                | ScalarKind::Int
                | ScalarKind::Float
                | ScalarKind::BigInt
        ),
        op if op.is_string_pattern() => matches!(kind, ScalarKind::String | ScalarKind::Id),
        // Includes / NotIncludes
        _ => matches!(kind, ScalarKind::List),
    };
    if compatible {
        Ok(())
    } else {
        Err(kind)
    }
}

fn declared_kind(kind: &FieldKind) -> ScalarKind {
    match kind {
        FieldKind::String => ScalarKind::String,
        FieldKind::Id => ScalarKind::Id,
        FieldKind::Int => ScalarKind::Int,
        FieldKind::Float => ScalarKind::Float,
        FieldKind::Boolean => ScalarKind::Bool,
        FieldKind::BigInt => ScalarKind::BigInt,
        FieldKind::List(_) => ScalarKind::List,
    }
}

/// Structural equality with ID and BigInt normalization.
fn scalar_eq(a: &ScalarValue, b: &ScalarValue) -> bool {
    match (a, b) {
        (ScalarValue::Null, ScalarValue::Null) => true,
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => x == y,
        (ScalarValue::Int(x), ScalarValue::Int(y)) => x == y,
        (ScalarValue::Float(x), ScalarValue::Float(y)) => x == y,
        (ScalarValue::Int(x), ScalarValue::Float(y))
        | (ScalarValue::Float(y), ScalarValue::Int(x)) => (*x as f64) == *y,
        (ScalarValue::String(x), ScalarValue::String(y)) => x == y,
        (ScalarValue::List(xs), ScalarValue::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| scalar_eq(x, y))
        }
        // IDs accept string and integer literal forms.
        (ScalarValue::Id(_), _) | (_, ScalarValue::Id(_)) => {
            match (string_form(a), string_form(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        // BigInt equality is numeric, not lexical ("07" == "7").
        (ScalarValue::BigInt(_), _) | (_, ScalarValue::BigInt(_)) => {
            match (parse_bigint(a), parse_bigint(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => false,
    }
}

fn matches_order(field: &ScalarValue, literal: &ScalarValue, test: fn(Ordering) -> bool) -> bool {
    compare_order(field, literal).map(test).unwrap_or(false)
}

/// Numeric ordering with promotion: BigInt comparisons are arbitrary
/// precision unless a float is involved, in which case both sides drop to
/// `f64`.
fn compare_order(field: &ScalarValue, literal: &ScalarValue) -> Option<Ordering> {
    match (field, literal) {
        (ScalarValue::Int(x), ScalarValue::Int(y)) => Some(x.cmp(y)),
        (ScalarValue::BigInt(_), ScalarValue::Float(_))
        | (ScalarValue::Float(_), ScalarValue::BigInt(_)) => {
            as_f64(field)?.partial_cmp(&as_f64(literal)?)
        }
        (ScalarValue::BigInt(_), _) | (_, ScalarValue::BigInt(_)) => {
            Some(parse_bigint(field)?.cmp(&parse_bigint(literal)?))
        }
        _ => as_f64(field)?.partial_cmp(&as_f64(literal)?),
    }
}

fn in_set(field: &ScalarValue, literal: &ScalarValue) -> bool {
    match literal {
        ScalarValue::List(items) => items.iter().any(|item| scalar_eq(field, item)),
        single => scalar_eq(field, single),
    }
}

fn string_test(field: &ScalarValue, literal: &ScalarValue, test: fn(&str, &str) -> bool) -> bool {
    match (string_form(field), string_form(literal)) {
        (Some(f), Some(l)) => test(&f, &l),
        _ => false,
    }
}

fn includes(field: &ScalarValue, literal: &ScalarValue) -> bool {
    match field {
        ScalarValue::List(items) => items.iter().any(|item| scalar_eq(item, literal)),
        _ => false,
    }
}

fn string_form(value: &ScalarValue) -> Option<String> {
    match value {
        ScalarValue::String(s) | ScalarValue::Id(s) | ScalarValue::BigInt(s) => Some(s.clone()),
        ScalarValue::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn as_f64(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Int(i) => Some(*i as f64),
        ScalarValue::Float(f) => Some(*f),
        ScalarValue::BigInt(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_bigint(value: &ScalarValue) -> Option<BigInt> {
    match value {
        ScalarValue::Int(i) => Some(BigInt::from(*i)),
        ScalarValue::BigInt(s) | ScalarValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
