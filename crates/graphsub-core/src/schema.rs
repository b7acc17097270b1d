//! Schema model collaborator seam.
//!
//! The surrounding GraphQL layer owns the mapping from store labels to
//! logical type names and from fields to declared kinds. The core only
//! consumes that mapping: the event parser resolves labels to a typename,
//! and the filter validator checks operators against declared field kinds.

use std::collections::BTreeMap;

use crate::scalar::FieldKind;

/// Label-set to logical-type resolution plus declared field kinds.
///
/// Implementations must be deterministic: when several logical types share a
/// label set, [`typename_for_labels`](SchemaModel::typename_for_labels) must
/// consistently return the same one (this crate's [`StaticSchemaModel`] picks
/// the first match in declaration order).
pub trait SchemaModel: Send + Sync {
    /// Resolve a store label set to a logical type name.
    ///
    /// Returns `None` when no declared type matches; such entities are not
    /// user-visible and produce no events.
    fn typename_for_labels(&self, labels: &[String]) -> Option<String>;

    /// Declared kind of `field` on `typename`, if the schema knows it.
    fn field_kind(&self, typename: &str, field: &str) -> Option<FieldKind>;

    /// Resolve a relationship type name to its logical name, if declared.
    fn typename_for_relationship(&self, rel_type: &str) -> Option<String> {
        let _ = rel_type;
        None
    }
}

/// One declared type in a [`StaticSchemaModel`].
#[derive(Debug, Clone, Default)]
pub struct TypeDefinition {
    /// Store labels that identify this type.
    pub labels: Vec<String>,
    /// Declared field kinds, keyed by field name.
    pub fields: BTreeMap<String, FieldKind>,
}

/// A fixed, declaration-ordered schema model.
///
/// Suitable for consumers that build their model up front (and for tests).
/// Tie-break rule: the first declared type whose label set is a subset of
/// the entity's labels wins.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaModel {
    types: Vec<(String, TypeDefinition)>,
    relationships: Vec<(String, String)>,
}

impl StaticSchemaModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type. Declaration order is the tie-break order.
    pub fn with_type(mut self, name: impl Into<String>, def: TypeDefinition) -> Self {
        self.types.push((name.into(), def));
        self
    }

    /// Declare a type identified by a single label carrying the same name,
    /// with the given field kinds.
    pub fn with_simple_type(
        self,
        name: &str,
        fields: impl IntoIterator<Item = (&'static str, FieldKind)>,
    ) -> Self {
        let def = TypeDefinition {
            labels: vec![name.to_string()],
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.with_type(name, def)
    }

    /// Declare a relationship type mapping.
    pub fn with_relationship(
        mut self,
        rel_type: impl Into<String>,
        logical: impl Into<String>,
    ) -> Self {
        self.relationships.push((rel_type.into(), logical.into()));
        self
    }
}

impl SchemaModel for StaticSchemaModel {
    fn typename_for_labels(&self, labels: &[String]) -> Option<String> {
        // First declared type whose labels all appear on the entity.
        self.types
            .iter()
            .find(|(_, def)| {
                !def.labels.is_empty() && def.labels.iter().all(|l| labels.contains(l))
            })
            .map(|(name, _)| name.clone())
    }

    fn field_kind(&self, typename: &str, field: &str) -> Option<FieldKind> {
        self.types
            .iter()
            .find(|(name, _)| name == typename)
            .and_then(|(_, def)| def.fields.get(field).cloned())
    }

    fn typename_for_relationship(&self, rel_type: &str) -> Option<String> {
        self.relationships
            .iter()
            .find(|(rt, _)| rt == rel_type)
            .map(|(_, logical)| logical.clone())
    }
}
