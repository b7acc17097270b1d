//! Scalar values carried on canonical change events.
//!
//! Property values are normalized into [`ScalarValue`] as soon as they leave
//! the store-facing parser, so filter evaluation and transport serialization
//! never see raw wire values. BigInt values are carried as decimal strings
//! end-to-end: the surrounding GraphQL layer represents them as strings to
//! avoid precision loss, and we only materialize a `num_bigint::BigInt` at
//! comparison time.

use std::fmt;

use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A single property value on a canonical event.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Explicit null (property present but null-valued).
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string. Temporal values pass through in their string form.
    String(String),
    /// Identifier. Accepts integer literals on input; always compared as a
    /// string.
    Id(String),
    /// Arbitrary-precision integer carried as a decimal string.
    BigInt(String),
    /// Homogeneous list of scalars.
    List(Vec<ScalarValue>),
}

/// Discriminant of a [`ScalarValue`], used in filter type checking and error
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Null value.
    Null,
    /// Boolean value.
    Bool,
    /// Integer value.
    Int,
    /// Float value.
    Float,
    /// String value.
    String,
    /// ID value.
    Id,
    /// BigInt value.
    BigInt,
    /// List value.
    List,
}

/// Declared kind of a field in the schema model.
///
/// The parser uses this to steer wire decoding (a JSON number on a field
/// declared `BigInt` becomes a decimal string, one declared `ID` becomes an
/// identifier) and the filter validator uses it to reject operators that are
/// incompatible with a field before any event arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// String field.
    String,
    /// ID field.
    Id,
    /// Int field.
    Int,
    /// Float field.
    Float,
    /// Boolean field.
    Boolean,
    /// BigInt field (string-encoded).
    BigInt,
    /// List of the inner kind.
    List(Box<FieldKind>),
}

impl FieldKind {
    /// Whether this is a list-typed field.
    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::List(_))
    }

    /// The element kind for lists, or the kind itself for scalars.
    pub fn element(&self) -> &FieldKind {
        match self {
            FieldKind::List(inner) => inner,
            other => other,
        }
    }
}

impl ScalarValue {
    /// Runtime kind of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::Null => ScalarKind::Null,
            ScalarValue::Bool(_) => ScalarKind::Bool,
            ScalarValue::Int(_) => ScalarKind::Int,
            ScalarValue::Float(_) => ScalarKind::Float,
            ScalarValue::String(_) => ScalarKind::String,
            ScalarValue::Id(_) => ScalarKind::Id,
            ScalarValue::BigInt(_) => ScalarKind::BigInt,
            ScalarValue::List(_) => ScalarKind::List,
        }
    }

    /// Whether this value is a list.
    pub fn is_list(&self) -> bool {
        matches!(self, ScalarValue::List(_))
    }

    /// Decode a raw JSON wire value, steered by the field's declared kind
    /// when the schema model knows it.
    ///
    /// Without a declared kind the JSON shape decides: integral numbers
    /// become `Int`, fractional numbers `Float`, strings `String`. Integers
    /// that do not fit `i64` are preserved as `BigInt` decimal strings
    /// rather than rounded through `f64`.
    pub fn from_wire(value: &serde_json::Value, declared: Option<&FieldKind>) -> ScalarValue {
        match value {
            serde_json::Value::Null => ScalarValue::Null,
            serde_json::Value::Bool(b) => ScalarValue::Bool(*b),
            serde_json::Value::Number(n) => match declared.map(FieldKind::element) {
                Some(FieldKind::BigInt) => ScalarValue::BigInt(n.to_string()),
                Some(FieldKind::Id) => ScalarValue::Id(n.to_string()),
                Some(FieldKind::Float) => {
                    ScalarValue::Float(n.as_f64().unwrap_or_default())
                }
                _ => {
                    if let Some(i) = n.as_i64() {
                        ScalarValue::Int(i)
                    } else if n.as_u64().is_some() {
                        ScalarValue::BigInt(n.to_string())
                    } else {
                        ScalarValue::Float(n.as_f64().unwrap_or_default())
                    }
                }
            },
            serde_json::Value::String(s) => match declared.map(FieldKind::element) {
                Some(FieldKind::Id) => ScalarValue::Id(s.clone()),
                Some(FieldKind::BigInt) => ScalarValue::BigInt(s.clone()),
                _ => ScalarValue::String(s.clone()),
            },
            serde_json::Value::Array(items) => {
                let element = declared.and_then(|k| match k {
                    FieldKind::List(inner) => Some(inner.as_ref()),
                    _ => None,
                });
                ScalarValue::List(
                    items
                        .iter()
                        .map(|item| ScalarValue::from_wire(item, element))
                        .collect(),
                )
            }
            // Nested objects have no scalar representation; flatten to their
            // JSON string form so they at least survive equality checks.
            serde_json::Value::Object(_) => ScalarValue::String(value.to_string()),
        }
    }

    /// Convert back into the JSON shape delivered to transports.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ScalarValue::Null => serde_json::Value::Null,
            ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
            ScalarValue::Int(i) => serde_json::Value::from(*i),
            ScalarValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ScalarValue::String(s) => serde_json::Value::String(s.clone()),
            ScalarValue::Id(s) => serde_json::Value::String(s.clone()),
            // BigInt stays a string on the wire.
            ScalarValue::BigInt(s) => serde_json::Value::String(s.clone()),
            ScalarValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ScalarValue::to_json).collect())
            }
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
            ScalarValue::Int(i) => serializer.serialize_i64(*i),
            ScalarValue::Float(f) => serializer.serialize_f64(*f),
            ScalarValue::String(s) | ScalarValue::Id(s) | ScalarValue::BigInt(s) => {
                serializer.serialize_str(s)
            }
            ScalarValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::String(s) | ScalarValue::Id(s) | ScalarValue::BigInt(s) => {
                write!(f, "{s}")
            }
            ScalarValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Null => "Null",
            ScalarKind::Bool => "Boolean",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::String => "String",
            ScalarKind::Id => "ID",
            ScalarKind::BigInt => "BigInt",
            ScalarKind::List => "List",
        };
        write!(f, "{name}")
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self {
        ScalarValue::Int(i)
    }
}

impl From<f64> for ScalarValue {
    fn from(f: f64) -> Self {
        ScalarValue::Float(f)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- wire decoding --

    #[test]
    fn wire_number_without_declaration_is_int() {
        let v = ScalarValue::from_wire(&json!(42), None);
        assert_eq!(v, ScalarValue::Int(42));
    }

    #[test]
    fn wire_number_on_bigint_field_keeps_decimal_string() {
        let v = ScalarValue::from_wire(&json!(42), Some(&FieldKind::BigInt));
        assert_eq!(v, ScalarValue::BigInt("42".to_string()));
    }

    #[test]
    fn wire_string_on_bigint_field_passes_through() {
        let v = ScalarValue::from_wire(&json!("9223372036854775807"), Some(&FieldKind::BigInt));
        assert_eq!(v, ScalarValue::BigInt("9223372036854775807".to_string()));
    }

    #[test]
    fn wire_u64_overflow_becomes_bigint() {
        let v = ScalarValue::from_wire(&json!(u64::MAX), None);
        assert_eq!(v, ScalarValue::BigInt(u64::MAX.to_string()));
    }

    #[test]
    fn wire_fraction_is_float() {
        let v = ScalarValue::from_wire(&json!(1.5), None);
        assert_eq!(v, ScalarValue::Float(1.5));
    }

    #[test]
    fn wire_integer_on_id_field_normalizes_to_string() {
        let v = ScalarValue::from_wire(&json!(7), Some(&FieldKind::Id));
        assert_eq!(v, ScalarValue::Id("7".to_string()));
    }

    #[test]
    fn wire_array_decodes_elements_with_declared_kind() {
        let declared = FieldKind::List(Box::new(FieldKind::Id));
        let v = ScalarValue::from_wire(&json!([1, "two"]), Some(&declared));
        assert_eq!(
            v,
            ScalarValue::List(vec![
                ScalarValue::Id("1".to_string()),
                ScalarValue::Id("two".to_string()),
            ])
        );
    }

    // -- JSON round-trip shape --

    #[test]
    fn bigint_serializes_as_string() {
        let v = ScalarValue::BigInt("123456789012345678901".to_string());
        assert_eq!(v.to_json(), json!("123456789012345678901"));
    }

    #[test]
    fn list_serializes_as_array() {
        let v = ScalarValue::List(vec![ScalarValue::Int(1), ScalarValue::Int(2)]);
        assert_eq!(v.to_json(), json!([1, 2]));
    }
}
