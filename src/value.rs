//! Property values and exact-typed primary keys.
//!
//! Scalar payloads are `sea_query::Value`s. Relation payloads are shared
//! entity references, so a property bag can hold either.

use crate::entity::EntityRef;
use crate::error::{Error, Result};
use sea_query::Value;
use std::fmt;
use uuid::Uuid;

/// Value held by one property of an entity
#[derive(Clone, Debug)]
pub enum FieldValue {
    /// Explicitly loaded or set to nothing
    Null,
    /// Scalar column value
    Scalar(Value),
    /// To-one relation target
    Entity(EntityRef),
    /// To-many relation members, in load/insertion order
    Collection(Vec<EntityRef>),
}

impl FieldValue {
    /// `Null`, or a scalar holding a typed SQL NULL
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Scalar(v) => value_is_null(v),
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            FieldValue::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[EntityRef]> {
        match self {
            FieldValue::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Members of a to-many value; `Null` reads as empty
    pub fn into_collection(self) -> Vec<EntityRef> {
        match self {
            FieldValue::Collection(items) => items,
            FieldValue::Entity(e) => vec![e],
            _ => Vec::new(),
        }
    }

    /// Scalar text payload, if any
    pub fn as_str(&self) -> Option<String> {
        match self {
            FieldValue::Scalar(Value::String(Some(s))) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Null, FieldValue::Scalar(v)) | (FieldValue::Scalar(v), FieldValue::Null) => {
                value_is_null(v)
            }
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a == b,
            (FieldValue::Entity(a), FieldValue::Entity(b)) => a.ptr_eq(b),
            (FieldValue::Collection(a), FieldValue::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.ptr_eq(y))
            }
            _ => false,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<EntityRef> for FieldValue {
    fn from(entity: EntityRef) -> Self {
        FieldValue::Entity(entity)
    }
}

impl From<Option<EntityRef>> for FieldValue {
    fn from(entity: Option<EntityRef>) -> Self {
        entity.map(FieldValue::Entity).unwrap_or(FieldValue::Null)
    }
}

impl From<Vec<EntityRef>> for FieldValue {
    fn from(items: Vec<EntityRef>) -> Self {
        FieldValue::Collection(items)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Scalar(Value::from(s))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Scalar(Value::from(s))
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Scalar(Value::from(i))
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Scalar(Value::from(i))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Scalar(Value::from(b))
    }
}

/// One component of a primary key.
///
/// Integer widths collapse into `Int`; text and integers never compare equal,
/// so `Int(1)` and `Text("1")` address different entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Bool(bool),
}

impl KeyPart {
    /// Normalize a scalar into a key component; `Ok(None)` for SQL NULL
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        if value_is_null(value) {
            return Ok(None);
        }
        let part = match value {
            Value::Bool(Some(b)) => KeyPart::Bool(*b),
            Value::TinyInt(Some(i)) => KeyPart::Int(i64::from(*i)),
            Value::SmallInt(Some(i)) => KeyPart::Int(i64::from(*i)),
            Value::Int(Some(i)) => KeyPart::Int(i64::from(*i)),
            Value::BigInt(Some(i)) => KeyPart::Int(*i),
            Value::TinyUnsigned(Some(u)) => KeyPart::Int(i64::from(*u)),
            Value::SmallUnsigned(Some(u)) => KeyPart::Int(i64::from(*u)),
            Value::Unsigned(Some(u)) => KeyPart::Int(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => KeyPart::Int(i64::try_from(*u).map_err(|_| {
                Error::Conversion(format!("key component {u} exceeds i64::MAX"))
            })?),
            Value::String(Some(s)) => KeyPart::Text(s.to_string()),
            Value::Char(Some(c)) => KeyPart::Text(c.to_string()),
            Value::Uuid(Some(u)) => KeyPart::Uuid(Uuid::clone(u)),
            other => {
                return Err(Error::Conversion(format!(
                    "unsupported primary key component {other:?}"
                )))
            }
        };
        Ok(Some(part))
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(i) => write!(f, "{i}"),
            KeyPart::Text(s) => write!(f, "'{s}'"),
            KeyPart::Uuid(u) => write!(f, "{u}"),
            KeyPart::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Ordered primary key tuple, following the structure's primary key order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey(Vec<KeyPart>);

impl PrimaryKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Build from scalars in primary key order; `None` if any part is NULL
    pub fn from_values<'a, I>(values: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut parts = Vec::new();
        for value in values {
            match KeyPart::from_value(value)? {
                Some(part) => parts.push(part),
                None => return Ok(None),
            }
        }
        Ok(Some(Self(parts)))
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}

/// True when the scalar carries a typed SQL NULL
pub fn value_is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::Uuid(None)
    )
}

/// Render a `sea_query::Value` as a SQL literal.
///
/// Only used to make logged statements readable; statements sent to the
/// executor always carry positional parameters.
pub fn value_to_sql_string(value: &Value) -> String {
    if value_is_null(value) {
        return "NULL".to_string();
    }
    match value {
        Value::Bool(Some(b)) => b.to_string(),
        Value::TinyInt(Some(i)) => i.to_string(),
        Value::SmallInt(Some(i)) => i.to_string(),
        Value::Int(Some(i)) => i.to_string(),
        Value::BigInt(Some(i)) => i.to_string(),
        Value::TinyUnsigned(Some(u)) => u.to_string(),
        Value::SmallUnsigned(Some(u)) => u.to_string(),
        Value::Unsigned(Some(u)) => u.to_string(),
        Value::BigUnsigned(Some(u)) => u.to_string(),
        Value::Float(Some(f)) => f.to_string(),
        Value::Double(Some(d)) => d.to_string(),
        Value::String(Some(s)) => format!("'{}'", s.replace('\'', "''")),
        Value::Char(Some(c)) => {
            if *c == '\'' {
                "''''".to_string()
            } else {
                format!("'{c}'")
            }
        }
        Value::Bytes(Some(b)) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("'\\x{hex}'")
        }
        Value::Json(Some(j)) => format!("'{}'", j.to_string().replace('\'', "''")),
        Value::Uuid(Some(u)) => format!("'{u}'"),
        other => format!("'{other:?}'"),
    }
}

/// Interpolate positional `$n` parameters for log output
pub fn interpolate(sql: &str, params: &[Value]) -> String {
    let mut out = sql.to_string();
    // Highest index first so `$1` does not clobber `$10`.
    for (i, value) in params.iter().enumerate().rev() {
        out = out.replace(&format!("${}", i + 1), &value_to_sql_string(value));
    }
    out
}
