//! Typed cell values.
//!
//! [`Value`] is the cell type of every row this crate produces and the operand type
//! of every predicate leaf. Each variant carries an `Option` so a SQL `NULL` keeps
//! its [`ValueKind`], mirroring how `sea_query::Value` models nulls.
//!
//! Values implement structural `Eq`/`Hash` (doubles compare by bit pattern) so whole
//! rows can be deduplicated by full-cell equality.
//!
//! ## Traits
//!
//! - **`ValueType`** - Maps Rust types to a [`ValueKind`] and converts to/from [`Value`]

pub mod types;

pub use types::ValueType;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Semantic type of a field or cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    BigInt,
    Double,
    String,
    Uuid,
    Date,
    Timestamp,
}

impl ValueKind {
    /// Integer kinds compare with each other; everything else only with itself.
    pub fn is_comparable_with(self, other: ValueKind) -> bool {
        self == other || (self.is_integer() && other.is_integer())
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::BigInt)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "BOOLEAN",
            ValueKind::Int => "INTEGER",
            ValueKind::BigInt => "BIGINT",
            ValueKind::Double => "DOUBLE PRECISION",
            ValueKind::String => "TEXT",
            ValueKind::Uuid => "UUID",
            ValueKind::Date => "DATE",
            ValueKind::Timestamp => "TIMESTAMP",
        };
        f.write_str(name)
    }
}

/// A typed, possibly-null cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Bool(Option<bool>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Double(Option<f64>),
    String(Option<String>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
}

impl Value {
    /// The null cell of the given kind.
    pub fn null(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Value::Bool(None),
            ValueKind::Int => Value::Int(None),
            ValueKind::BigInt => Value::BigInt(None),
            ValueKind::Double => Value::Double(None),
            ValueKind::String => Value::String(None),
            ValueKind::Uuid => Value::Uuid(None),
            ValueKind::Date => Value::Date(None),
            ValueKind::Timestamp => Value::Timestamp(None),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::BigInt(_) => ValueKind::BigInt,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Date(_) => ValueKind::Date,
            Value::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Bool(v) => v.is_none(),
            Value::Int(v) => v.is_none(),
            Value::BigInt(v) => v.is_none(),
            Value::Double(v) => v.is_none(),
            Value::String(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(Some(v)) => Some(i64::from(*v)),
            Value::BigInt(Some(v)) => Some(*v),
            _ => None,
        }
    }

    /// SQL comparison: `None` when either side is null or the kinds are incomparable.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(Some(a)), Value::Bool(Some(b))) => Some(a.cmp(b)),
            // As in PostgreSQL: -0.0 equals 0.0; NaN equals itself and sorts above every number.
            (Value::Double(Some(a)), Value::Double(Some(b))) => Some(if a == b {
                Ordering::Equal
            } else {
                a.total_cmp(b)
            }),
            (Value::String(Some(a)), Value::String(Some(b))) => Some(a.cmp(b)),
            (Value::Uuid(Some(a)), Value::Uuid(Some(b))) => Some(a.cmp(b)),
            (Value::Date(Some(a)), Value::Date(Some(b))) => Some(a.cmp(b)),
            (Value::Timestamp(Some(a)), Value::Timestamp(Some(b))) => Some(a.cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => None,
            },
        }
    }

    /// Ascending sort order with nulls after every non-null value, as `PostgreSQL`
    /// sorts `ASC` (and, reversed, `DESC NULLS FIRST`).
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.sql_cmp(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Convert into the sea-query value used for SQL parameter binding.
    pub fn to_sea_value(&self) -> sea_query::Value {
        match self {
            Value::Bool(v) => (*v).into(),
            Value::Int(v) => (*v).into(),
            Value::BigInt(v) => (*v).into(),
            Value::Double(v) => (*v).into(),
            Value::String(v) => v.clone().into(),
            Value::Uuid(v) => (*v).into(),
            Value::Date(v) => (*v).into(),
            Value::Timestamp(v) => (*v).into(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.map(f64::to_bits) == b.map(f64::to_bits),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::BigInt(v) => v.hash(state),
            Value::Double(v) => v.map(f64::to_bits).hash(state),
            Value::String(v) => v.hash(state),
            Value::Uuid(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("NULL");
        }
        match self {
            Value::Bool(Some(v)) => write!(f, "{v}"),
            Value::Int(Some(v)) => write!(f, "{v}"),
            Value::BigInt(Some(v)) => write!(f, "{v}"),
            Value::Double(Some(v)) => write!(f, "{v}"),
            Value::String(Some(v)) => write!(f, "'{v}'"),
            Value::Uuid(Some(v)) => write!(f, "{v}"),
            Value::Date(Some(v)) => write!(f, "{v}"),
            Value::Timestamp(Some(v)) => write!(f, "{v}"),
            _ => f.write_str("NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Some(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_null_keeps_kind() {
        let v = Value::null(ValueKind::Date);
        assert!(v.is_null());
        assert_eq!(v.kind(), ValueKind::Date);
        assert_ne!(v, Value::null(ValueKind::String));
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let mut set = HashSet::new();
        assert!(set.insert(Value::Double(Some(1.5))));
        assert!(!set.insert(Value::Double(Some(1.5))));
        // Same number, different kind: structurally different cells.
        assert!(set.insert(Value::Int(Some(1))));
        assert!(set.insert(Value::BigInt(Some(1))));
        assert!(set.insert(Value::Double(Some(f64::NAN))));
        assert!(!set.insert(Value::Double(Some(f64::NAN))));
    }

    #[test]
    fn test_sql_cmp_nulls_and_kinds() {
        assert_eq!(
            Value::Int(Some(3)).sql_cmp(&Value::BigInt(Some(10))),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(None).sql_cmp(&Value::Int(Some(1))), None);
        assert_eq!(Value::from("a").sql_cmp(&Value::Int(Some(1))), None);
    }

    #[test]
    fn test_sql_cmp_doubles() {
        let zero = Value::Double(Some(0.0));
        let negative_zero = Value::Double(Some(-0.0));
        let nan = Value::Double(Some(f64::NAN));
        assert_eq!(zero.sql_cmp(&negative_zero), Some(Ordering::Equal));
        assert_eq!(nan.sql_cmp(&nan), Some(Ordering::Equal));
        assert_eq!(nan.sql_cmp(&Value::Double(Some(f64::INFINITY))), Some(Ordering::Greater));
        assert_eq!(
            Value::Double(Some(1.5)).sql_cmp(&zero),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_sort_cmp_places_nulls_last() {
        let mut values = vec![
            Value::String(None),
            Value::from("b"),
            Value::from("a"),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![Value::from("a"), Value::from("b"), Value::String(None)]
        );
    }

    #[test]
    fn test_to_sea_value() {
        assert_eq!(
            Value::BigInt(Some(7)).to_sea_value(),
            sea_query::Value::BigInt(Some(7))
        );
        assert_eq!(
            Value::String(None).to_sea_value(),
            sea_query::Value::String(None)
        );
    }

    #[test]
    fn test_value_serde_round_trip() {
        let value = Value::Uuid(Some(Uuid::nil()));
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
