//! ValueType trait for type-safe value conversions
//!
//! The `ValueType` trait maps Rust types to their [`ValueKind`] and converts between
//! them and [`Value`]. Attribute descriptors carry a `ValueType` parameter, which is
//! how the declared type of an attribute is checked against the store's field type.
//!
//! ## Usage
//!
//! ```rust
//! use querygroup::{Value, ValueKind, ValueType};
//!
//! let value = ValueType::into_value(42i64);
//! assert_eq!(value, Value::BigInt(Some(42)));
//! assert_eq!(<Option<i64> as ValueType>::KIND, ValueKind::BigInt);
//!
//! let value = ValueType::into_value(None::<String>);
//! assert!(value.is_null());
//! ```
//!
//! Implemented for `bool`, `i32`, `i64`, `f64`, `String`, `Uuid`, `NaiveDate`,
//! `NaiveDateTime` and `Option<T>` of each.

use super::{Value, ValueKind};
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// Trait for mapping Rust types to their corresponding [`Value`] variant.
pub trait ValueType: Sized + Send + Sync + 'static {
    /// Kind of the cells this type converts to and from
    const KIND: ValueKind;

    /// Whether `NULL` is a representable value of this type
    const NULLABLE: bool = false;

    /// Convert this value into a [`Value`].
    fn into_value(self) -> Value;

    /// Convert a [`Value`] into this type, if possible.
    ///
    /// Returns `None` if the value has another kind or is null for a
    /// non-nullable type.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_value_type {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl ValueType for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn into_value(self) -> Value {
                Value::$variant(Some(self))
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(Some(v)) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_value_type!(bool, Bool, Bool);
impl_value_type!(i32, Int, Int);
impl_value_type!(f64, Double, Double);
impl_value_type!(String, String, String);
impl_value_type!(Uuid, Uuid, Uuid);
impl_value_type!(NaiveDate, Date, Date);
impl_value_type!(NaiveDateTime, Timestamp, Timestamp);

impl ValueType for i64 {
    const KIND: ValueKind = ValueKind::BigInt;

    fn into_value(self) -> Value {
        Value::BigInt(Some(self))
    }

    // INTEGER cells widen losslessly.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::BigInt(Some(v)) => Some(*v),
            Value::Int(Some(v)) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl<T: ValueType> ValueType for Option<T> {
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::null(T::KIND),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return Some(None);
        }
        T::from_value(value).map(Some)
    }
}
