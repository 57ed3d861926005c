//! Typed attribute descriptors and attribute paths.
//!
//! [`Attribute<E, V>`] names a field of entity `E` holding values of type `V`;
//! [`Relation<E, J>`] names a traversal from `E` to the related entity `J`. Both are
//! zero-cost `Copy` descriptors, normally declared by the [`entity!`](crate::entity)
//! macro as associated constants (`Order::status`, `Order::customer`).
//!
//! A [`ColumnPath`] is the untyped, resolved form used inside predicates,
//! projections and plans: the query alias the attribute is reached through (the root
//! entity or a join), the owning entity, the field and its kind. [`TypedPath<V>`]
//! keeps the value type for attributes reached through a join.

use crate::condition::{Condition, Operand, Operator};
use crate::metadata::Entity;
use crate::value::{ValueKind, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Query alias of the root entity in every query.
pub const ROOT_ALIAS: &str = "t0";

/// A persistent field path: `alias.field` on `entity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnPath {
    pub alias: String,
    pub entity: String,
    pub field: String,
    pub kind: ValueKind,
}

impl ColumnPath {
    pub fn new(alias: impl Into<String>, entity: impl Into<String>, field: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            alias: alias.into(),
            entity: entity.into(),
            field: field.into(),
            kind,
        }
    }

    /// A field on the root entity.
    pub fn root(entity: impl Into<String>, field: impl Into<String>, kind: ValueKind) -> Self {
        Self::new(ROOT_ALIAS, entity, field, kind)
    }

    pub fn is_root(&self) -> bool {
        self.alias == ROOT_ALIAS
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}

/// Typed descriptor of field `name` on entity `E` with value type `V`.
///
/// Identity is (owner entity, field name).
pub struct Attribute<E, V> {
    name: &'static str,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Attribute<E, V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: Entity, V: ValueType> Attribute<E, V> {
    /// The attribute reached from the root of a query over `E`.
    pub fn path(&self) -> ColumnPath {
        ColumnPath::root(E::NAME, self.name, V::KIND)
    }
}

impl<E, V> Clone for Attribute<E, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, V> Copy for Attribute<E, V> {}

impl<E: Entity, V> fmt::Debug for Attribute<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({}.{})", E::NAME, self.name)
    }
}

/// Typed descriptor of relation `name` from entity `E` to entity `J`.
pub struct Relation<E, J> {
    name: &'static str,
    _marker: PhantomData<fn() -> (E, J)>,
}

impl<E, J> Relation<E, J> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<E, J> Clone for Relation<E, J> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, J> Copy for Relation<E, J> {}

impl<E: Entity, J: Entity> fmt::Debug for Relation<E, J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relation({}.{} -> {})", E::NAME, self.name, J::NAME)
    }
}

/// An attribute reached through a join, keeping its value type.
pub struct TypedPath<V> {
    path: ColumnPath,
    _marker: PhantomData<fn() -> V>,
}

impl<V> TypedPath<V> {
    pub(crate) fn new(path: ColumnPath) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn column_path(&self) -> &ColumnPath {
        &self.path
    }
}

impl<V> Clone for TypedPath<V> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<V> fmt::Debug for TypedPath<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedPath({}.{})", self.path.alias, self.path.field)
    }
}

impl<V> From<TypedPath<V>> for ColumnPath {
    fn from(path: TypedPath<V>) -> Self {
        path.path
    }
}

impl<E: Entity, V: ValueType> From<Attribute<E, V>> for ColumnPath {
    fn from(attribute: Attribute<E, V>) -> Self {
        attribute.path()
    }
}

/// Predicate construction for typed attribute paths.
///
/// Operands must convert into the attribute's own value type, so comparing
/// `Order::status` with an integer does not compile.
///
/// # Example
///
/// ```no_run
/// use querygroup::AttributeTrait;
/// # querygroup::entity! { pub struct Order { table: "orders", key: id, fields { id: i64, status: String } } }
///
/// let open = Order::status.eq("OPEN");
/// let recent = Order::id.gt(1000);
/// let both = open.and(recent);
/// ```
pub trait AttributeTrait<V: ValueType>: Sized {
    fn column_path(&self) -> ColumnPath;

    /// `path = value`
    fn eq<T: Into<V>>(self, value: T) -> Condition {
        Condition::compare(self.column_path(), Operator::Eq, value.into().into_value())
    }

    /// `path <> value`
    fn ne<T: Into<V>>(self, value: T) -> Condition {
        Condition::compare(self.column_path(), Operator::Ne, value.into().into_value())
    }

    /// `path < value`
    fn lt<T: Into<V>>(self, value: T) -> Condition {
        Condition::compare(self.column_path(), Operator::Lt, value.into().into_value())
    }

    /// `path <= value`
    fn lte<T: Into<V>>(self, value: T) -> Condition {
        Condition::compare(self.column_path(), Operator::Lte, value.into().into_value())
    }

    /// `path > value`
    fn gt<T: Into<V>>(self, value: T) -> Condition {
        Condition::compare(self.column_path(), Operator::Gt, value.into().into_value())
    }

    /// `path >= value`
    fn gte<T: Into<V>>(self, value: T) -> Condition {
        Condition::compare(self.column_path(), Operator::Gte, value.into().into_value())
    }

    /// `path LIKE pattern`, with `%` and `_` wildcards and `\` as escape.
    fn like(self, pattern: &str) -> Condition {
        Condition::compare(self.column_path(), Operator::Like, pattern.into())
    }

    /// `path IN (values)`; an empty set matches nothing.
    #[allow(clippy::wrong_self_convention)]
    fn is_in<T, I>(self, values: I) -> Condition
    where
        T: Into<V>,
        I: IntoIterator<Item = T>,
    {
        let values = values.into_iter().map(|v| v.into().into_value()).collect();
        Condition::leaf(self.column_path(), Operator::In, Operand::List(values))
    }

    /// `path IS NULL`
    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Condition {
        Condition::leaf(self.column_path(), Operator::IsNull, Operand::None)
    }

    /// `path IS NOT NULL`
    #[allow(clippy::wrong_self_convention)]
    fn is_not_null(self) -> Condition {
        Condition::leaf(self.column_path(), Operator::IsNotNull, Operand::None)
    }
}

impl<E: Entity, V: ValueType> AttributeTrait<V> for Attribute<E, V> {
    fn column_path(&self) -> ColumnPath {
        self.path()
    }
}

impl<V: ValueType> AttributeTrait<V> for TypedPath<V> {
    fn column_path(&self) -> ColumnPath {
        self.path.clone()
    }
}
