//! Read-only data access helpers over [`QueryBuilder`].
//!
//! [`Dao<E, S>`] packages the lookups most call sites need (all rows, rows by one
//! or several attribute values, rows through a join, by identifier, counts) so
//! they don't each assemble a builder by hand. Every method compiles a fresh
//! query and returns typed [`Record`]s.

use crate::attribute::{Attribute, AttributeTrait, ColumnPath, Relation};
use crate::condition::{Condition, Operator};
use crate::error::{ConfigurationError, DslError};
use crate::join::JoinKind;
use crate::metadata::{Entity, MetadataRegistry};
use crate::query::builder::QueryBuilder;
use crate::query::execution::Record;
use crate::store::QueryStore;
use crate::value::ValueType;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Equality filters on several attributes of `E`.
///
/// ```no_run
/// # use querygroup::query::dao::AttributeValues;
/// # querygroup::entity! { pub struct Order { table: "orders", key: id, fields { id: i64, status: String, region: String } } }
/// let open_east = AttributeValues::<Order>::new()
///     .with(Order::status, "OPEN")
///     .with(Order::region, "EAST");
/// ```
pub struct AttributeValues<E> {
    conditions: Vec<Condition>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> AttributeValues<E> {
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn with<V: ValueType, T: Into<V>>(mut self, attribute: Attribute<E, V>, value: T) -> Self {
        self.conditions.push(attribute.eq(value));
        self
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl<E: Entity> Default for AttributeValues<E> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Dao<E, S: ?Sized> {
    registry: Arc<MetadataRegistry>,
    store: Arc<S>,
    _marker: PhantomData<fn() -> E>,
}

impl<E, S> Dao<E, S>
where
    E: Entity,
    S: QueryStore + ?Sized,
{
    pub fn new(registry: Arc<MetadataRegistry>, store: Arc<S>) -> Self {
        Self {
            registry,
            store,
            _marker: PhantomData,
        }
    }

    /// A fresh builder over `E`, for anything the helpers don't cover.
    pub fn find(&self) -> QueryBuilder<E> {
        QueryBuilder::new(Arc::clone(&self.registry))
    }

    /// Every row, sorted ascending by each path in turn.
    pub fn find_all(&self, order: &[ColumnPath]) -> Result<Vec<Record<E>>, DslError> {
        let mut query = self.find();
        for path in order {
            query.order_by_path(path.clone(), true);
        }
        self.run(&query)
    }

    /// Every row, sorted by each path with its own direction.
    ///
    /// # Errors
    ///
    /// `SortArity` when `order` and `ascending` differ in length.
    pub fn find_all_sorted(
        &self,
        order: &[ColumnPath],
        ascending: &[bool],
    ) -> Result<Vec<Record<E>>, DslError> {
        if order.len() != ascending.len() {
            return Err(ConfigurationError::SortArity {
                attributes: order.len(),
                directions: ascending.len(),
            }
            .into());
        }
        let mut query = self.find();
        for (path, ascending) in order.iter().zip(ascending) {
            query.order_by_path(path.clone(), *ascending);
        }
        self.run(&query)
    }

    pub fn find_all_by_attribute<V: ValueType, T: Into<V>>(
        &self,
        attribute: Attribute<E, V>,
        value: T,
        order: Option<ColumnPath>,
        limit: Option<u64>,
    ) -> Result<Vec<Record<E>>, DslError> {
        let mut query = self.find();
        query.filter(attribute.eq(value));
        if let Some(path) = order {
            query.order_by_path(path, true);
        }
        if let Some(limit) = limit {
            query.limit(limit);
        }
        self.run(&query)
    }

    /// First row whose `attribute` equals `value`.
    pub fn find_one_by_attribute<V: ValueType, T: Into<V>>(
        &self,
        attribute: Attribute<E, V>,
        value: T,
    ) -> Result<Option<Record<E>>, DslError> {
        Ok(self
            .find_all_by_attribute(attribute, value, None, Some(1))?
            .into_iter()
            .next())
    }

    /// Rows whose `attribute` matches the `LIKE` pattern.
    pub fn find_all_by_attribute_like(
        &self,
        attribute: Attribute<E, String>,
        pattern: &str,
        order: Option<ColumnPath>,
    ) -> Result<Vec<Record<E>>, DslError> {
        let mut query = self.find();
        query.filter(attribute.like(pattern));
        if let Some(path) = order {
            query.order_by_path(path, true);
        }
        self.run(&query)
    }

    /// Rows matching every value. No values matches every row.
    pub fn find_all_by_attributes(
        &self,
        values: AttributeValues<E>,
        order: Option<ColumnPath>,
    ) -> Result<Vec<Record<E>>, DslError> {
        let mut query = self.find();
        query.where_all(values.conditions);
        if let Some(path) = order {
            query.order_by_path(path, true);
        }
        self.run(&query)
    }

    /// Rows matching at least one value. No values matches nothing.
    pub fn find_all_by_any_attributes(
        &self,
        values: AttributeValues<E>,
        order: Option<ColumnPath>,
    ) -> Result<Vec<Record<E>>, DslError> {
        let mut query = self.find();
        query.filter(Condition::any(values.conditions));
        if let Some(path) = order {
            query.order_by_path(path, true);
        }
        self.run(&query)
    }

    pub fn find_one_by_attributes(&self, values: AttributeValues<E>) -> Result<Option<Record<E>>, DslError> {
        let mut query = self.find();
        query.where_all(values.conditions).limit(1);
        query.single_result_or_none(self.store.as_ref())
    }

    pub fn find_one_by_any_attributes(
        &self,
        values: AttributeValues<E>,
    ) -> Result<Option<Record<E>>, DslError> {
        let mut query = self.find();
        query.filter(Condition::any(values.conditions)).limit(1);
        query.single_result_or_none(self.store.as_ref())
    }

    /// Rows whose related `J` has `attribute` equal to `value`.
    pub fn find_all_by_attribute_join<J: Entity, V: ValueType, T: Into<V>>(
        &self,
        relation: Relation<E, J>,
        attribute: Attribute<J, V>,
        value: T,
        kind: JoinKind,
    ) -> Result<Vec<Record<E>>, DslError> {
        let mut query = self.find();
        let join = query.join(relation, kind);
        query.filter(join.attr(attribute).eq(value));
        self.run(&query)
    }

    /// The row with identifier `id`, if any.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if `V` is not the identifier's type.
    pub fn find_by_id<V: ValueType>(&self, id: V) -> Result<Option<Record<E>>, DslError> {
        let meta = self.registry.entity(E::NAME)?;
        let field = self.registry.resolve_field(E::NAME, meta.identifier, Some(V::KIND))?;
        let path = ColumnPath::root(E::NAME, field.name, field.kind);

        let mut query = self.find();
        query.filter(Condition::compare(path, Operator::Eq, id.into_value()));
        query.single_result_or_none(self.store.as_ref())
    }

    pub fn count_all(&self) -> Result<u64, DslError> {
        self.find().count(self.store.as_ref())
    }

    pub fn count_by_attribute<V: ValueType, T: Into<V>>(
        &self,
        attribute: Attribute<E, V>,
        value: T,
    ) -> Result<u64, DslError> {
        let mut query = self.find();
        query.filter(attribute.eq(value));
        query.count(self.store.as_ref())
    }

    fn run(&self, query: &QueryBuilder<E>) -> Result<Vec<Record<E>>, DslError> {
        Ok(query.execute(self.store.as_ref())?.collect())
    }
}

impl<E: Entity, S: ?Sized> fmt::Debug for Dao<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao").field("entity", &E::NAME).finish()
    }
}
