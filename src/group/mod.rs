//! Query groups: one projection, one common predicate, many query variants.
//!
//! A [`QueryGroup<E>`] describes N queries over the same root entity that differ
//! only in an item-specific predicate. Every item query shares
//!
//! - the group's projection (registered through [`QueryGroup::multiselect`]),
//! - the group's joins,
//! - the common predicate (if any), ANDed with the item predicate,
//! - the group's distinct flag and ordering.
//!
//! [`QueryGroup::get_results`] compiles one plan per item on the caller, runs the
//! plans through [`execute_group`], concatenates their rows in registration order,
//! sorts them globally and removes duplicates. Values are read back with
//! [`QueryGroup::get`], using the same attribute that was registered.
//!
//! # Example
//!
//! ```no_run
//! use querygroup::prelude::*;
//! use std::sync::Arc;
//! # querygroup::entity! { pub struct Order { table: "orders", key: id,
//! #     fields { id: i64, status: String, region: String } } }
//! # let registry = MetadataRegistry::builder().register::<Order>().build()?;
//! # let store = Arc::new(MemoryStore::new(registry.clone()));
//!
//! let mut group = QueryGroup::<Order>::new(registry);
//! group.multiselect(Order::id)?;
//! group.set_common(|_, conditions| conditions.push(Order::status.eq("OPEN")));
//! for region in ["EAST", "WEST"] {
//!     group.add_item(move |_, conditions| conditions.push(Order::region.eq(region)));
//! }
//! group.distinct().order_by(Order::id, true);
//!
//! for row in group.get_results(&store)? {
//!     let id: i64 = group.get(&row, Order::id)?;
//!     println!("{id}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod execution;
pub mod spec;

pub use execution::execute_group;
pub use spec::{ExecutionOptions, QueryGroupSpec};

use crate::attribute::{Attribute, ColumnPath, Relation, TypedPath, ROOT_ALIAS};
use crate::condition::Condition;
use crate::error::{ConfigurationError, DslError, IndexError, QueryError};
use crate::join::{Join, JoinKind, JoinSet};
use crate::metadata::{Entity, MetadataRegistry};
use crate::projection::{ProjectionSpec, TupleRow};
use crate::query::plan::SelectPlan;
use crate::query::QueryBuilder;
use crate::store::QueryStore;
use crate::value::{Value, ValueType};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Adds predicate parts to a freshly created query.
///
/// Contributors receive the query itself, so they may declare joins before
/// pushing conditions that use them. Everything pushed is ANDed.
pub trait ConditionContributor<E: Entity>: Send + Sync {
    fn conditions_will_be_added(&self, query: &mut QueryBuilder<E>, conditions: &mut Vec<Condition>);
}

impl<E, F> ConditionContributor<E> for F
where
    E: Entity,
    F: Fn(&mut QueryBuilder<E>, &mut Vec<Condition>) + Send + Sync,
{
    fn conditions_will_be_added(&self, query: &mut QueryBuilder<E>, conditions: &mut Vec<Condition>) {
        self(query, conditions)
    }
}

type BoxedContributor<E> = Box<dyn ConditionContributor<E>>;

#[derive(Debug, Clone)]
enum GroupSort {
    Path(ColumnPath, bool),
    Field(String, bool),
}

pub struct QueryGroup<E: Entity> {
    registry: Arc<MetadataRegistry>,
    projection: ProjectionSpec,
    joins: JoinSet,
    common: Option<BoxedContributor<E>>,
    items: Vec<BoxedContributor<E>>,
    distinct: bool,
    order: Vec<GroupSort>,
    frozen: AtomicBool,
    options: ExecutionOptions,
}

impl<E: Entity> QueryGroup<E> {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self::with_options(registry, ExecutionOptions::default())
    }

    pub fn with_options(registry: Arc<MetadataRegistry>, options: ExecutionOptions) -> Self {
        Self {
            registry,
            projection: ProjectionSpec::new(),
            joins: JoinSet::default(),
            common: None,
            items: Vec::new(),
            distinct: false,
            order: Vec::new(),
            frozen: AtomicBool::new(false),
            options,
        }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Join shared by every item query, usable in projections, ordering and
    /// contributors.
    pub fn join<J: Entity>(&mut self, relation: Relation<E, J>, kind: JoinKind) -> Join<J> {
        Join::new(
            self.joins
                .add(ROOT_ALIAS, E::NAME, relation.name(), J::NAME, kind),
        )
    }

    pub fn join_from<P: Entity, J: Entity>(
        &mut self,
        parent: &Join<P>,
        relation: Relation<P, J>,
        kind: JoinKind,
    ) -> Join<J> {
        Join::new(
            self.joins
                .add(parent.alias(), P::NAME, relation.name(), J::NAME, kind),
        )
    }

    /// Register `attribute` in the shared projection and return its position.
    ///
    /// Registering the same attribute again returns the same position.
    ///
    /// # Errors
    ///
    /// `ProjectionFrozen` for a new attribute once the group has been executed,
    /// `DuplicateAlias` from [`multiselect_as`](Self::multiselect_as).
    pub fn multiselect<V: ValueType>(&mut self, attribute: Attribute<E, V>) -> Result<usize, ConfigurationError> {
        self.register(attribute.path(), None)
    }

    pub fn multiselect_path(&mut self, path: impl Into<ColumnPath>) -> Result<usize, ConfigurationError> {
        self.register(path.into(), None)
    }

    pub fn multiselect_as(
        &mut self,
        path: impl Into<ColumnPath>,
        alias: &str,
    ) -> Result<usize, ConfigurationError> {
        self.register(path.into(), Some(alias.to_string()))
    }

    fn register(&mut self, path: ColumnPath, alias: Option<String>) -> Result<usize, ConfigurationError> {
        if self.frozen.load(Ordering::SeqCst) {
            self.projection.freeze();
        }
        self.projection.register(path, alias)
    }

    pub fn projection(&self) -> &ProjectionSpec {
        &self.projection
    }

    /// Position of a registered path.
    pub fn position(&self, path: &ColumnPath) -> Option<usize> {
        self.projection.position(path)
    }

    /// Replace the common predicate. Only the last contributor set is used.
    pub fn set_common<F>(&mut self, contributor: F) -> &mut Self
    where
        F: Fn(&mut QueryBuilder<E>, &mut Vec<Condition>) + Send + Sync + 'static,
    {
        self.set_common_contributor(contributor)
    }

    pub fn set_common_contributor<C>(&mut self, contributor: C) -> &mut Self
    where
        C: ConditionContributor<E> + 'static,
    {
        if self.common.is_some() {
            log::debug!("replacing common contributor of group over {}", E::NAME);
        }
        self.common = Some(Box::new(contributor));
        self
    }

    /// Append a query variant.
    pub fn add_item<F>(&mut self, contributor: F) -> &mut Self
    where
        F: Fn(&mut QueryBuilder<E>, &mut Vec<Condition>) + Send + Sync + 'static,
    {
        self.add_item_contributor(contributor)
    }

    pub fn add_item_contributor<C>(&mut self, contributor: C) -> &mut Self
    where
        C: ConditionContributor<E> + 'static,
    {
        self.items.push(Box::new(contributor));
        self
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Remove rows whose projected cells equal an earlier row's.
    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    /// Append a global sort key. The key does not have to be projected.
    pub fn order_by<V: ValueType>(&mut self, attribute: Attribute<E, V>, ascending: bool) -> &mut Self {
        self.order.push(GroupSort::Path(attribute.path(), ascending));
        self
    }

    pub fn order_by_path(&mut self, path: impl Into<ColumnPath>, ascending: bool) -> &mut Self {
        self.order.push(GroupSort::Path(path.into(), ascending));
        self
    }

    pub fn order_by_field(&mut self, field: &str, ascending: bool) -> &mut Self {
        self.order.push(GroupSort::Field(field.to_string(), ascending));
        self
    }

    /// Compile the group into an immutable [`QueryGroupSpec`].
    ///
    /// A group without items compiles to a single query carrying the common
    /// predicate only.
    ///
    /// # Errors
    ///
    /// `EmptyProjection` if nothing was registered, plus any error raised while
    /// compiling an item query.
    pub fn snapshot(&self) -> Result<QueryGroupSpec, ConfigurationError> {
        if self.projection.is_empty() {
            return Err(ConfigurationError::EmptyProjection(E::NAME.to_string()));
        }

        let plans = if self.items.is_empty() {
            vec![self.compile_item(None)?]
        } else {
            self.items
                .iter()
                .map(|item| self.compile_item(Some(item.as_ref())))
                .collect::<Result<Vec<_>, _>>()?
        };

        // Group keys come first in every plan; contributors may only append.
        let order = plans
            .first()
            .and_then(|plan| plan.order.get(..self.order.len()))
            .map(<[_]>::to_vec)
            .unwrap_or_default();

        Ok(QueryGroupSpec {
            entity: E::NAME.to_string(),
            plans,
            shape: self.projection.shape(),
            width: self.projection.len(),
            order,
            distinct: self.distinct,
        })
    }

    fn compile_item(
        &self,
        item: Option<&dyn ConditionContributor<E>>,
    ) -> Result<SelectPlan, ConfigurationError> {
        let mut projection = self.projection.clone();
        projection.freeze();

        let mut query = QueryBuilder::<E>::new(Arc::clone(&self.registry));
        query.set_projection(projection);
        query.set_joins(self.joins.clone());
        if self.distinct {
            query.distinct();
        }
        for key in &self.order {
            match key {
                GroupSort::Path(path, ascending) => query.order_by_path(path.clone(), *ascending),
                GroupSort::Field(field, ascending) => query.order_by_field(field, *ascending),
            };
        }

        let mut conditions = Vec::new();
        if let Some(common) = &self.common {
            common.conditions_will_be_added(&mut query, &mut conditions);
        }
        if let Some(item) = item {
            item.conditions_will_be_added(&mut query, &mut conditions);
        }
        query.where_all(conditions);
        query.build()
    }

    /// Run every item query against `store` and return the merged rows.
    ///
    /// The projection is frozen from here on: later registrations of new
    /// attributes fail, re-registrations still succeed.
    ///
    /// # Errors
    ///
    /// `DslError::Configuration` if the group does not compile,
    /// `DslError::Query` for the first store failure by item index.
    pub fn get_results<S>(&self, store: &Arc<S>) -> Result<Vec<TupleRow>, DslError>
    where
        S: QueryStore + ?Sized + 'static,
    {
        let spec = self.snapshot()?;
        self.frozen.store(true, Ordering::SeqCst);
        execute_group(&spec, store, &self.options)
    }

    /// Typed value of `attribute` in `row`.
    ///
    /// # Errors
    ///
    /// `DslError::Index` if `attribute` was never registered,
    /// `DslError::Query(QueryError::Decode)` if the cell does not convert to `V`.
    pub fn get<V: ValueType>(&self, row: &TupleRow, attribute: Attribute<E, V>) -> Result<V, DslError> {
        self.read(row, &attribute.path())
    }

    /// Typed value of a joined attribute in `row`, `None` when the cell is null
    /// (as it is for unmatched left joins).
    pub fn get_joined<V: ValueType>(&self, row: &TupleRow, path: &TypedPath<V>) -> Result<Option<V>, DslError> {
        self.read(row, path.column_path())
    }

    /// Cell registered under `alias`, if any.
    pub fn get_alias<'r>(&self, row: &'r TupleRow, alias: &str) -> Option<&'r Value> {
        row.get_alias(alias)
    }

    fn read<V: ValueType>(&self, row: &TupleRow, path: &ColumnPath) -> Result<V, DslError> {
        let position = self.projection.position(path).ok_or_else(|| IndexError {
            entity: path.entity.clone(),
            attribute: path.field.clone(),
        })?;
        let cell = row
            .get(position)
            .ok_or_else(|| QueryError::Decode(format!("row has no column {position} for {path}")))?;
        V::from_value(cell).ok_or_else(|| {
            QueryError::Decode(format!("{path} holds {cell}, which is not a {}", V::KIND)).into()
        })
    }
}

impl<E: Entity> fmt::Debug for QueryGroup<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryGroup")
            .field("entity", &E::NAME)
            .field("projection", &self.projection)
            .field("joins", &self.joins)
            .field("common", &self.common.is_some())
            .field("items", &self.items.len())
            .field("distinct", &self.distinct)
            .field("order", &self.order)
            .field("frozen", &self.frozen.load(Ordering::SeqCst))
            .field("options", &self.options)
            .finish()
    }
}
