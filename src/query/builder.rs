//! Single-query DSL.
//!
//! [`QueryBuilder<E>`] collects joins, conditions, ordering, pagination and an
//! optional projection for a query rooted at entity `E`. Nothing is checked while
//! the query is being assembled; [`QueryBuilder::build`] resolves every path
//! against the metadata registry and produces an immutable [`SelectPlan`].
//! Execution methods live in [`crate::query::execution`].
//!
//! # Example
//!
//! ```no_run
//! use querygroup::prelude::*;
//! # querygroup::entity! { pub struct Customer { table: "customers", key: id, fields { id: i64, name: String } } }
//! # querygroup::entity! { pub struct Order { table: "orders", key: id,
//! #     fields { id: i64, status: String, customer_id: Option<i64> }
//! #     relations { customer: customer_id -> Customer.id } } }
//! # let registry = MetadataRegistry::builder().register::<Customer>().register::<Order>().build()?;
//! # let store = MemoryStore::new(registry.clone());
//!
//! let mut query = QueryBuilder::<Order>::new(registry);
//! let customer = query.join(Order::customer, JoinKind::Left);
//! query
//!     .filter(Order::status.eq("OPEN"))
//!     .filter(customer.attr(Customer::name).like("AC%"))
//!     .order_by(Order::id, false)
//!     .limit(20);
//! query.select(Order::id)?;
//! query.select_path(customer.attr(Customer::name))?;
//!
//! for row in query.execute_tuples(&store)? {
//!     println!("{:?}", row.cells());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::attribute::{Attribute, ColumnPath, Relation, ROOT_ALIAS};
use crate::condition::Condition;
use crate::error::ConfigurationError;
use crate::join::{Join, JoinKind, JoinSet};
use crate::metadata::{Entity, MetadataRegistry};
use crate::projection::ProjectionSpec;
use crate::query::plan::{OrderKey, SelectPlan};
use crate::value::ValueType;
use sea_query::Values;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A sort key as declared; field names are resolved at build time.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Path(ColumnPath, bool),
    Field(String, bool),
}

pub struct QueryBuilder<E> {
    registry: Arc<MetadataRegistry>,
    joins: JoinSet,
    conditions: Vec<Condition>,
    order: Vec<SortKey>,
    projection: ProjectionSpec,
    distinct: bool,
    limit: Option<u64>,
    offset: Option<u64>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> QueryBuilder<E> {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            joins: JoinSet::default(),
            conditions: Vec::new(),
            order: Vec::new(),
            projection: ProjectionSpec::new(),
            distinct: false,
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// Join the root entity to `J` through `relation`.
    ///
    /// Joining the same relation with the same kind again returns the same handle.
    pub fn join<J: Entity>(&mut self, relation: Relation<E, J>, kind: JoinKind) -> Join<J> {
        let alias = self
            .joins
            .add(ROOT_ALIAS, E::NAME, relation.name(), J::NAME, kind);
        Join::new(alias)
    }

    /// Continue a join chain from an earlier join.
    pub fn join_from<P: Entity, J: Entity>(
        &mut self,
        parent: &Join<P>,
        relation: Relation<P, J>,
        kind: JoinKind,
    ) -> Join<J> {
        let alias = self
            .joins
            .add(parent.alias(), P::NAME, relation.name(), J::NAME, kind);
        Join::new(alias)
    }

    /// AND `condition` into the root predicate.
    pub fn filter(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    /// AND every condition into the root predicate. An empty list adds nothing.
    pub fn where_all<I>(&mut self, conditions: I) -> &mut Self
    where
        I: IntoIterator<Item = Condition>,
    {
        self.conditions.extend(conditions);
        self
    }

    /// Append a sort key. The first key is the primary one.
    pub fn order_by<V: ValueType>(&mut self, attribute: Attribute<E, V>, ascending: bool) -> &mut Self {
        self.order.push(SortKey::Path(attribute.path(), ascending));
        self
    }

    pub fn order_by_path(&mut self, path: impl Into<ColumnPath>, ascending: bool) -> &mut Self {
        self.order.push(SortKey::Path(path.into(), ascending));
        self
    }

    /// Sort by a root field named at runtime; unknown names fail at build time.
    pub fn order_by_field(&mut self, field: &str, ascending: bool) -> &mut Self {
        self.order.push(SortKey::Field(field.to_string(), ascending));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    /// Cap the row count. `0` yields no rows and never reaches the store.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Project `attribute` of the root entity, returning its position.
    pub fn select<V: ValueType>(&mut self, attribute: Attribute<E, V>) -> Result<usize, ConfigurationError> {
        self.projection.register(attribute.path(), None)
    }

    pub fn select_path(&mut self, path: impl Into<ColumnPath>) -> Result<usize, ConfigurationError> {
        self.projection.register(path.into(), None)
    }

    pub fn select_as(
        &mut self,
        path: impl Into<ColumnPath>,
        alias: &str,
    ) -> Result<usize, ConfigurationError> {
        self.projection.register(path.into(), Some(alias.to_string()))
    }

    pub fn projection(&self) -> &ProjectionSpec {
        &self.projection
    }

    pub(crate) fn set_projection(&mut self, projection: ProjectionSpec) {
        self.projection = projection;
    }

    /// Seed the join list, so handles created elsewhere on the same root stay valid.
    pub(crate) fn set_joins(&mut self, joins: JoinSet) {
        self.joins = joins;
    }

    pub fn is_projected(&self) -> bool {
        !self.projection.is_empty()
    }

    /// Compile into a plan, using the projection when one was declared and every
    /// field of `E` otherwise.
    ///
    /// # Errors
    ///
    /// Any [`ConfigurationError`] raised while resolving paths, relations, sort
    /// fields or validating the predicate.
    pub fn build(&self) -> Result<SelectPlan, ConfigurationError> {
        self.compile(!self.projection.is_empty())
    }

    /// Compile selecting every field of `E`, ignoring any projection.
    pub fn build_entity(&self) -> Result<SelectPlan, ConfigurationError> {
        self.compile(false)
    }

    /// PostgreSQL SQL and parameters for [`build`](Self::build).
    pub fn to_sql(&self) -> Result<(String, Values), ConfigurationError> {
        Ok(self.build()?.to_sql())
    }

    fn compile(&self, projected: bool) -> Result<SelectPlan, ConfigurationError> {
        let meta = self.registry.entity(E::NAME)?;
        let joins = self.joins.resolve(&self.registry)?;

        let (mut columns, aliases): (Vec<ColumnPath>, Vec<Option<String>>) = if projected {
            self.projection
                .selections()
                .iter()
                .map(|s| (s.path.clone(), s.alias.clone()))
                .unzip()
        } else {
            meta.fields
                .iter()
                .map(|f| (ColumnPath::root(meta.name, f.name, f.kind), None))
                .unzip()
        };
        for path in &columns {
            self.joins.check_path(&self.registry, E::NAME, path)?;
        }
        let projected_len = columns.len();

        let condition = match self.conditions.len() {
            0 => None,
            1 => Some(self.conditions[0].clone()),
            _ => Some(Condition::all(self.conditions.iter().cloned())),
        };
        if let Some(condition) = &condition {
            for path in condition.paths() {
                self.joins.check_path(&self.registry, E::NAME, path)?;
            }
            condition.validate()?;
        }

        let mut order = Vec::with_capacity(self.order.len());
        for key in &self.order {
            let (path, ascending) = match key {
                SortKey::Path(path, ascending) => (path.clone(), *ascending),
                SortKey::Field(field, ascending) => {
                    let found = self.registry.resolve_field(E::NAME, field, None)?;
                    (ColumnPath::root(E::NAME, found.name, found.kind), *ascending)
                }
            };
            self.joins.check_path(&self.registry, E::NAME, &path)?;
            if !columns.contains(&path) {
                columns.push(path.clone());
            }
            order.push(OrderKey { path, ascending });
        }

        let plan = SelectPlan {
            entity: E::NAME.to_string(),
            table: meta.table.to_string(),
            joins,
            columns,
            aliases,
            projected: projected_len,
            condition,
            order,
            distinct: self.distinct,
            limit: self.limit,
            offset: self.offset,
        };
        log::debug!(
            "compiled plan for {}: {} columns, {} joins, {} sort keys",
            plan.entity,
            plan.columns.len(),
            plan.joins.len(),
            plan.order.len()
        );
        Ok(plan)
    }
}

impl<E: Entity> fmt::Debug for QueryBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("entity", &E::NAME)
            .field("joins", &self.joins)
            .field("conditions", &self.conditions)
            .field("order", &self.order)
            .field("projection", &self.projection)
            .field("distinct", &self.distinct)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}
