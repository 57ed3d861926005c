//! Query execution methods for [`QueryBuilder`].
//!
//! Plans are compiled on the caller, then handed to a [`QueryStore`]. Unprojected
//! queries yield [`Record<E>`]s (every field of `E`, readable by typed attribute);
//! projected queries yield [`TupleRow`]s. Both come back wrapped in [`Rows`], an
//! ordered, finite iterator that can only be consumed once.

use crate::attribute::Attribute;
use crate::error::{ConfigurationError, DslError, QueryError};
use crate::metadata::{Entity, EntityMeta};
use crate::projection::{RowShape, TupleRow};
use crate::query::builder::QueryBuilder;
use crate::query::plan::SelectPlan;
use crate::store::QueryStore;
use crate::value::{Value, ValueType};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Ordered, finite, single-pass result sequence.
#[derive(Debug)]
pub struct Rows<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Rows<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self {
            inner: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> Iterator for Rows<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Rows<T> {}

/// One unprojected row of entity `E`.
#[derive(Clone)]
pub struct Record<E> {
    cells: Vec<Value>,
    meta: Arc<EntityMeta>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Record<E> {
    pub(crate) fn new(cells: Vec<Value>, meta: Arc<EntityMeta>) -> Self {
        Self {
            cells,
            meta,
            _marker: PhantomData,
        }
    }

    /// Typed value of `attribute`.
    ///
    /// # Errors
    ///
    /// `QueryError::Decode` if the cell is missing or does not convert to `V`.
    pub fn get<V: ValueType>(&self, attribute: Attribute<E, V>) -> Result<V, QueryError> {
        let cell = self.value(attribute.name()).ok_or_else(|| {
            QueryError::Decode(format!("{}.{} is not in this row", E::NAME, attribute.name()))
        })?;
        V::from_value(cell).ok_or_else(|| {
            QueryError::Decode(format!(
                "{}.{} holds {cell}, which is not a {}",
                E::NAME,
                attribute.name(),
                V::KIND
            ))
        })
    }

    /// Raw cell of the named field.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.meta.field_index(field).and_then(|i| self.cells.get(i))
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

impl<E> PartialEq for Record<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl<E> fmt::Debug for Record<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, cell) in self.meta.fields.iter().zip(&self.cells) {
            map.entry(&field.name, cell);
        }
        map.finish()
    }
}

/// Run one compiled plan, keeping hidden sort columns.
///
/// A plan limited to zero rows returns immediately without touching the store.
pub(crate) fn fetch_plan<S>(store: &S, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError>
where
    S: QueryStore + ?Sized,
{
    if plan.is_empty_by_limit() {
        log::debug!("plan for {} has limit 0, skipping store", plan.entity);
        return Ok(Vec::new());
    }

    #[cfg(feature = "tracing")]
    let _span = crate::metrics::tracing_helpers::execute_plan_span(&plan.entity).entered();

    let start = Instant::now();
    let result = store.fetch(plan).and_then(|rows| check_width(plan, rows));
    let elapsed = start.elapsed();

    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_query(elapsed, result.is_ok());

    match &result {
        Ok(rows) => log::debug!(
            "plan for {} returned {} rows in {:?}",
            plan.entity,
            rows.len(),
            elapsed
        ),
        Err(e) => log::debug!("plan for {} failed: {e}", plan.entity),
    }
    result
}

/// Every fetched row must carry one cell per plan column.
fn check_width(plan: &SelectPlan, rows: Vec<Vec<Value>>) -> Result<Vec<Vec<Value>>, QueryError> {
    let width = plan.columns.len();
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
        return Err(QueryError::Decode(format!(
            "row {index} for {} has {} cells, expected {width}",
            plan.entity,
            row.len()
        )));
    }
    Ok(rows)
}

// Execution methods for QueryBuilder
impl<E: Entity> QueryBuilder<E> {
    /// Execute as an entity query, ignoring any projection.
    ///
    /// # Errors
    ///
    /// `DslError::Configuration` for an invalid query, `DslError::Query` for a
    /// store failure.
    pub fn execute<S>(&self, store: &S) -> Result<Rows<Record<E>>, DslError>
    where
        S: QueryStore + ?Sized,
    {
        let plan = self.build_entity()?;
        let meta = Arc::clone(self.registry().entity(E::NAME)?);
        let mut rows = fetch_plan(store, &plan)?;
        plan.finish_rows(&mut rows);
        Ok(Rows::new(
            rows.into_iter()
                .map(|cells| Record::new(cells, Arc::clone(&meta)))
                .collect(),
        ))
    }

    /// Execute as a projected query.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::EmptyProjection` if nothing was selected, plus the
    /// errors of [`execute`](Self::execute).
    pub fn execute_tuples<S>(&self, store: &S) -> Result<Rows<TupleRow>, DslError>
    where
        S: QueryStore + ?Sized,
    {
        if !self.is_projected() {
            return Err(ConfigurationError::EmptyProjection(E::NAME.to_string()).into());
        }
        let plan = self.build()?;
        let shape = Arc::new(RowShape::new(plan.aliases.clone()));
        let mut rows = fetch_plan(store, &plan)?;
        plan.finish_rows(&mut rows);
        Ok(Rows::new(
            rows.into_iter()
                .map(|cells| TupleRow::new(cells, Arc::clone(&shape)))
                .collect(),
        ))
    }

    /// Exactly one matching record.
    ///
    /// # Errors
    ///
    /// `QueryError::NotSingle` when zero or several rows match.
    pub fn single_result<S>(&self, store: &S) -> Result<Record<E>, DslError>
    where
        S: QueryStore + ?Sized,
    {
        let mut rows = self.execute(store)?;
        match (rows.next(), rows.len()) {
            (Some(record), 0) => Ok(record),
            (None, _) => Err(QueryError::NotSingle(0).into()),
            (Some(_), rest) => Err(QueryError::NotSingle(rest + 1).into()),
        }
    }

    /// The first matching record, if any.
    pub fn single_result_or_none<S>(&self, store: &S) -> Result<Option<Record<E>>, DslError>
    where
        S: QueryStore + ?Sized,
    {
        Ok(self.execute(store)?.next())
    }

    /// Number of rows [`execute`](Self::execute) would return.
    ///
    /// A distinct query ordered by a joined column is counted by fetching it, as
    /// its rows are only deduplicated after the fetch.
    pub fn count<S>(&self, store: &S) -> Result<u64, DslError>
    where
        S: QueryStore + ?Sized,
    {
        let plan = self.build_entity()?;
        if plan.is_empty_by_limit() {
            return Ok(0);
        }
        if plan.needs_projected_dedup() {
            let mut rows = fetch_plan(store, &plan)?;
            plan.finish_rows(&mut rows);
            return Ok(rows.len() as u64);
        }
        Ok(store.count(&plan)?)
    }
}
