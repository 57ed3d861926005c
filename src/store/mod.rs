//! Backing stores.
//!
//! A [`QueryStore`] executes compiled [`SelectPlan`]s and returns rows of cells in
//! `plan.columns` order, hidden sort columns included. Stores are shared across
//! the coroutines of a group execution, so they must be `Send + Sync` and must not
//! share one session between concurrent calls.
//!
//! - [`MemoryStore`] evaluates plans in-process
//! - [`PostgresStore`] renders plans to SQL over a pool of `may_postgres` clients

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, NewRow};
pub use postgres::PostgresStore;

use crate::error::QueryError;
use crate::query::plan::SelectPlan;
use crate::value::Value;
use std::sync::Arc;

/// Typed-query execution interface of a backing store.
pub trait QueryStore: Send + Sync {
    /// Rows matching `plan`, ordered, with one cell per `plan.columns` entry.
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError>;

    /// Number of rows `fetch` would return.
    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError>;
}

impl<S: QueryStore + ?Sized> QueryStore for Arc<S> {
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        (**self).fetch(plan)
    }

    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError> {
        (**self).count(plan)
    }
}

impl<S: QueryStore + ?Sized> QueryStore for &S {
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        (**self).fetch(plan)
    }

    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError> {
        (**self).count(plan)
    }
}
