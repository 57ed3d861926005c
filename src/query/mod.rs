//! Single-query building and execution.
//!
//! - **Builder**: [`QueryBuilder`] collects joins, conditions, ordering and
//!   projection for one root entity
//! - **Plan**: [`SelectPlan`], the validated, immutable form handed to stores
//! - **Execution**: typed [`Record`]s and positional [`TupleRow`](crate::TupleRow)s,
//!   returned as [`Rows`]
//! - **Dao**: read-only helpers for common lookups

pub mod builder;
pub mod dao;
pub mod execution;
pub mod plan;

pub use builder::QueryBuilder;
pub use dao::{AttributeValues, Dao};
pub use execution::{Record, Rows};
pub use plan::{OrderKey, PlannedJoin, SelectPlan};
