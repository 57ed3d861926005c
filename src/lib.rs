//! # querygroup
//!
//! Typed query construction and multi-query aggregation over a relational entity
//! store, running on the `may` coroutine runtime.
//!
//! - [`entity!`] declares an entity with typed [`Attribute`] and [`Relation`]
//!   descriptors
//! - [`QueryBuilder`] builds one filtered, joined, ordered, projected query
//! - [`QueryGroup`] runs several variants of one query (shared projection, common
//!   predicate, one predicate per item) and merges the rows
//! - [`QueryStore`] is the backing store seam: [`MemoryStore`] in-process,
//!   [`PostgresStore`] over `may_postgres`

pub mod attribute;
pub mod condition;
pub mod config;
pub mod error;
pub mod group;
pub mod join;
pub mod metadata;
pub mod metrics;
pub mod projection;
pub mod query;
pub mod store;
pub mod value;

mod macros;
#[cfg(test)]
mod tests_cfg;

pub use attribute::{Attribute, AttributeTrait, ColumnPath, Relation, TypedPath, ROOT_ALIAS};
pub use condition::{Condition, Operand, Operator, Predicate};
pub use config::{DatabaseConfig, QueryConfig, Settings};
pub use error::{ConfigurationError, DslError, IndexError, QueryError};
pub use group::{execute_group, ConditionContributor, ExecutionOptions, QueryGroup, QueryGroupSpec};
pub use join::{Join, JoinKind};
pub use metadata::{Entity, EntityMeta, FieldMeta, MetadataRegistry, RegistryBuilder, RelationMeta};
pub use projection::{ProjectionSpec, RowShape, TupleRow};
pub use query::{AttributeValues, Dao, QueryBuilder, Record, Rows, SelectPlan};
pub use store::{MemoryStore, NewRow, PostgresStore, QueryStore};
pub use value::{Value, ValueKind, ValueType};

/// Everything needed to declare entities and run queries.
pub mod prelude {
    pub use crate::{
        AttributeTrait, Condition, DslError, Entity, JoinKind, MemoryStore, MetadataRegistry,
        NewRow, QueryBuilder, QueryGroup, QueryStore, TupleRow, Value,
    };
}
