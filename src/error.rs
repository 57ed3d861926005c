//! Error taxonomy for query construction and execution.
//!
//! Three families of failure surface from this crate:
//!
//! - [`ConfigurationError`] - programmer errors caught when a query is compiled
//!   (unknown attribute, type mismatch, null operand, ...). Never retried.
//! - [`QueryError`] - store connectivity or execution failures. Propagated unchanged
//!   and abort a whole group call.
//! - [`IndexError`] - lookup of an attribute that was never projected by a group.
//!
//! [`DslError`] wraps all three so builder and group APIs can use `?` freely.

use crate::value::ValueKind;
use may_postgres::Error as PostgresError;
use std::fmt;

/// Programmer error detected while resolving attributes or compiling a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The entity was never registered with the metadata registry
    UnknownEntity(String),
    /// The entity was registered twice
    DuplicateEntity(String),
    /// The field does not exist on the entity
    UnknownAttribute { entity: String, field: String },
    /// The relation does not exist on the entity
    UnknownRelation { entity: String, relation: String },
    /// An attribute path refers to a join alias this query never created
    UnknownJoin(String),
    /// The relation exists but points at a different entity than declared
    RelationTarget {
        entity: String,
        relation: String,
        declared: String,
        actual: String,
    },
    /// The declared value type does not match the store's field type
    TypeMismatch {
        entity: String,
        field: String,
        declared: ValueKind,
        actual: ValueKind,
    },
    /// A null operand was used where an explicit `is_null` leaf is required
    NullOperand { field: String, operator: String },
    /// Two projected columns share one alias
    DuplicateAlias(String),
    /// A tuple query was executed without any projected column
    EmptyProjection(String),
    /// A new column was registered after the projection shape was frozen
    ProjectionFrozen(String),
    /// Sort attributes and sort directions have different lengths
    SortArity { attributes: usize, directions: usize },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::UnknownEntity(name) => {
                write!(f, "Entity '{name}' is not registered")
            }
            ConfigurationError::DuplicateEntity(name) => {
                write!(f, "Entity '{name}' is registered more than once")
            }
            ConfigurationError::UnknownAttribute { entity, field } => {
                write!(f, "Entity '{entity}' has no attribute '{field}'")
            }
            ConfigurationError::UnknownRelation { entity, relation } => {
                write!(f, "Entity '{entity}' has no relation '{relation}'")
            }
            ConfigurationError::UnknownJoin(alias) => {
                write!(f, "Join alias '{alias}' does not belong to this query")
            }
            ConfigurationError::RelationTarget {
                entity,
                relation,
                declared,
                actual,
            } => write!(
                f,
                "Relation '{entity}.{relation}' targets '{actual}', declared as '{declared}'"
            ),
            ConfigurationError::TypeMismatch {
                entity,
                field,
                declared,
                actual,
            } => write!(
                f,
                "Attribute '{entity}.{field}' is {actual}, declared as {declared}"
            ),
            ConfigurationError::NullOperand { field, operator } => write!(
                f,
                "Null operand for '{field}' {operator}; use is_null()/is_not_null() instead"
            ),
            ConfigurationError::DuplicateAlias(alias) => {
                write!(f, "Alias '{alias}' is used by more than one projected column")
            }
            ConfigurationError::EmptyProjection(entity) => {
                write!(f, "Tuple query on '{entity}' has no projected columns")
            }
            ConfigurationError::ProjectionFrozen(path) => write!(
                f,
                "Cannot add '{path}' to a frozen projection"
            ),
            ConfigurationError::SortArity {
                attributes,
                directions,
            } => write!(
                f,
                "{attributes} sort attributes but {directions} sort directions"
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Store connectivity or execution failure.
#[derive(Debug)]
pub enum QueryError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Connection could not be established
    Connection(String),
    /// No pooled connection became free in time
    PoolTimeout(u64),
    /// Query execution error reported by the store
    Execution(String),
    /// A cell could not be decoded into the requested type
    Decode(String),
    /// A single-row query returned a different number of rows
    NotSingle(usize),
    /// A group worker coroutine panicked
    WorkerPanicked(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            QueryError::Connection(s) => write!(f, "Connection error: {s}"),
            QueryError::PoolTimeout(secs) => {
                write!(f, "Timed out after {secs}s waiting for a pooled connection")
            }
            QueryError::Execution(s) => write!(f, "Query error: {s}"),
            QueryError::Decode(s) => write!(f, "Decode error: {s}"),
            QueryError::NotSingle(n) => write!(f, "Expected exactly one row, got {n}"),
            QueryError::WorkerPanicked(s) => write!(f, "Group worker panicked: {s}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for QueryError {
    fn from(err: PostgresError) -> Self {
        QueryError::Postgres(err)
    }
}

/// Lookup of an attribute that is not part of a group's projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexError {
    pub entity: String,
    pub attribute: String,
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attribute '{}.{}' was never registered in this projection",
            self.entity, self.attribute
        )
    }
}

impl std::error::Error for IndexError {}

/// Any failure raised by the builder, group or store layers.
#[derive(Debug)]
pub enum DslError {
    Configuration(ConfigurationError),
    Query(QueryError),
    Index(IndexError),
}

impl DslError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, DslError::Configuration(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, DslError::Query(_))
    }

    pub fn is_index(&self) -> bool {
        matches!(self, DslError::Index(_))
    }
}

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DslError::Configuration(e) => write!(f, "Configuration error: {e}"),
            DslError::Query(e) => write!(f, "{e}"),
            DslError::Index(e) => write!(f, "Index error: {e}"),
        }
    }
}

impl std::error::Error for DslError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DslError::Configuration(e) => Some(e),
            DslError::Query(e) => Some(e),
            DslError::Index(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for DslError {
    fn from(err: ConfigurationError) -> Self {
        DslError::Configuration(err)
    }
}

impl From<QueryError> for DslError {
    fn from(err: QueryError) -> Self {
        DslError::Query(err)
    }
}

impl From<IndexError> for DslError {
    fn from(err: IndexError) -> Self {
        DslError::Index(err)
    }
}

impl From<PostgresError> for DslError {
    fn from(err: PostgresError) -> Self {
        DslError::Query(QueryError::Postgres(err))
    }
}
