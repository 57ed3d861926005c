//! Typed join declarations.
//!
//! A join records a traversal from a parent alias (the query root `t0` or an earlier
//! join) through a named relation to the related entity. Each join gets its own
//! alias (`t1`, `t2`, ...) in declaration order, so chains compose into multi-hop
//! paths and the same entity can be joined more than once.
//!
//! Relation names are resolved against the metadata registry when the query is
//! compiled, not when the join is declared.

use crate::attribute::{Attribute, ColumnPath, TypedPath, ROOT_ALIAS};
use crate::error::ConfigurationError;
use crate::metadata::{Entity, MetadataRegistry};
use crate::query::plan::PlannedJoin;
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Inner joins model mandatory relations, left joins optional ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => f.write_str("INNER JOIN"),
            JoinKind::Left => f.write_str("LEFT JOIN"),
        }
    }
}

impl From<JoinKind> for sea_query::JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => sea_query::JoinType::InnerJoin,
            JoinKind::Left => sea_query::JoinType::LeftJoin,
        }
    }
}

/// One declared traversal, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub alias: String,
    pub parent_alias: String,
    pub parent_entity: String,
    pub relation: String,
    pub entity: String,
    pub kind: JoinKind,
}

/// Handle to a joined entity `J`, used to scope attributes to the join.
pub struct Join<J> {
    alias: String,
    _marker: PhantomData<fn() -> J>,
}

impl<J> Join<J> {
    pub(crate) fn new(alias: String) -> Self {
        Self {
            alias,
            _marker: PhantomData,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl<J: Entity> Join<J> {
    /// `attribute` reached through this join.
    pub fn attr<V: ValueType>(&self, attribute: Attribute<J, V>) -> TypedPath<V> {
        TypedPath::new(ColumnPath::new(
            self.alias.clone(),
            J::NAME,
            attribute.name(),
            V::KIND,
        ))
    }
}

impl<J> Clone for Join<J> {
    fn clone(&self) -> Self {
        Self::new(self.alias.clone())
    }
}

impl<J: Entity> fmt::Debug for Join<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Join({} as {})", J::NAME, self.alias)
    }
}

/// The ordered joins of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSet {
    joins: Vec<JoinSpec>,
}

impl JoinSet {
    /// Declare a join, reusing an identical earlier declaration.
    pub fn add(
        &mut self,
        parent_alias: &str,
        parent_entity: &str,
        relation: &str,
        entity: &str,
        kind: JoinKind,
    ) -> String {
        if let Some(existing) = self.joins.iter().find(|j| {
            j.parent_alias == parent_alias && j.relation == relation && j.kind == kind
        }) {
            return existing.alias.clone();
        }
        let alias = format!("t{}", self.joins.len() + 1);
        self.joins.push(JoinSpec {
            alias: alias.clone(),
            parent_alias: parent_alias.to_string(),
            parent_entity: parent_entity.to_string(),
            relation: relation.to_string(),
            entity: entity.to_string(),
            kind,
        });
        alias
    }

    pub fn specs(&self) -> &[JoinSpec] {
        &self.joins
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Entity reachable under `alias`, given the query's root entity.
    pub fn entity_of<'a>(&'a self, root_entity: &'a str, alias: &str) -> Option<&'a str> {
        if alias == ROOT_ALIAS {
            return Some(root_entity);
        }
        self.joins
            .iter()
            .find(|j| j.alias == alias)
            .map(|j| j.entity.as_str())
    }

    /// Check that `path` is reachable in this query and names a real field.
    pub fn check_path(
        &self,
        registry: &MetadataRegistry,
        root_entity: &str,
        path: &ColumnPath,
    ) -> Result<(), ConfigurationError> {
        match self.entity_of(root_entity, &path.alias) {
            Some(entity) if entity == path.entity => {}
            _ => return Err(ConfigurationError::UnknownJoin(path.alias.clone())),
        }
        registry.resolve_field(&path.entity, &path.field, Some(path.kind))?;
        Ok(())
    }

    /// Resolve every relation against the registry.
    ///
    /// # Errors
    ///
    /// `UnknownRelation`/`RelationTarget` for a relation that does not exist or
    /// points elsewhere, `UnknownEntity` for an unregistered entity.
    pub fn resolve(&self, registry: &MetadataRegistry) -> Result<Vec<PlannedJoin>, ConfigurationError> {
        self.joins
            .iter()
            .map(|spec| {
                let relation = registry.resolve_relation(
                    &spec.parent_entity,
                    &spec.relation,
                    Some(&spec.entity),
                )?;
                let target = registry.entity(relation.target)?;
                Ok(PlannedJoin {
                    alias: spec.alias.clone(),
                    parent_alias: spec.parent_alias.clone(),
                    relation: spec.relation.clone(),
                    entity: target.name.to_string(),
                    table: target.table.to_string(),
                    local_column: relation.local_column.to_string(),
                    target_column: relation.target_column.to_string(),
                    kind: spec.kind,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_cfg::{registry, Customer, Order};
    use crate::value::ValueKind;

    #[test]
    fn test_aliases_follow_declaration_order() {
        let mut joins = JoinSet::default();
        let first = joins.add(ROOT_ALIAS, "Order", "customer", "Customer", JoinKind::Inner);
        let second = joins.add(ROOT_ALIAS, "Order", "customer", "Customer", JoinKind::Left);
        assert_eq!(first, "t1");
        assert_eq!(second, "t2");
        assert_eq!(joins.specs().len(), 2);
    }

    #[test]
    fn test_identical_join_is_reused() {
        let mut joins = JoinSet::default();
        let first = joins.add(ROOT_ALIAS, "Order", "customer", "Customer", JoinKind::Inner);
        let again = joins.add(ROOT_ALIAS, "Order", "customer", "Customer", JoinKind::Inner);
        assert_eq!(first, again);
        assert_eq!(joins.specs().len(), 1);
    }

    #[test]
    fn test_join_handle_scopes_attribute() {
        let join: Join<Customer> = Join::new("t1".to_string());
        let path = join.attr(Customer::name);
        assert_eq!(
            path.column_path(),
            &ColumnPath::new("t1", "Customer", "name", ValueKind::String)
        );
    }

    #[test]
    fn test_resolve_reads_relation_columns() {
        let registry = registry();
        let mut joins = JoinSet::default();
        joins.add(ROOT_ALIAS, Order::NAME, "customer", Customer::NAME, JoinKind::Left);
        let planned = joins.resolve(&registry).unwrap();
        assert_eq!(planned[0].table, "customers");
        assert_eq!(planned[0].local_column, "customer_id");
        assert_eq!(planned[0].target_column, "id");
        assert_eq!(planned[0].kind, JoinKind::Left);
    }

    #[test]
    fn test_check_path_rejects_foreign_alias() {
        let registry = registry();
        let joins = JoinSet::default();
        let path = ColumnPath::new("t3", "Customer", "name", ValueKind::String);
        let err = joins.check_path(&registry, "Order", &path).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownJoin("t3".to_string()));

        let path = ColumnPath::root("Order", "status", ValueKind::String);
        assert!(joins.check_path(&registry, "Order", &path).is_ok());
    }
}
