//! Entity metadata and the startup-time attribute registry.
//!
//! Every entity describes itself through [`Entity::meta`] (normally generated by the
//! [`entity!`](crate::entity) macro). A [`MetadataRegistry`] collects those
//! descriptions once, validates them as a whole (relation targets, join columns,
//! identifiers) and then answers attribute/relation lookups for the lifetime of the
//! process. Nothing is resolved by reflection at query time.

use crate::error::ConfigurationError;
use crate::value::ValueKind;
use std::collections::HashMap;
use std::sync::Arc;

/// A persistent record type accessible through the store.
pub trait Entity: Send + Sync + 'static {
    /// Entity name, unique within a registry
    const NAME: &'static str;

    /// Static description of the entity's table, fields and relations
    fn meta() -> EntityMeta;
}

/// A named, typed field of an entity. The field name is also its column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: &'static str,
    pub kind: ValueKind,
    pub nullable: bool,
}

/// A traversal from one entity to a related entity.
///
/// Joins match `local_column` on the owning entity with `target_column` on the
/// target entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    pub name: &'static str,
    pub target: &'static str,
    pub local_column: &'static str,
    pub target_column: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    /// Name of the declared identifier field
    pub identifier: &'static str,
    pub fields: Vec<FieldMeta>,
    pub relations: Vec<RelationMeta>,
}

impl EntityMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn identifier_field(&self) -> Option<&FieldMeta> {
        self.field(self.identifier)
    }
}

/// Collects entity descriptions before validating them into a [`MetadataRegistry`].
///
/// # Example
///
/// ```no_run
/// use querygroup::metadata::RegistryBuilder;
/// # querygroup::entity! { pub struct Customer { table: "customers", key: id, fields { id: i64 } } }
///
/// let registry = RegistryBuilder::new().register::<Customer>().build()?;
/// # Ok::<(), querygroup::ConfigurationError>(())
/// ```
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityMeta>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Entity>(mut self) -> Self {
        self.entities.push(E::meta());
        self
    }

    pub fn register_meta(mut self, meta: EntityMeta) -> Self {
        self.entities.push(meta);
        self
    }

    /// Validate every description and freeze the registry.
    ///
    /// # Errors
    ///
    /// - `DuplicateEntity` if two descriptions share a name
    /// - `UnknownAttribute` if an identifier or a relation column does not exist
    /// - `UnknownEntity` if a relation targets an unregistered entity
    /// - `TypeMismatch` if the two columns of a relation have incomparable kinds
    pub fn build(self) -> Result<Arc<MetadataRegistry>, ConfigurationError> {
        let mut entities: HashMap<&'static str, Arc<EntityMeta>> = HashMap::new();
        for meta in self.entities {
            if entities.contains_key(meta.name) {
                return Err(ConfigurationError::DuplicateEntity(meta.name.to_string()));
            }
            if meta.identifier_field().is_none() {
                return Err(ConfigurationError::UnknownAttribute {
                    entity: meta.name.to_string(),
                    field: meta.identifier.to_string(),
                });
            }
            entities.insert(meta.name, Arc::new(meta));
        }

        for meta in entities.values() {
            for relation in &meta.relations {
                let local = meta.field(relation.local_column).ok_or_else(|| {
                    ConfigurationError::UnknownAttribute {
                        entity: meta.name.to_string(),
                        field: relation.local_column.to_string(),
                    }
                })?;
                let target = entities
                    .get(relation.target)
                    .ok_or_else(|| ConfigurationError::UnknownEntity(relation.target.to_string()))?;
                let remote = target.field(relation.target_column).ok_or_else(|| {
                    ConfigurationError::UnknownAttribute {
                        entity: target.name.to_string(),
                        field: relation.target_column.to_string(),
                    }
                })?;
                if !local.kind.is_comparable_with(remote.kind) {
                    return Err(ConfigurationError::TypeMismatch {
                        entity: target.name.to_string(),
                        field: remote.name.to_string(),
                        declared: local.kind,
                        actual: remote.kind,
                    });
                }
            }
        }

        log::debug!("metadata registry built with {} entities", entities.len());
        Ok(Arc::new(MetadataRegistry { entities }))
    }
}

/// Validated, immutable entity metadata shared by every builder and store.
#[derive(Debug)]
pub struct MetadataRegistry {
    entities: HashMap<&'static str, Arc<EntityMeta>>,
}

impl MetadataRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn entity(&self, name: &str) -> Result<&Arc<EntityMeta>, ConfigurationError> {
        self.entities
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMeta>> {
        self.entities.values()
    }

    /// Resolve `entity.field`, checking the declared kind when one is given.
    pub fn resolve_field(
        &self,
        entity: &str,
        field: &str,
        declared: Option<ValueKind>,
    ) -> Result<&FieldMeta, ConfigurationError> {
        let meta = self.entity(entity)?;
        let found = meta
            .field(field)
            .ok_or_else(|| ConfigurationError::UnknownAttribute {
                entity: entity.to_string(),
                field: field.to_string(),
            })?;
        match declared {
            Some(kind) if kind != found.kind => Err(ConfigurationError::TypeMismatch {
                entity: entity.to_string(),
                field: field.to_string(),
                declared: kind,
                actual: found.kind,
            }),
            _ => Ok(found),
        }
    }

    /// Resolve `entity.relation`, checking the declared target when one is given.
    pub fn resolve_relation(
        &self,
        entity: &str,
        relation: &str,
        declared_target: Option<&str>,
    ) -> Result<&RelationMeta, ConfigurationError> {
        let meta = self.entity(entity)?;
        let found = meta
            .relation(relation)
            .ok_or_else(|| ConfigurationError::UnknownRelation {
                entity: entity.to_string(),
                relation: relation.to_string(),
            })?;
        match declared_target {
            Some(target) if target != found.target => Err(ConfigurationError::RelationTarget {
                entity: entity.to_string(),
                relation: relation.to_string(),
                declared: target.to_string(),
                actual: found.target.to_string(),
            }),
            _ => Ok(found),
        }
    }
}
