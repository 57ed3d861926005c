//! Positional, aliased row shapes.
//!
//! A [`ProjectionSpec`] is the ordered list of projected paths. Positions are
//! assigned in first-registration order and registration is idempotent, so shared
//! setup code may register the same attribute any number of times without moving
//! any column. Once frozen, the shape can no longer grow.
//!
//! Every [`TupleRow`] produced under one projection shares its [`RowShape`].

use crate::attribute::ColumnPath;
use crate::error::ConfigurationError;
use crate::value::Value;
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One projected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub path: ColumnPath,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionSpec {
    selections: Vec<Selection>,
    frozen: bool,
}

impl ProjectionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, returning its position.
    ///
    /// Re-registering a known path returns the existing position; an alias given
    /// on re-registration is attached only if the column had none.
    ///
    /// # Errors
    ///
    /// - `DuplicateAlias` if another column already uses `alias`
    /// - `ProjectionFrozen` if the projection is frozen and `path` is new or
    ///   would gain an alias
    pub fn register(
        &mut self,
        path: ColumnPath,
        alias: Option<String>,
    ) -> Result<usize, ConfigurationError> {
        if let Some(pos) = self.position(&path) {
            if let Some(alias) = alias {
                match &self.selections[pos].alias {
                    Some(existing) if *existing == alias => {}
                    Some(existing) => {
                        log::debug!(
                            "keeping alias '{existing}' for {path}, ignoring '{alias}'"
                        );
                    }
                    None if self.frozen => {
                        return Err(ConfigurationError::ProjectionFrozen(format!(
                            "{path} as {alias}"
                        )));
                    }
                    None => {
                        self.check_alias(&alias)?;
                        self.selections[pos].alias = Some(alias);
                    }
                }
            }
            return Ok(pos);
        }

        if self.frozen {
            return Err(ConfigurationError::ProjectionFrozen(path.to_string()));
        }
        if let Some(alias) = &alias {
            self.check_alias(alias)?;
        }
        self.selections.push(Selection { path, alias });
        Ok(self.selections.len() - 1)
    }

    fn check_alias(&self, alias: &str) -> Result<(), ConfigurationError> {
        if self.position_of_alias(alias).is_some() {
            return Err(ConfigurationError::DuplicateAlias(alias.to_string()));
        }
        Ok(())
    }

    pub fn position(&self, path: &ColumnPath) -> Option<usize> {
        self.selections.iter().position(|s| &s.path == path)
    }

    pub fn position_of_alias(&self, alias: &str) -> Option<usize> {
        self.selections
            .iter()
            .position(|s| s.alias.as_deref() == Some(alias))
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn shape(&self) -> Arc<RowShape> {
        Arc::new(RowShape {
            aliases: self.selections.iter().map(|s| s.alias.clone()).collect(),
        })
    }
}

/// Column aliases of a row, by position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowShape {
    aliases: Vec<Option<String>>,
}

impl RowShape {
    pub fn new(aliases: Vec<Option<String>>) -> Self {
        Self { aliases }
    }

    pub fn position(&self, alias: &str) -> Option<usize> {
        self.aliases.iter().position(|a| a.as_deref() == Some(alias))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// A fixed-width projected row.
///
/// Equality and hashing cover the cells only.
#[derive(Debug, Clone)]
pub struct TupleRow {
    cells: Vec<Value>,
    shape: Arc<RowShape>,
}

impl TupleRow {
    pub fn new(cells: Vec<Value>, shape: Arc<RowShape>) -> Self {
        Self { cells, shape }
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.cells.get(position)
    }

    /// Cell under `alias`; `None` when no column carries that alias.
    pub fn get_alias(&self, alias: &str) -> Option<&Value> {
        self.shape.position(alias).and_then(|pos| self.cells.get(pos))
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Value> {
        self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl PartialEq for TupleRow {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Eq for TupleRow {}

impl Hash for TupleRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cells.hash(state);
    }
}
