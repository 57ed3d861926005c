//! Immutable snapshot of a configured query group.

use crate::config::QueryConfig;
use crate::projection::RowShape;
use crate::query::plan::{OrderKey, SelectPlan};
use serde::Serialize;
use std::sync::Arc;

/// Everything [`execute_group`](crate::group::execute_group) needs: one compiled
/// plan per item (in registration order), the shared row shape, and the
/// group-level ordering and distinct flag applied by the merge.
#[derive(Debug, Clone, Serialize)]
pub struct QueryGroupSpec {
    pub entity: String,
    pub plans: Vec<SelectPlan>,
    #[serde(skip)]
    pub shape: Arc<RowShape>,
    /// Projected cells per row
    pub width: usize,
    pub order: Vec<OrderKey>,
    pub distinct: bool,
}

impl QueryGroupSpec {
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// How item plans are fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum item plans in flight; `1` runs them inline on the caller
    pub max_parallel: usize,
    /// Stack size of worker coroutines, in bytes
    pub stack_size: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::from(&QueryConfig::default())
    }
}

impl From<&QueryConfig> for ExecutionOptions {
    fn from(config: &QueryConfig) -> Self {
        Self {
            max_parallel: config.max_parallel_items.max(1),
            stack_size: config.coroutine_stack_size,
        }
    }
}

impl ExecutionOptions {
    pub fn sequential() -> Self {
        Self {
            max_parallel: 1,
            ..Self::default()
        }
    }
}
