//! Compiled, store-independent query plans.
//!
//! A [`SelectPlan`] is what a [`QueryBuilder`](crate::query::QueryBuilder) compiles
//! to: every path resolved, every join bound to its table and columns, the
//! predicate validated. Stores consume plans; nothing in a plan refers back to the
//! builder or to the metadata registry.
//!
//! Sort keys that are not projected are appended to `columns` after the projected
//! ones (`projected` marks the boundary). PostgreSQL needs them in the select list
//! for `SELECT DISTINCT ... ORDER BY`, and the group merge needs them to order rows
//! across items. Callers strip them with [`SelectPlan::strip_hidden`].

use crate::attribute::{ColumnPath, ROOT_ALIAS};
use crate::condition::Condition;
use crate::join::JoinKind;
use crate::value::Value;
use sea_query::{
    Alias, Asterisk, Expr, ExprTrait, Func, Order, PostgresQueryBuilder, Query, SelectStatement,
    Values,
};
use serde::Serialize;
use std::collections::HashSet;

/// A join bound to its table and join columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedJoin {
    pub alias: String,
    pub parent_alias: String,
    pub relation: String,
    pub entity: String,
    pub table: String,
    /// Column on the parent alias
    pub local_column: String,
    /// Column on this join's table
    pub target_column: String,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderKey {
    pub path: ColumnPath,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectPlan {
    pub entity: String,
    pub table: String,
    pub joins: Vec<PlannedJoin>,
    /// Projected columns, then hidden sort columns
    pub columns: Vec<ColumnPath>,
    /// Aliases of the projected columns
    pub aliases: Vec<Option<String>>,
    pub projected: usize,
    pub condition: Option<Condition>,
    pub order: Vec<OrderKey>,
    pub distinct: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectPlan {
    /// Position of `path` among the fetched columns, hidden ones included.
    pub fn column_position(&self, path: &ColumnPath) -> Option<usize> {
        self.columns.iter().position(|c| c == path)
    }

    /// Whether this plan can only ever return zero rows.
    pub fn is_empty_by_limit(&self) -> bool {
        self.limit == Some(0)
    }

    /// Drop hidden sort columns from fetched rows.
    pub fn strip_hidden(&self, rows: &mut [Vec<Value>]) {
        if self.columns.len() == self.projected {
            return;
        }
        for row in rows.iter_mut() {
            row.truncate(self.projected);
        }
    }

    /// Whether DISTINCT in the store also compared hidden sort columns, so rows can
    /// still repeat once those are stripped.
    pub fn needs_projected_dedup(&self) -> bool {
        self.distinct && self.columns.len() > self.projected
    }

    /// Strip hidden sort columns, then drop rows that became duplicates of an
    /// earlier row. Returns the number of rows removed.
    pub fn finish_rows(&self, rows: &mut Vec<Vec<Value>>) -> usize {
        let dedup = self.needs_projected_dedup();
        self.strip_hidden(rows);
        if dedup {
            dedup_rows(rows)
        } else {
            0
        }
    }

    /// The SELECT statement for this plan.
    pub fn to_statement(&self) -> SelectStatement {
        let mut stmt = Query::select();
        stmt.from_as(Alias::new(self.table.as_str()), Alias::new(ROOT_ALIAS));

        for (i, column) in self.columns.iter().enumerate() {
            stmt.expr_as(
                Expr::col((
                    Alias::new(column.alias.as_str()),
                    Alias::new(column.field.as_str()),
                )),
                Alias::new(format!("c{i}")),
            );
        }

        for join in &self.joins {
            stmt.join_as(
                join.kind.into(),
                Alias::new(join.table.as_str()),
                Alias::new(join.alias.as_str()),
                Expr::col((
                    Alias::new(join.parent_alias.as_str()),
                    Alias::new(join.local_column.as_str()),
                ))
                .equals((
                    Alias::new(join.alias.as_str()),
                    Alias::new(join.target_column.as_str()),
                )),
            );
        }

        if let Some(condition) = &self.condition {
            stmt.cond_where(condition.to_sea_condition());
        }
        if self.distinct {
            stmt.distinct();
        }
        for key in &self.order {
            stmt.order_by(
                (
                    Alias::new(key.path.alias.as_str()),
                    Alias::new(key.path.field.as_str()),
                ),
                if key.ascending { Order::Asc } else { Order::Desc },
            );
        }
        if let Some(limit) = self.limit {
            stmt.limit(limit);
        }
        if let Some(offset) = self.offset {
            stmt.offset(offset);
        }
        stmt
    }

    /// PostgreSQL SQL and bound parameters.
    pub fn to_sql(&self) -> (String, Values) {
        self.to_statement().build(PostgresQueryBuilder)
    }

    /// `SELECT COUNT(*)` over this plan as a subquery, so distinct, limit and
    /// offset are honoured.
    pub fn count_sql(&self) -> (String, Values) {
        let mut stmt = Query::select();
        stmt.expr(Func::count(Expr::col(Asterisk)))
            .from_subquery(self.to_statement(), Alias::new("counted"));
        stmt.build(PostgresQueryBuilder)
    }
}

/// Order-preserving dedup by full cell equality; the first occurrence wins.
/// Returns the number of rows removed.
pub(crate) fn dedup_rows(rows: &mut Vec<Vec<Value>>) -> usize {
    let before = rows.len();
    let mut seen = HashSet::with_capacity(before);
    rows.retain(|row| seen.insert(row.clone()));
    before - rows.len()
}
