//! Immutable boolean predicate trees.
//!
//! A [`Condition`] is a sum type of `And`/`Or`/`Not` nodes over [`Predicate`]
//! leaves. Composition never mutates an operand: [`Condition::and`],
//! [`Condition::or`] and [`Condition::not`] return new nodes, flattening nested
//! nodes of the same kind. Trees compare structurally and serialize with serde, so
//! they can be asserted on without a live store.
//!
//! Null handling: a null operand on `Eq`, `Ne`, `Like`, a comparison, or inside an
//! `In` list is rejected by [`Condition::validate`]; use [`Operator::IsNull`] /
//! [`Operator::IsNotNull`] leaves to test for null.

use crate::attribute::ColumnPath;
use crate::error::ConfigurationError;
use crate::value::Value;
use sea_query::{Alias, Expr, ExprTrait};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Like,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    IsNull,
    IsNotNull,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Like => "LIKE",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// For `IsNull` / `IsNotNull`
    None,
    Value(Value),
    /// For `In`
    List(Vec<Value>),
}

/// A leaf: `path operator operand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub path: ColumnPath,
    pub operator: Operator,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Leaf(Predicate),
}

impl Condition {
    pub fn leaf(path: ColumnPath, operator: Operator, operand: Operand) -> Self {
        Condition::Leaf(Predicate {
            path,
            operator,
            operand,
        })
    }

    pub fn compare(path: ColumnPath, operator: Operator, value: Value) -> Self {
        Self::leaf(path, operator, Operand::Value(value))
    }

    /// Conjunction of all conditions. An empty list is always true.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        conditions
            .into_iter()
            .fold(Condition::And(Vec::new()), |acc, c| acc.and(c))
    }

    /// Disjunction of all conditions. An empty list is always false.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        conditions
            .into_iter()
            .fold(Condition::Or(Vec::new()), |acc, c| acc.or(c))
    }

    pub fn and(&self, other: Condition) -> Condition {
        let mut items = match self {
            Condition::And(items) => items.clone(),
            single => vec![single.clone()],
        };
        match other {
            Condition::And(more) => items.extend(more),
            single => items.push(single),
        }
        Condition::And(items)
    }

    pub fn or(&self, other: Condition) -> Condition {
        let mut items = match self {
            Condition::Or(items) => items.clone(),
            single => vec![single.clone()],
        };
        match other {
            Condition::Or(more) => items.extend(more),
            single => items.push(single),
        }
        Condition::Or(items)
    }

    pub fn not(&self) -> Condition {
        match self {
            Condition::Not(inner) => (**inner).clone(),
            other => Condition::Not(Box::new(other.clone())),
        }
    }

    /// Every attribute path referenced by this tree, leaves in order.
    pub fn paths(&self) -> Vec<&ColumnPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a ColumnPath>) {
        match self {
            Condition::And(items) | Condition::Or(items) => {
                items.iter().for_each(|c| c.collect_paths(out))
            }
            Condition::Not(inner) => inner.collect_paths(out),
            Condition::Leaf(leaf) => out.push(&leaf.path),
        }
    }

    /// Check operand shapes, null usage and operand kinds.
    ///
    /// # Errors
    ///
    /// - `NullOperand` for a null compared with anything but `IsNull`/`IsNotNull`
    /// - `TypeMismatch` for an operand whose kind is not comparable with the path
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Condition::And(items) | Condition::Or(items) => {
                items.iter().try_for_each(Condition::validate)
            }
            Condition::Not(inner) => inner.validate(),
            Condition::Leaf(leaf) => leaf.validate(),
        }
    }

    /// Render as a sea-query condition over the query's table aliases.
    pub fn to_sea_condition(&self) -> sea_query::Condition {
        match self {
            Condition::And(items) => items
                .iter()
                .fold(sea_query::Condition::all(), |acc, c| acc.add(c.to_sea_condition())),
            Condition::Or(items) if items.is_empty() => {
                sea_query::Condition::all().add(Expr::cust("FALSE"))
            }
            Condition::Or(items) => items
                .iter()
                .fold(sea_query::Condition::any(), |acc, c| acc.add(c.to_sea_condition())),
            Condition::Not(inner) => inner.to_sea_condition().not(),
            Condition::Leaf(leaf) => sea_query::Condition::all().add(leaf.to_sea_expr()),
        }
    }
}

impl Predicate {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let null_operand = || ConfigurationError::NullOperand {
            field: self.path.to_string(),
            operator: self.operator.to_string(),
        };
        let check_kind = |value: &Value| {
            if self.path.kind.is_comparable_with(value.kind()) {
                Ok(())
            } else {
                Err(ConfigurationError::TypeMismatch {
                    entity: self.path.entity.clone(),
                    field: self.path.field.clone(),
                    declared: value.kind(),
                    actual: self.path.kind,
                })
            }
        };

        match (self.operator, &self.operand) {
            (Operator::IsNull | Operator::IsNotNull, Operand::None) => Ok(()),
            (Operator::In, Operand::List(values)) => {
                if values.iter().any(Value::is_null) {
                    return Err(null_operand());
                }
                values.iter().try_for_each(check_kind)
            }
            (Operator::In | Operator::IsNull | Operator::IsNotNull, _) => {
                Err(ConfigurationError::NullOperand {
                    field: self.path.to_string(),
                    operator: format!("{} with a mismatched operand", self.operator),
                })
            }
            (_, Operand::Value(value)) if value.is_null() => Err(null_operand()),
            (Operator::Like, Operand::Value(value)) => {
                if value.as_str().is_some() {
                    check_kind(value)
                } else {
                    Err(ConfigurationError::TypeMismatch {
                        entity: self.path.entity.clone(),
                        field: self.path.field.clone(),
                        declared: value.kind(),
                        actual: self.path.kind,
                    })
                }
            }
            (_, Operand::Value(value)) => check_kind(value),
            (_, _) => Err(null_operand()),
        }
    }

    fn to_sea_expr(&self) -> Expr {
        let col = Expr::col((
            Alias::new(self.path.alias.as_str()),
            Alias::new(self.path.field.as_str()),
        ));
        match (self.operator, &self.operand) {
            (Operator::IsNull, _) => col.is_null(),
            (Operator::IsNotNull, _) => col.is_not_null(),
            (Operator::In, Operand::List(values)) => {
                col.is_in(values.iter().map(Value::to_sea_value).collect::<Vec<_>>())
            }
            (Operator::Like, Operand::Value(value)) => {
                col.like(value.as_str().unwrap_or_default().to_string())
            }
            (op, Operand::Value(value)) => {
                let value = value.to_sea_value();
                match op {
                    Operator::Ne => col.ne(value),
                    Operator::Lt => col.lt(value),
                    Operator::Lte => col.lte(value),
                    Operator::Gt => col.gt(value),
                    Operator::Gte => col.gte(value),
                    _ => col.eq(value),
                }
            }
            // Rejected by validate() before rendering.
            _ => Expr::cust("FALSE"),
        }
    }
}
