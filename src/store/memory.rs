//! In-process store.
//!
//! Tables are vectors of rows keyed by entity name, each row holding one cell per
//! field in metadata order. Plans are evaluated with SQL semantics: joins (inner
//! joins drop unmatched rows, left joins pad them with nulls), three-valued
//! predicate logic, `LIKE` with `%`/`_` wildcards and `\` escapes, ordering with
//! PostgreSQL null placement, `DISTINCT` keeping first occurrences, then
//! offset and limit.

use crate::attribute::{Attribute, ColumnPath, ROOT_ALIAS};
use crate::condition::{Condition, Operand, Operator, Predicate};
use crate::error::{ConfigurationError, QueryError};
use crate::join::JoinKind;
use crate::metadata::{Entity, EntityMeta, MetadataRegistry};
use crate::query::plan::SelectPlan;
use crate::store::QueryStore;
use crate::value::{Value, ValueType};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock};

/// A row being prepared for [`MemoryStore::insert`]. Unset fields are null.
pub struct NewRow<E> {
    meta: EntityMeta,
    cells: Vec<Value>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> NewRow<E> {
    pub fn new() -> Self {
        let meta = E::meta();
        let cells = meta.fields.iter().map(|f| Value::null(f.kind)).collect();
        Self {
            meta,
            cells,
            _marker: PhantomData,
        }
    }

    pub fn set<V: ValueType, T: Into<V>>(mut self, attribute: Attribute<E, V>, value: T) -> Self {
        if let Some(i) = self.meta.field_index(attribute.name()) {
            self.cells[i] = value.into().into_value();
        }
        self
    }
}

impl<E: Entity> Default for NewRow<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    registry: Arc<MetadataRegistry>,
    tables: RwLock<HashMap<String, Vec<Vec<Value>>>>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            tables: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Append a row to `E`'s table.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `E` is not registered, `NullOperand` if a non-nullable
    /// field was left unset.
    pub fn insert<E: Entity>(&self, row: NewRow<E>) -> Result<(), ConfigurationError> {
        let meta = self.registry.entity(E::NAME)?;
        for (field, cell) in meta.fields.iter().zip(&row.cells) {
            if !field.nullable && cell.is_null() {
                return Err(ConfigurationError::NullOperand {
                    field: format!("{}.{}", E::NAME, field.name),
                    operator: "insert".to_string(),
                });
            }
        }
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(E::NAME.to_string())
            .or_default()
            .push(row.cells);
        Ok(())
    }

    /// Number of `fetch`/`count` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    pub fn row_count(&self, entity: &str) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .map_or(0, Vec::len)
    }

    fn evaluate(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let referenced =
            std::iter::once(plan.entity.as_str()).chain(plan.joins.iter().map(|j| j.entity.as_str()));
        for entity in referenced {
            if self.registry.entity(entity).is_err() {
                return Err(QueryError::Execution(format!(
                    "relation for entity \"{entity}\" does not exist"
                )));
            }
        }
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let empty = Vec::new();
        let resolver = Resolver::new(&self.registry, plan);

        // One slot per alias: t0, then each join in order.
        let mut contexts: Vec<Vec<Option<&Vec<Value>>>> = tables
            .get(&plan.entity)
            .unwrap_or(&empty)
            .iter()
            .map(|row| vec![Some(row)])
            .collect();

        for join in &plan.joins {
            let parent = resolver.slot(&join.parent_alias)?;
            let local = resolver.field_index(resolver.entity_of(parent), &join.local_column)?;
            let target = resolver.field_index(&join.entity, &join.target_column)?;
            let rows = tables.get(&join.entity).unwrap_or(&empty);

            let mut next = Vec::with_capacity(contexts.len());
            for context in contexts {
                let key = context[parent].map(|row| &row[local]);
                let matches: Vec<&Vec<Value>> = match key {
                    Some(key) => rows
                        .iter()
                        .filter(|row| key.sql_cmp(&row[target]) == Some(Ordering::Equal))
                        .collect(),
                    None => Vec::new(),
                };
                if matches.is_empty() {
                    if join.kind == JoinKind::Left {
                        let mut padded = context;
                        padded.push(None);
                        next.push(padded);
                    }
                    continue;
                }
                for row in matches {
                    let mut extended = context.clone();
                    extended.push(Some(row));
                    next.push(extended);
                }
            }
            contexts = next;
        }

        let mut rows = Vec::new();
        for context in &contexts {
            if let Some(condition) = &plan.condition {
                if eval(condition, &resolver, context)? != Some(true) {
                    continue;
                }
            }
            let cells = plan
                .columns
                .iter()
                .map(|path| resolver.cell(context, path))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(cells);
        }

        if !plan.order.is_empty() {
            let keys = plan
                .order
                .iter()
                .map(|key| {
                    plan.column_position(&key.path)
                        .map(|pos| (pos, key.ascending))
                        .ok_or_else(|| {
                            QueryError::Execution(format!("sort column {} is not fetched", key.path))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.sort_by(|a, b| {
                keys.iter()
                    .map(|&(pos, ascending)| {
                        let ord = a[pos].sort_cmp(&b[pos]);
                        if ascending {
                            ord
                        } else {
                            ord.reverse()
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        if plan.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(row.clone()));
        }

        let offset = plan.offset.unwrap_or(0) as usize;
        let limit = plan.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

impl QueryStore for MemoryStore {
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        self.evaluate(plan)
    }

    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError> {
        Ok(self.evaluate(plan)?.len() as u64)
    }
}

/// Maps plan aliases to context slots and field names to cell indexes.
struct Resolver<'a> {
    registry: &'a MetadataRegistry,
    slots: Vec<(&'a str, &'a str)>,
}

impl<'a> Resolver<'a> {
    fn new(registry: &'a MetadataRegistry, plan: &'a SelectPlan) -> Self {
        let mut slots = vec![(ROOT_ALIAS, plan.entity.as_str())];
        slots.extend(
            plan.joins
                .iter()
                .map(|j| (j.alias.as_str(), j.entity.as_str())),
        );
        Self { registry, slots }
    }

    fn slot(&self, alias: &str) -> Result<usize, QueryError> {
        self.slots
            .iter()
            .position(|(a, _)| *a == alias)
            .ok_or_else(|| QueryError::Execution(format!("unknown alias {alias}")))
    }

    fn entity_of(&self, slot: usize) -> &'a str {
        self.slots[slot].1
    }

    fn field_index(&self, entity: &str, field: &str) -> Result<usize, QueryError> {
        self.registry
            .entity(entity)
            .ok()
            .and_then(|meta| meta.field_index(field))
            .ok_or_else(|| QueryError::Execution(format!("unknown column {entity}.{field}")))
    }

    fn cell(&self, context: &[Option<&Vec<Value>>], path: &ColumnPath) -> Result<Value, QueryError> {
        let slot = self.slot(&path.alias)?;
        let index = self.field_index(&path.entity, &path.field)?;
        Ok(match context.get(slot).copied().flatten() {
            Some(row) => row[index].clone(),
            None => Value::null(path.kind),
        })
    }
}

/// SQL three-valued evaluation: `None` is UNKNOWN.
fn eval(
    condition: &Condition,
    resolver: &Resolver<'_>,
    context: &[Option<&Vec<Value>>],
) -> Result<Option<bool>, QueryError> {
    Ok(match condition {
        Condition::And(items) => {
            let mut result = Some(true);
            for item in items {
                match eval(item, resolver, context)? {
                    Some(false) => return Ok(Some(false)),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Condition::Or(items) => {
            let mut result = Some(false);
            for item in items {
                match eval(item, resolver, context)? {
                    Some(true) => return Ok(Some(true)),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Condition::Not(inner) => eval(inner, resolver, context)?.map(|b| !b),
        Condition::Leaf(leaf) => eval_leaf(leaf, &resolver.cell(context, &leaf.path)?),
    })
}

fn eval_leaf(leaf: &Predicate, cell: &Value) -> Option<bool> {
    match (leaf.operator, &leaf.operand) {
        (Operator::IsNull, _) => Some(cell.is_null()),
        (Operator::IsNotNull, _) => Some(!cell.is_null()),
        (Operator::In, Operand::List(values)) => {
            if values.is_empty() {
                return Some(false);
            }
            if cell.is_null() {
                return None;
            }
            Some(
                values
                    .iter()
                    .any(|v| cell.sql_cmp(v) == Some(Ordering::Equal)),
            )
        }
        (Operator::Like, Operand::Value(pattern)) => match (cell.as_str(), pattern.as_str()) {
            (Some(text), Some(pattern)) => Some(like_match(text, pattern)),
            _ => None,
        },
        (op, Operand::Value(value)) => {
            let ord = cell.sql_cmp(value)?;
            Some(match op {
                Operator::Eq => ord == Ordering::Equal,
                Operator::Ne => ord != Ordering::Equal,
                Operator::Lt => ord == Ordering::Less,
                Operator::Lte => ord != Ordering::Greater,
                Operator::Gt => ord == Ordering::Greater,
                Operator::Gte => ord != Ordering::Less,
                _ => return None,
            })
        }
        _ => None,
    }
}

enum LikeToken {
    Any,
    One,
    Char(char),
}

/// SQL `LIKE`: `%` matches any run, `_` one character, `\` escapes the next one.
pub(crate) fn like_match(text: &str, pattern: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => LikeToken::Char(chars.next().unwrap_or('\\')),
            c => LikeToken::Char(c),
        });
    }
    let text: Vec<char> = text.chars().collect();

    // matched[j]: the first i text chars match the first j tokens
    let mut matched = vec![false; tokens.len() + 1];
    matched[0] = true;
    for (j, token) in tokens.iter().enumerate() {
        if matches!(token, LikeToken::Any) {
            matched[j + 1] = matched[j];
        }
    }
    for &ch in &text {
        let mut next = vec![false; tokens.len() + 1];
        for (j, token) in tokens.iter().enumerate() {
            next[j + 1] = match token {
                LikeToken::Any => next[j] || matched[j + 1],
                LikeToken::One => matched[j],
                LikeToken::Char(c) => matched[j] && *c == ch,
            };
        }
        matched = next;
    }
    matched[tokens.len()]
}
