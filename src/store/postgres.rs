//! PostgreSQL store over a fixed pool of `may_postgres` clients.
//!
//! Each `fetch`/`count` checks one client out of the pool for the duration of the
//! call, so concurrent group items never share a session. Checkout waits at most
//! `pool_timeout_seconds` before failing with [`QueryError::PoolTimeout`].
//!
//! Plans are rendered with sea-query's `PostgresQueryBuilder`; bound values are
//! converted to boxed `ToSql` parameters and result cells are decoded by the
//! [`ValueKind`] of the column they were selected from.

use crate::config::DatabaseConfig;
use crate::error::QueryError;
use crate::query::plan::SelectPlan;
use crate::store::QueryStore;
use crate::value::{Value, ValueKind};
use chrono::{NaiveDate, NaiveDateTime};
use crossbeam_channel::{bounded, Receiver, Sender};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct PostgresStore {
    idle_tx: Sender<Client>,
    idle_rx: Receiver<Client>,
    size: usize,
    timeout_seconds: u64,
}

impl PostgresStore {
    /// Open `max_connections` clients to `config.url`.
    ///
    /// # Errors
    ///
    /// `QueryError::Connection` for an invalid URL or pool size,
    /// `QueryError::Postgres` if a connection cannot be established.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, QueryError> {
        validate_connection_string(&config.url)?;
        if config.max_connections == 0 {
            return Err(QueryError::Connection(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let start = Instant::now();
        let mut clients = Vec::with_capacity(config.max_connections);
        for _ in 0..config.max_connections {
            clients.push(may_postgres::connect(&config.url)?);
        }
        log::debug!(
            "opened {} PostgreSQL connections in {:?}",
            clients.len(),
            start.elapsed()
        );
        Ok(Self::from_clients(clients, config.pool_timeout_seconds))
    }

    /// Pool already-open clients.
    pub fn from_clients(clients: Vec<Client>, timeout_seconds: u64) -> Self {
        let size = clients.len();
        let (idle_tx, idle_rx) = bounded(size.max(1));
        for client in clients {
            // Capacity covers every client.
            let _ = idle_tx.send(client);
        }
        Self {
            idle_tx,
            idle_rx,
            size,
            timeout_seconds,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    fn checkout(&self) -> Result<PooledClient<'_>, QueryError> {
        let client = self
            .idle_rx
            .recv_timeout(Duration::from_secs(self.timeout_seconds))
            .map_err(|_| QueryError::PoolTimeout(self.timeout_seconds))?;
        Ok(PooledClient {
            client: Some(client),
            pool: &self.idle_tx,
        })
    }

    /// Run `sql` with `values` bound, on a pooled client.
    fn query(&self, sql: &str, values: &sea_query::Values) -> Result<Vec<Row>, QueryError> {
        let params = convert_params(values)?;
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
        let pooled = self.checkout()?;
        log::debug!("executing: {sql}");
        Ok(pooled.client()?.query(sql, &refs)?)
    }
}

impl QueryStore for PostgresStore {
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        let (sql, values) = plan.to_sql();
        let rows = self.query(&sql, &values)?;
        let kinds: Vec<ValueKind> = plan.columns.iter().map(|c| c.kind).collect();
        rows.iter().map(|row| decode_row(row, &kinds)).collect()
    }

    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError> {
        let (sql, values) = plan.count_sql();
        let rows = self.query(&sql, &values)?;
        let row = rows
            .first()
            .ok_or_else(|| QueryError::Execution("COUNT(*) returned no row".to_string()))?;
        let count: i64 = row.try_get(0)?;
        u64::try_from(count).map_err(|_| QueryError::Decode(format!("negative count {count}")))
    }
}

/// A checked-out client, returned to the pool on drop.
struct PooledClient<'a> {
    client: Option<Client>,
    pool: &'a Sender<Client>,
}

impl PooledClient<'_> {
    fn client(&self) -> Result<&Client, QueryError> {
        self.client
            .as_ref()
            .ok_or_else(|| QueryError::Connection("pooled client already released".to_string()))
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if self.pool.send(client).is_err() {
                log::warn!("connection pool closed, dropping client");
            }
        }
    }
}

/// Check that a connection string is in URI (`postgresql://user@host/db`) or
/// key-value (`host=... user=...`) form.
pub fn validate_connection_string(connection_string: &str) -> Result<(), QueryError> {
    if connection_string.is_empty() {
        return Err(QueryError::Connection(
            "Connection string cannot be empty".to_string(),
        ));
    }

    let is_uri_format = connection_string.starts_with("postgresql://")
        || connection_string.starts_with("postgres://");
    let is_key_value_format = connection_string.contains('=');

    if !is_uri_format && !is_key_value_format {
        return Err(QueryError::Connection(
            "Connection string must be in URI format (postgresql://...) or key-value format (host=...)".to_string(),
        ));
    }
    if is_uri_format && !connection_string.contains('@') {
        return Err(QueryError::Connection(
            "URI format connection string must contain '@' to separate credentials from host"
                .to_string(),
        ));
    }
    Ok(())
}

/// Convert sea-query values into owned `ToSql` parameters.
///
/// Only the value kinds this crate produces are accepted; nulls keep their type
/// so PostgreSQL can infer the parameter type.
pub(crate) fn convert_params(
    values: &sea_query::Values,
) -> Result<Vec<Box<dyn ToSql + Sync>>, QueryError> {
    use sea_query::Value as SeaValue;

    values
        .iter()
        .map(|value| -> Result<Box<dyn ToSql + Sync>, QueryError> {
            let param: Box<dyn ToSql + Sync> = match value {
                SeaValue::Bool(v) => Box::new(*v),
                SeaValue::Int(v) => Box::new(*v),
                SeaValue::BigInt(v) => Box::new(*v),
                SeaValue::BigUnsigned(Some(u)) => {
                    let v = i64::try_from(*u).map_err(|_| {
                        QueryError::Execution(format!(
                            "BigUnsigned value {u} exceeds i64::MAX, cannot be bound"
                        ))
                    })?;
                    Box::new(v)
                }
                SeaValue::BigUnsigned(None) => Box::new(None::<i64>),
                SeaValue::Double(v) => Box::new(*v),
                SeaValue::String(v) => Box::new(v.as_ref().map(|s| String::clone(s))),
                SeaValue::Uuid(v) => Box::new(v.as_ref().map(|u| Uuid::clone(u))),
                SeaValue::ChronoDate(v) => Box::new(v.as_ref().map(|d| NaiveDate::clone(d))),
                SeaValue::ChronoDateTime(v) => {
                    Box::new(v.as_ref().map(|t| NaiveDateTime::clone(t)))
                }
                other => {
                    return Err(QueryError::Execution(format!(
                        "unsupported parameter value: {other:?}"
                    )))
                }
            };
            Ok(param)
        })
        .collect()
}

fn decode_row(row: &Row, kinds: &[ValueKind]) -> Result<Vec<Value>, QueryError> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| decode_cell(row, i, *kind))
        .collect()
}

fn decode_cell(row: &Row, index: usize, kind: ValueKind) -> Result<Value, QueryError> {
    let decoded = match kind {
        ValueKind::Bool => row.try_get::<_, Option<bool>>(index).map(Value::Bool),
        ValueKind::Int => row.try_get::<_, Option<i32>>(index).map(Value::Int),
        ValueKind::BigInt => row.try_get::<_, Option<i64>>(index).map(Value::BigInt),
        ValueKind::Double => row.try_get::<_, Option<f64>>(index).map(Value::Double),
        ValueKind::String => row.try_get::<_, Option<String>>(index).map(Value::String),
        ValueKind::Uuid => row.try_get::<_, Option<Uuid>>(index).map(Value::Uuid),
        ValueKind::Date => row.try_get::<_, Option<NaiveDate>>(index).map(Value::Date),
        ValueKind::Timestamp => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map(Value::Timestamp),
    };
    decoded.map_err(|e| QueryError::Decode(format!("column {index} as {kind}: {e}")))
}
