use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::{types::ToSql, Client, NoTls};
use tracing::error;

use crate::error::{ReporsError, Result};
use crate::traits::{Connection, Connector};
use crate::types::{RawQueryResult, SqlValue};

/// Connector dialing PostgreSQL using tokio-postgres.
#[derive(Debug, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, descriptor: &str) -> Result<Arc<dyn Connection>> {
        let (client, connection) = tokio_postgres::connect(descriptor, NoTls)
            .await
            .map_err(|e| ReporsError::Connection(e.to_string()))?;

        // Drive the connection until it closes.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection ended");
            }
        });

        Ok(Arc::new(PostgresConnection { client }))
    }
}

/// A live PostgreSQL connection.
pub struct PostgresConnection {
    client: Client,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let converted = convert_params(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> = converted
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(sql, &param_refs)
            .await
            .map_err(|e| ReporsError::Backend(e.to_string()))
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let converted = convert_params(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> = converted
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client
            .query(sql, &param_refs)
            .await
            .map_err(|e| ReporsError::Backend(e.to_string()))?;

        let columns: Vec<String> = if rows.is_empty() {
            Vec::new()
        } else {
            rows[0]
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        };

        let result_rows: Vec<Vec<SqlValue>> = rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|i| cell_value(row, i)).collect())
            .collect();

        Ok(RawQueryResult::new(columns, result_rows))
    }
}

/// Convert SqlValue params to boxed ToSql trait objects.
fn convert_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params.iter().map(sql_value_to_tosql).collect()
}

fn sql_value_to_tosql(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(None::<String>),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float(f) => Box::new(*f),
        SqlValue::Bool(b) => Box::new(*b),
    }
}

/// Convert the cell at a given index to a SqlValue.
/// Probes the common types through `Option` so NULL survives as
/// `SqlValue::Null`; column types outside the mapped set also land on
/// `SqlValue::Null`.
fn cell_value(row: &tokio_postgres::Row, index: usize) -> SqlValue {
    if let Ok(val) = row.try_get::<_, Option<bool>>(index) {
        return val.into();
    }
    if let Ok(val) = row.try_get::<_, Option<i32>>(index) {
        return val.into();
    }
    if let Ok(val) = row.try_get::<_, Option<i64>>(index) {
        return val.into();
    }
    if let Ok(val) = row.try_get::<_, Option<f64>>(index) {
        return val.into();
    }
    if let Ok(val) = row.try_get::<_, Option<String>>(index) {
        return val.into();
    }
    SqlValue::Null
}
