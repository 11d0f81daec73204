use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// Trait for backend connectors.
/// A connector knows how to turn one connection descriptor into a live
/// connection. The rotator decides which descriptor to dial and when.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a connection from the given descriptor.
    async fn connect(&self, descriptor: &str) -> Result<Arc<dyn Connection>>;
}

/// Trait for live backend connections.
/// Implementations are responsible for:
/// - Converting SqlValue parameters to native types
/// - Executing statements and converting results to RawQueryResult
///
/// Statements use PostgreSQL-style placeholders ($1, $2, etc.).
/// Transaction control (`BEGIN`/`COMMIT`/`ROLLBACK`) arrives through
/// `execute` like any other statement.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute a query, returning all resulting rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;
}
