//! repors - A resilient, backend-agnostic repository layer
//!
//! Wraps persistence operations in connection-string rotation, transient-
//! error retry with linear backoff, transactional multi-record writes, and
//! a raw-query facility that unpacks rows into caller-chosen shapes.
//!
//! # Example
//! ```ignore
//! use repors::{DriverConfig, Model, RepositoryDriver, SqlValue};
//!
//! // Rotate new connections across two replicas.
//! let driver = RepositoryDriver::postgres(
//!     vec![
//!         "host=db1 dbname=app".to_string(),
//!         "host=db2 dbname=app".to_string(),
//!     ],
//!     DriverConfig::default(),
//! )?;
//!
//! let mut datum = MyDatum::named("io");
//! let created = driver.get_or_create(&mut datum).await?;
//!
//! let mut names: Vec<String> = Vec::new();
//! driver
//!     .raw((&mut names).into(), "SELECT name FROM my_datum", &[])
//!     .await?;
//! ```

pub mod backends;
pub mod error;
pub mod raw;
pub mod retry;
pub mod rotator;
pub mod traits;
pub mod types;

mod driver;
mod statements;

// Re-export main types for convenient access
pub use driver::{DriverConfig, RepositoryDriver, DEFAULT_RETRY_LIMIT};
pub use error::{merge, ReporsError, Result};
pub use raw::RawDest;
pub use rotator::ConnectionRotator;
pub use traits::{Connection, Connector, Model, RelationDef};
pub use types::{RawQueryResult, SqlValue};
