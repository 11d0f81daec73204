mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryBackend, RecordedStatement, ResponseBuilder, ScriptedResponse,
};
pub use self::tokio_postgres::{PostgresConnection, PostgresConnector};
