mod connector;
mod model;

pub use connector::{Connection, Connector};
pub use model::{Model, RelationDef};
