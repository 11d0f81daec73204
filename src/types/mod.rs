mod result;
mod sql_value;

pub use result::RawQueryResult;
pub use sql_value::SqlValue;
