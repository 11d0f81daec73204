use crate::error::Result;
use crate::types::SqlValue;

/// Metadata for a named many-to-many relation, resolved through a join
/// table. Relations are looked up by name at call time; an unknown name is
/// a typed error, not a panic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationDef {
    /// Name callers use to address the relation, e.g. "tags".
    pub name: &'static str,
    /// The join table, e.g. "my_datum_tag".
    pub join_table: &'static str,
    /// Join-table column holding the owning record's key.
    pub owner_column: &'static str,
    /// Join-table column holding the related record's key.
    pub related_column: &'static str,
    /// The table on the far side of the relation.
    pub related_table: &'static str,
}

/// Trait representing a persisted record type.
/// Implementations are typically generated from schema definitions.
pub trait Model: Send + Sync {
    /// Returns the table name as it appears in the database.
    fn table_name() -> &'static str;

    /// Returns the primary key column name.
    fn key_column() -> &'static str {
        "id"
    }

    /// Returns the record's primary key value, `SqlValue::Null` when unset.
    fn key(&self) -> SqlValue;

    /// Returns the non-key columns and their current values, in declaration
    /// order. Unset columns carry `SqlValue::Null`.
    fn fields(&self) -> Vec<(&'static str, SqlValue)>;

    /// Populates the record from a result row.
    fn apply(&mut self, columns: &[String], values: &[SqlValue]) -> Result<()>;

    /// Named relations reachable from this record type.
    fn relations() -> &'static [RelationDef] {
        &[]
    }
}
