//! SQL text construction for the structured operations.
//!
//! Statements use PostgreSQL-style placeholders ($1, $2, ...). Builders
//! return the SQL string together with the parameter vector so callers
//! never interpolate values into the text.

use crate::types::SqlValue;

/// INSERT INTO table (cols...) VALUES ($1, ...), optionally RETURNING *.
/// An empty field list inserts default values.
pub(crate) fn insert(
    table: &str,
    fields: &[(&'static str, SqlValue)],
    returning: bool,
) -> (String, Vec<SqlValue>) {
    let mut sql = String::with_capacity(128);
    let mut params = Vec::with_capacity(fields.len());

    sql.push_str("INSERT INTO ");
    sql.push_str(table);
    if fields.is_empty() {
        sql.push_str(" DEFAULT VALUES");
    } else {
        sql.push_str(" (");
        for (i, (column, _)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column);
        }
        sql.push_str(") VALUES (");
        for (i, (_, value)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            params.push(value.clone());
            sql.push('$');
            sql.push_str(&params.len().to_string());
        }
        sql.push(')');
    }
    if returning {
        sql.push_str(" RETURNING *");
    }

    (sql, params)
}

/// INSERT ... ON CONFLICT (key) DO UPDATE, so a save of a keyed record
/// lands as create-or-update in one statement.
pub(crate) fn upsert(
    table: &str,
    key_column: &str,
    key: SqlValue,
    fields: &[(&'static str, SqlValue)],
) -> (String, Vec<SqlValue>) {
    let mut sql = String::with_capacity(192);
    let mut params = Vec::with_capacity(fields.len() + 1);

    sql.push_str("INSERT INTO ");
    sql.push_str(table);
    sql.push_str(" (");
    sql.push_str(key_column);
    for (column, _) in fields {
        sql.push_str(", ");
        sql.push_str(column);
    }
    sql.push_str(") VALUES (");
    params.push(key);
    sql.push_str("$1");
    for (_, value) in fields {
        params.push(value.clone());
        sql.push_str(", $");
        sql.push_str(&params.len().to_string());
    }
    sql.push_str(") ON CONFLICT (");
    sql.push_str(key_column);
    if fields.is_empty() {
        sql.push_str(") DO NOTHING");
    } else {
        sql.push_str(") DO UPDATE SET ");
        for (i, (column, _)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column);
            sql.push_str(" = EXCLUDED.");
            sql.push_str(column);
        }
    }

    (sql, params)
}

/// UPDATE table SET assignments WHERE template. An empty template updates
/// every row, exactly as a template with no constraints reads.
pub(crate) fn update(
    table: &str,
    assignments: &[(&'static str, SqlValue)],
    template: &[(&'static str, SqlValue)],
) -> (String, Vec<SqlValue>) {
    let mut sql = String::with_capacity(128);
    let mut params = Vec::with_capacity(assignments.len() + template.len());

    sql.push_str("UPDATE ");
    sql.push_str(table);
    sql.push_str(" SET ");
    for (i, (column, value)) in assignments.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        params.push(value.clone());
        sql.push_str(column);
        sql.push_str(" = $");
        sql.push_str(&params.len().to_string());
    }
    if !template.is_empty() {
        sql.push_str(" WHERE ");
        for (i, (column, value)) in template.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            params.push(value.clone());
            sql.push_str(column);
            sql.push_str(" = $");
            sql.push_str(&params.len().to_string());
        }
    }

    (sql, params)
}

/// DELETE FROM table WHERE key_column = $1.
pub(crate) fn delete_by_key(
    table: &str,
    key_column: &str,
    key: SqlValue,
) -> (String, Vec<SqlValue>) {
    let sql = format!("DELETE FROM {} WHERE {} = $1", table, key_column);
    (sql, vec![key])
}

/// SELECT * FROM table with an optional caller-supplied WHERE fragment.
/// The fragment's placeholders are the caller's; limit and offset are
/// inlined, never parameterized.
pub(crate) fn select(
    table: &str,
    where_sql: Option<&str>,
    order: Option<&str>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> String {
    let mut sql = String::with_capacity(128);
    sql.push_str("SELECT * FROM ");
    sql.push_str(table);
    if let Some(where_sql) = where_sql {
        sql.push_str(" WHERE ");
        sql.push_str(where_sql);
    }
    if let Some(order) = order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&limit.to_string());
    }
    if let Some(offset) = offset {
        sql.push_str(" OFFSET ");
        sql.push_str(&offset.to_string());
    }
    sql
}

/// SELECT * FROM table WHERE every template pair matches.
pub(crate) fn select_by_template(
    table: &str,
    template: &[(&'static str, SqlValue)],
    order: Option<&str>,
    limit: Option<i64>,
) -> (String, Vec<SqlValue>) {
    let mut sql = String::with_capacity(128);
    let mut params = Vec::with_capacity(template.len());

    sql.push_str("SELECT * FROM ");
    sql.push_str(table);
    if !template.is_empty() {
        sql.push_str(" WHERE ");
        for (i, (column, value)) in template.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            params.push(value.clone());
            sql.push_str(column);
            sql.push_str(" = $");
            sql.push_str(&params.len().to_string());
        }
    }
    if let Some(order) = order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&limit.to_string());
    }

    (sql, params)
}

/// SELECT COUNT(*) FROM table with an optional caller-supplied WHERE
/// fragment.
pub(crate) fn count(table: &str, where_sql: Option<&str>) -> String {
    match where_sql {
        Some(where_sql) => format!("SELECT COUNT(*) FROM {} WHERE {}", table, where_sql),
        None => format!("SELECT COUNT(*) FROM {}", table),
    }
}

/// SELECT COUNT(*) over a relation's join table for one owner.
pub(crate) fn relation_count(join_table: &str, owner_column: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {} = $1",
        join_table, owner_column
    )
}

/// INSERT one join row per related key. $1 is the owner key throughout.
pub(crate) fn relation_append(
    join_table: &str,
    owner_column: &str,
    related_column: &str,
    related_count: usize,
) -> String {
    let mut sql = String::with_capacity(128);
    sql.push_str("INSERT INTO ");
    sql.push_str(join_table);
    sql.push_str(" (");
    sql.push_str(owner_column);
    sql.push_str(", ");
    sql.push_str(related_column);
    sql.push_str(") VALUES ");
    for i in 0..related_count {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str("($1, $");
        sql.push_str(&(i + 2).to_string());
        sql.push(')');
    }
    sql
}

/// DELETE the join rows tying one owner to the given related keys.
pub(crate) fn relation_delete(
    join_table: &str,
    owner_column: &str,
    related_column: &str,
    related_count: usize,
) -> String {
    let mut sql = String::with_capacity(128);
    sql.push_str("DELETE FROM ");
    sql.push_str(join_table);
    sql.push_str(" WHERE ");
    sql.push_str(owner_column);
    sql.push_str(" = $1 AND ");
    sql.push_str(related_column);
    sql.push_str(" IN (");
    for i in 0..related_count {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('$');
        sql.push_str(&(i + 2).to_string());
    }
    sql.push(')');
    sql
}

/// DELETE every join row for one owner.
pub(crate) fn relation_clear(join_table: &str, owner_column: &str) -> String {
    format!("DELETE FROM {} WHERE {} = $1", join_table, owner_column)
}

/// SELECT the records on the far side of a relation for one owner.
pub(crate) fn relation_select(
    related_table: &str,
    related_key_column: &str,
    join_table: &str,
    owner_column: &str,
    related_column: &str,
) -> String {
    format!(
        "SELECT {rel}.* FROM {rel} JOIN {join} ON {join}.{related_col} = {rel}.{rel_key} WHERE {join}.{owner_col} = $1",
        rel = related_table,
        join = join_table,
        related_col = related_column,
        rel_key = related_key_column,
        owner_col = owner_column,
    )
}
