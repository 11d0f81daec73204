//! Raw-query result dispatch.
//!
//! A raw query unpacks its rows into a caller-supplied destination without
//! the caller hand-writing row-scanning code. The destination is a closed
//! set of shapes; each variant has exactly one unpacking strategy and
//! there is no generic fallback scan.

use std::collections::HashMap;

use crate::error::{ReporsError, Result};
use crate::types::{RawQueryResult, SqlValue};

/// A caller-owned destination for raw-query results.
///
/// Construct one with `.into()` from a mutable reference:
///
/// ```ignore
/// let mut count: i64 = 0;
/// driver.raw((&mut count).into(), "SELECT COUNT(*) FROM tag", &[]).await?;
/// ```
#[derive(Debug)]
pub enum RawDest<'a> {
    /// Exactly one row, one boolean column.
    Bool(&'a mut bool),
    /// Exactly one row, one integer column.
    Int(&'a mut i64),
    /// Exactly one row, one text column.
    Text(&'a mut String),
    /// One boolean per row; single-column results only. Replaced wholesale.
    BoolVec(&'a mut Vec<bool>),
    /// One integer per row; single-column results only. Replaced wholesale.
    IntVec(&'a mut Vec<i64>),
    /// One string per row; single-column results only. Replaced wholesale.
    TextVec(&'a mut Vec<String>),
    /// One inner vec per row covering every column; NULL cells become
    /// `false`. Replaced wholesale.
    BoolRows(&'a mut Vec<Vec<bool>>),
    /// One inner vec per row covering every column; NULL cells become `0`.
    /// Replaced wholesale.
    IntRows(&'a mut Vec<Vec<i64>>),
    /// One inner vec per row covering every column; NULL cells become the
    /// empty string. Replaced wholesale.
    TextRows(&'a mut Vec<Vec<String>>),
    /// One entry per column keyed by column name; later rows overwrite
    /// earlier ones. Inserts into the existing map.
    Map(&'a mut HashMap<String, SqlValue>),
    /// One map per row, appended in row order to the existing vec.
    MapRows(&'a mut Vec<HashMap<String, SqlValue>>),
}

impl<'a> From<&'a mut bool> for RawDest<'a> {
    fn from(dest: &'a mut bool) -> Self {
        RawDest::Bool(dest)
    }
}

impl<'a> From<&'a mut i64> for RawDest<'a> {
    fn from(dest: &'a mut i64) -> Self {
        RawDest::Int(dest)
    }
}

impl<'a> From<&'a mut String> for RawDest<'a> {
    fn from(dest: &'a mut String) -> Self {
        RawDest::Text(dest)
    }
}

impl<'a> From<&'a mut Vec<bool>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<bool>) -> Self {
        RawDest::BoolVec(dest)
    }
}

impl<'a> From<&'a mut Vec<i64>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<i64>) -> Self {
        RawDest::IntVec(dest)
    }
}

impl<'a> From<&'a mut Vec<String>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<String>) -> Self {
        RawDest::TextVec(dest)
    }
}

impl<'a> From<&'a mut Vec<Vec<bool>>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<Vec<bool>>) -> Self {
        RawDest::BoolRows(dest)
    }
}

impl<'a> From<&'a mut Vec<Vec<i64>>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<Vec<i64>>) -> Self {
        RawDest::IntRows(dest)
    }
}

impl<'a> From<&'a mut Vec<Vec<String>>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<Vec<String>>) -> Self {
        RawDest::TextRows(dest)
    }
}

impl<'a> From<&'a mut HashMap<String, SqlValue>> for RawDest<'a> {
    fn from(dest: &'a mut HashMap<String, SqlValue>) -> Self {
        RawDest::Map(dest)
    }
}

impl<'a> From<&'a mut Vec<HashMap<String, SqlValue>>> for RawDest<'a> {
    fn from(dest: &'a mut Vec<HashMap<String, SqlValue>>) -> Self {
        RawDest::MapRows(dest)
    }
}

fn to_bool(cell: &SqlValue) -> Result<bool> {
    cell.as_bool().ok_or(ReporsError::Scan {
        wanted: "bool",
        found: cell.kind(),
    })
}

fn to_i64(cell: &SqlValue) -> Result<i64> {
    cell.as_i64().ok_or(ReporsError::Scan {
        wanted: "int64",
        found: cell.kind(),
    })
}

fn to_text(cell: &SqlValue) -> Result<String> {
    match cell {
        SqlValue::Text(s) => Ok(s.clone()),
        SqlValue::Int32(i) => Ok(i.to_string()),
        SqlValue::Int64(i) => Ok(i.to_string()),
        SqlValue::Float(f) => Ok(f.to_string()),
        _ => Err(ReporsError::Scan {
            wanted: "string",
            found: cell.kind(),
        }),
    }
}

/// Requires exactly one row with exactly one cell and returns that cell.
fn single_cell(result: &RawQueryResult) -> Result<&SqlValue> {
    if result.rows.len() != 1 {
        return Err(ReporsError::UnexpectedRowCount {
            expected: 1,
            actual: result.rows.len() as u64,
        });
    }
    let row = &result.rows[0];
    if row.len() != 1 {
        return Err(ReporsError::UnexpectedColumnCount {
            expected: 1,
            actual: row.len(),
        });
    }
    Ok(&row[0])
}

fn column_per_row<T>(result: &RawQueryResult, convert: fn(&SqlValue) -> Result<T>) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        if row.len() != 1 {
            return Err(ReporsError::UnexpectedColumnCount {
                expected: 1,
                actual: row.len(),
            });
        }
        out.push(convert(&row[0])?);
    }
    Ok(out)
}

fn grid<T>(result: &RawQueryResult, convert: fn(&SqlValue) -> Result<T>, null_default: fn() -> T) -> Result<Vec<Vec<T>>> {
    let mut out = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let mut cells = Vec::with_capacity(row.len());
        for cell in row {
            if cell.is_null() {
                cells.push(null_default());
            } else {
                cells.push(convert(cell)?);
            }
        }
        out.push(cells);
    }
    Ok(out)
}

fn row_as_map(columns: &[String], row: &[SqlValue]) -> Result<Vec<(String, SqlValue)>> {
    if row.len() != columns.len() {
        return Err(ReporsError::UnexpectedColumnCount {
            expected: columns.len(),
            actual: row.len(),
        });
    }
    Ok(columns
        .iter()
        .cloned()
        .zip(row.iter().cloned())
        .collect())
}

/// Unpacks a raw result into the destination, using the strategy the
/// destination's shape selects. Any mismatch is fatal for the call and
/// aborts remaining row processing.
pub fn dispatch(dest: RawDest<'_>, result: &RawQueryResult) -> Result<()> {
    match dest {
        RawDest::Bool(assign) => {
            *assign = to_bool(single_cell(result)?)?;
        }
        RawDest::Int(assign) => {
            *assign = to_i64(single_cell(result)?)?;
        }
        RawDest::Text(assign) => {
            *assign = to_text(single_cell(result)?)?;
        }
        RawDest::BoolVec(assign) => {
            *assign = column_per_row(result, to_bool)?;
        }
        RawDest::IntVec(assign) => {
            *assign = column_per_row(result, to_i64)?;
        }
        RawDest::TextVec(assign) => {
            *assign = column_per_row(result, to_text)?;
        }
        RawDest::BoolRows(assign) => {
            *assign = grid(result, to_bool, bool::default)?;
        }
        RawDest::IntRows(assign) => {
            *assign = grid(result, to_i64, i64::default)?;
        }
        RawDest::TextRows(assign) => {
            *assign = grid(result, to_text, String::default)?;
        }
        RawDest::Map(assign) => {
            for row in &result.rows {
                for (column, value) in row_as_map(&result.columns, row)? {
                    assign.insert(column, value);
                }
            }
        }
        RawDest::MapRows(assign) => {
            for row in &result.rows {
                let mut mapped = HashMap::with_capacity(result.columns.len());
                for (column, value) in row_as_map(&result.columns, row)? {
                    mapped.insert(column, value);
                }
                assign.push(mapped);
            }
        }
    }
    Ok(())
}
