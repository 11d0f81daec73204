use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::backends::PostgresConnector;
use crate::error::{merge_into, ReporsError, Result};
use crate::raw::{self, RawDest};
use crate::retry;
use crate::rotator::ConnectionRotator;
use crate::statements;
use crate::traits::{Connection, Connector, Model, RelationDef};
use crate::types::{RawQueryResult, SqlValue};

/// Default cap on retries of retriable backend errors.
pub const DEFAULT_RETRY_LIMIT: u32 = 100;

/// Per-driver configuration, passed at construction.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Maximum number of retries for retriable backend errors.
    /// 0 disables the cap and retries indefinitely.
    pub retry_limit: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

/// Short operation codes prefixed onto fatal backend errors so a failure
/// in a log line can be traced back to the operation that produced it.
mod tags {
    pub(super) const SAVE: &str = "sav";
    pub(super) const SAVE_MULTIPLE: &str = "svm";
    pub(super) const UPDATE: &str = "upd";
    pub(super) const UPDATE_SINGLE: &str = "upd1";
    pub(super) const DELETE: &str = "del";
    pub(super) const DELETE_MULTIPLE: &str = "dlm";
    pub(super) const GET_OR_CREATE: &str = "goc";
    pub(super) const FIRST_WHERE: &str = "fw";
    pub(super) const FIRST_WHERE_ORDER: &str = "fwo";
    pub(super) const LAST_WHERE: &str = "lw";
    pub(super) const LAST_WHERE_ORDER: &str = "lwo";
    pub(super) const FIND_WHERE: &str = "fndw";
    pub(super) const FIND_WHERE_ORDER: &str = "fndwo";
    pub(super) const FIND_WHERE_LIMIT_OFFSET: &str = "fwlo";
    pub(super) const FIND_WHERE_LIMIT_OFFSET_ORDER: &str = "fwloo";
    pub(super) const FIND_RELATED: &str = "fnr";
    pub(super) const APPEND_RELATED: &str = "apr";
    pub(super) const DELETE_RELATED: &str = "dlr";
    pub(super) const CLEAR_RELATED: &str = "clr";
    pub(super) const COUNT_RELATED: &str = "cr";
    pub(super) const COUNT_WHERE: &str = "cw";
    pub(super) const EXEC: &str = "exe";
    pub(super) const RAW: &str = "raw";
}

/// Repository driver: executes persistence operations against a rotated
/// connection, classifying errors and retrying transient backend failures
/// with linear backoff.
///
/// Callers may invoke operations concurrently on one driver instance; the
/// rotator's lock covers connection acquisition only, so queries from
/// different callers proceed in parallel.
pub struct RepositoryDriver {
    rotator: ConnectionRotator,
    config: DriverConfig,
}

impl RepositoryDriver {
    /// Create a driver over PostgreSQL connection strings.
    ///
    /// # Example
    /// ```ignore
    /// let driver = RepositoryDriver::postgres(
    ///     vec!["host=db1 dbname=app".into(), "host=db2 dbname=app".into()],
    ///     DriverConfig::default(),
    /// )?;
    /// ```
    pub fn postgres(descriptors: Vec<String>, config: DriverConfig) -> Result<Self> {
        Self::with_connector(Arc::new(PostgresConnector::new()), descriptors, config)
    }

    /// Create a driver with a custom connector.
    /// Useful for testing or alternative backends.
    pub fn with_connector(
        connector: Arc<dyn Connector>,
        descriptors: Vec<String>,
        config: DriverConfig,
    ) -> Result<Self> {
        Ok(Self {
            rotator: ConnectionRotator::new(connector, descriptors)?,
            config,
        })
    }

    /// Releases the live connection, if any.
    pub async fn close(&self) {
        self.rotator.close().await;
    }

    /// Persist a single record: INSERT when its key is unset, upsert
    /// otherwise.
    pub async fn save<M: Model>(&self, record: &M) -> Result<()> {
        let (sql, params) = save_statement(record);
        let sql = sql.as_str();
        let params = params.as_slice();
        self.with_conn(tags::SAVE, |conn| async move {
            conn.execute(sql, params).await.map(|_| ())
        })
        .await
    }

    /// Persist zero or more records, all-or-nothing within one
    /// transaction.
    pub async fn save_multiple<M: Model>(&self, records: &[&M]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let prepared: Vec<(String, Vec<SqlValue>)> =
            records.iter().map(|record| save_statement(*record)).collect();
        let prepared = prepared.as_slice();
        self.in_transaction(tags::SAVE_MULTIPLE, |tx| async move {
            for (sql, params) in prepared {
                tx.execute(sql, params).await?;
            }
            Ok(())
        })
        .await
    }

    /// Update the columns in `values` on every row matching the template
    /// record. Returns the number of rows affected.
    pub async fn update<M: Model>(
        &self,
        record: &M,
        values: &[(&'static str, SqlValue)],
    ) -> Result<u64> {
        if values.is_empty() {
            return Err(ReporsError::Usage {
                operation: "update",
                reason: "no column assignments given",
            });
        }
        let template = template_of(record);
        let (sql, params) = statements::update(M::table_name(), values, &template);
        let sql = sql.as_str();
        let params = params.as_slice();
        self.with_conn(tags::UPDATE, |conn| async move {
            conn.execute(sql, params).await
        })
        .await
    }

    /// Update exactly one row or fail. Zero or more than one affected row
    /// rolls the transaction back and surfaces `UnexpectedRowCount`.
    pub async fn update_single<M: Model>(
        &self,
        record: &M,
        values: &[(&'static str, SqlValue)],
    ) -> Result<()> {
        if values.is_empty() {
            return Err(ReporsError::Usage {
                operation: "update_single",
                reason: "no column assignments given",
            });
        }
        let template = template_of(record);
        let (sql, params) = statements::update(M::table_name(), values, &template);
        let sql = sql.as_str();
        let params = params.as_slice();
        self.in_transaction(tags::UPDATE_SINGLE, |tx| async move {
            let affected = tx.execute(sql, params).await?;
            if affected != 1 {
                return Err(ReporsError::UnexpectedRowCount {
                    expected: 1,
                    actual: affected,
                });
            }
            Ok(())
        })
        .await
    }

    /// Delete a single record by primary key. A record with no key set is
    /// rejected before any backend call; an unkeyed DELETE would sweep the
    /// whole table.
    pub async fn delete<M: Model>(&self, record: &M) -> Result<()> {
        let key = require_key(record, "delete")?;
        let (sql, params) = statements::delete_by_key(M::table_name(), M::key_column(), key);
        let sql = sql.as_str();
        let params = params.as_slice();
        self.with_conn(tags::DELETE, |conn| async move {
            conn.execute(sql, params).await.map(|_| ())
        })
        .await
    }

    /// Delete multiple records by primary key, all-or-nothing within one
    /// transaction. Every record must have its key set; violations are
    /// detected before any backend call.
    pub async fn delete_multiple<M: Model>(&self, records: &[&M]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut prepared = Vec::with_capacity(records.len());
        for record in records {
            let key = require_key(*record, "delete_multiple")?;
            prepared.push(statements::delete_by_key(
                M::table_name(),
                M::key_column(),
                key,
            ));
        }
        let prepared = prepared.as_slice();
        self.in_transaction(tags::DELETE_MULTIPLE, |tx| async move {
            for (sql, params) in prepared {
                tx.execute(sql, params).await?;
            }
            Ok(())
        })
        .await
    }

    /// Fetch the record matching the template, creating it when absent.
    /// Returns whether a new record was created. On both paths the record
    /// is populated from the stored row, so generated keys come back.
    pub async fn get_or_create<M: Model>(&self, record: &mut M) -> Result<bool> {
        let template = template_of(record);
        let order = format!("{} ASC", M::key_column());
        let (select_sql, select_params) =
            statements::select_by_template(M::table_name(), &template, Some(&order), Some(1));

        let mut insert_pairs = Vec::new();
        let key = record.key();
        if !key.is_null() {
            insert_pairs.push((M::key_column(), key));
        }
        insert_pairs.extend(record.fields().into_iter().filter(|(_, v)| !v.is_null()));
        let (insert_sql, insert_params) = statements::insert(M::table_name(), &insert_pairs, true);

        let select_sql = select_sql.as_str();
        let select_params = select_params.as_slice();
        let insert_sql = insert_sql.as_str();
        let insert_params = insert_params.as_slice();

        let (created, row) = self
            .with_conn(tags::GET_OR_CREATE, |conn| async move {
                let found = conn.query(select_sql, select_params).await?;
                let RawQueryResult { columns, mut rows } = found;
                if !rows.is_empty() {
                    return Ok((false, Some((columns, rows.swap_remove(0)))));
                }
                let inserted = conn.query(insert_sql, insert_params).await?;
                let RawQueryResult { columns, mut rows } = inserted;
                if rows.is_empty() {
                    return Ok((true, None));
                }
                Ok((true, Some((columns, rows.swap_remove(0)))))
            })
            .await?;

        if let Some((columns, values)) = row {
            record.apply(&columns, &values)?;
        }
        Ok(created)
    }

    /// Fetch the first row matching a WHERE fragment into the record,
    /// ordered by the key column ascending. Zero rows is `NotFound`.
    pub async fn first_where<M: Model>(
        &self,
        record: &mut M,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        let order = format!("{} ASC", M::key_column());
        self.fetch_one(record, tags::FIRST_WHERE, where_sql, &order, params)
            .await
    }

    /// `first_where` with a caller-supplied ORDER BY fragment.
    pub async fn first_where_order<M: Model>(
        &self,
        record: &mut M,
        order: &str,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        self.fetch_one(record, tags::FIRST_WHERE_ORDER, where_sql, order, params)
            .await
    }

    /// Fetch the last row matching a WHERE fragment into the record,
    /// ordered by the key column descending. Zero rows is `NotFound`.
    pub async fn last_where<M: Model>(
        &self,
        record: &mut M,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        let order = format!("{} DESC", M::key_column());
        self.fetch_one(record, tags::LAST_WHERE, where_sql, &order, params)
            .await
    }

    /// `last_where` with a caller-supplied ORDER BY fragment.
    pub async fn last_where_order<M: Model>(
        &self,
        record: &mut M,
        order: &str,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        self.fetch_one(record, tags::LAST_WHERE_ORDER, where_sql, order, params)
            .await
    }

    /// Fetch every row matching a WHERE fragment, replacing the contents
    /// of `records`.
    pub async fn find_where<M: Model + Default>(
        &self,
        records: &mut Vec<M>,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        self.fetch_all(records, tags::FIND_WHERE, where_sql, None, None, None, params)
            .await
    }

    /// `find_where` with a caller-supplied ORDER BY fragment.
    pub async fn find_where_order<M: Model + Default>(
        &self,
        records: &mut Vec<M>,
        order: &str,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        self.fetch_all(
            records,
            tags::FIND_WHERE_ORDER,
            where_sql,
            Some(order),
            None,
            None,
            params,
        )
        .await
    }

    /// Paged `find_where`, ordered by the key column descending.
    pub async fn find_where_limit_offset<M: Model + Default>(
        &self,
        records: &mut Vec<M>,
        limit: i64,
        offset: i64,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        let order = format!("{} DESC", M::key_column());
        self.fetch_all(
            records,
            tags::FIND_WHERE_LIMIT_OFFSET,
            where_sql,
            Some(&order),
            Some(limit),
            Some(offset),
            params,
        )
        .await
    }

    /// Paged `find_where` with a caller-supplied ORDER BY fragment.
    pub async fn find_where_limit_offset_order<M: Model + Default>(
        &self,
        records: &mut Vec<M>,
        limit: i64,
        offset: i64,
        order: &str,
        where_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        self.fetch_all(
            records,
            tags::FIND_WHERE_LIMIT_OFFSET_ORDER,
            where_sql,
            Some(order),
            Some(limit),
            Some(offset),
            params,
        )
        .await
    }

    /// Fetch the records on the far side of a named relation, replacing
    /// the contents of `related`.
    pub async fn find_related<M: Model, R: Model + Default>(
        &self,
        record: &M,
        relation: &str,
        related: &mut Vec<R>,
    ) -> Result<()> {
        let def = relation_def::<M>(relation)?;
        let owner_key = require_key(record, "find_related")?;
        let sql = statements::relation_select(
            def.related_table,
            R::key_column(),
            def.join_table,
            def.owner_column,
            def.related_column,
        );
        let sql = sql.as_str();
        let params = [owner_key];
        let params: &[SqlValue] = &params;
        let result = self
            .with_conn(tags::FIND_RELATED, |conn| async move {
                conn.query(sql, params).await
            })
            .await?;
        *related = materialize(result)?;
        Ok(())
    }

    /// Tie the given records to `record` through a named relation.
    pub async fn append_related<M: Model, R: Model>(
        &self,
        record: &M,
        relation: &str,
        items: &[&R],
    ) -> Result<()> {
        let def = relation_def::<M>(relation)?;
        if items.is_empty() {
            return Ok(());
        }
        let mut params = Vec::with_capacity(items.len() + 1);
        params.push(require_key(record, "append_related")?);
        for item in items {
            params.push(require_key(*item, "append_related")?);
        }
        let sql = statements::relation_append(
            def.join_table,
            def.owner_column,
            def.related_column,
            items.len(),
        );
        let sql = sql.as_str();
        let params = params.as_slice();
        self.with_conn(tags::APPEND_RELATED, |conn| async move {
            conn.execute(sql, params).await.map(|_| ())
        })
        .await
    }

    /// Untie the given records from `record` in a named relation.
    pub async fn delete_related<M: Model, R: Model>(
        &self,
        record: &M,
        relation: &str,
        items: &[&R],
    ) -> Result<()> {
        let def = relation_def::<M>(relation)?;
        if items.is_empty() {
            return Ok(());
        }
        let mut params = Vec::with_capacity(items.len() + 1);
        params.push(require_key(record, "delete_related")?);
        for item in items {
            params.push(require_key(*item, "delete_related")?);
        }
        let sql = statements::relation_delete(
            def.join_table,
            def.owner_column,
            def.related_column,
            items.len(),
        );
        let sql = sql.as_str();
        let params = params.as_slice();
        self.with_conn(tags::DELETE_RELATED, |conn| async move {
            conn.execute(sql, params).await.map(|_| ())
        })
        .await
    }

    /// Untie every record from `record` in a named relation.
    pub async fn clear_related<M: Model>(&self, record: &M, relation: &str) -> Result<()> {
        let def = relation_def::<M>(relation)?;
        let sql = statements::relation_clear(def.join_table, def.owner_column);
        let sql = sql.as_str();
        let params = [require_key(record, "clear_related")?];
        let params: &[SqlValue] = &params;
        self.with_conn(tags::CLEAR_RELATED, |conn| async move {
            conn.execute(sql, params).await.map(|_| ())
        })
        .await
    }

    /// Count the records tied to `record` through a named relation.
    pub async fn count_related<M: Model>(&self, record: &M, relation: &str) -> Result<i64> {
        let def = relation_def::<M>(relation)?;
        let sql = statements::relation_count(def.join_table, def.owner_column);
        let sql = sql.as_str();
        let params = [require_key(record, "count_related")?];
        let params: &[SqlValue] = &params;
        let result = self
            .with_conn(tags::COUNT_RELATED, |conn| async move {
                conn.query(sql, params).await
            })
            .await?;
        count_from(&result)
    }

    /// Count the rows matching a WHERE fragment.
    pub async fn count_where<M: Model>(&self, where_sql: &str, params: &[SqlValue]) -> Result<i64> {
        let sql = statements::count(M::table_name(), Some(where_sql));
        let sql = sql.as_str();
        let result = self
            .with_conn(tags::COUNT_WHERE, |conn| async move {
                conn.query(sql, params).await
            })
            .await?;
        count_from(&result)
    }

    /// Execute a raw statement, discarding any result.
    pub async fn exec(&self, query: &str, params: &[SqlValue]) -> Result<()> {
        self.with_conn(tags::EXEC, |conn| async move {
            conn.execute(query, params).await.map(|_| ())
        })
        .await
    }

    /// Execute a raw query and return the full result set.
    pub async fn raw_rows(&self, query: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.with_conn(tags::RAW, |conn| async move {
            conn.query(query, params).await
        })
        .await
    }

    /// Execute a raw query and unpack the rows into the destination,
    /// using the strategy the destination's shape selects.
    pub async fn raw(
        &self,
        dest: RawDest<'_>,
        query: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        let result = self.raw_rows(query, params).await?;
        raw::dispatch(dest, &result)
    }

    async fn fetch_one<M: Model>(
        &self,
        record: &mut M,
        tag: &'static str,
        where_sql: &str,
        order: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        let sql = statements::select(M::table_name(), Some(where_sql), Some(order), Some(1), None);
        let sql = sql.as_str();
        let result = self
            .with_conn(tag, |conn| async move { conn.query(sql, params).await })
            .await?;
        let RawQueryResult { columns, mut rows } = result;
        if rows.is_empty() {
            return Err(ReporsError::NotFound);
        }
        record.apply(&columns, &rows.swap_remove(0))
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_all<M: Model + Default>(
        &self,
        records: &mut Vec<M>,
        tag: &'static str,
        where_sql: &str,
        order: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
        params: &[SqlValue],
    ) -> Result<()> {
        let sql = statements::select(M::table_name(), Some(where_sql), order, limit, offset);
        let sql = sql.as_str();
        let result = self
            .with_conn(tag, |conn| async move { conn.query(sql, params).await })
            .await?;
        *records = materialize(result)?;
        Ok(())
    }

    /// Runs a unit of work inside BEGIN/COMMIT, rolling back on the first
    /// failure. A rollback failure is merged with the error that caused
    /// it. The whole transaction is the retry unit.
    async fn in_transaction<T, F, Fut>(&self, tag: &'static str, body: F) -> Result<T>
    where
        F: Fn(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.with_conn(tag, |conn| {
            let body = &body;
            async move {
                if let Err(err) = conn.execute("BEGIN", &[]).await {
                    return Err(abort(conn.as_ref(), err).await);
                }
                match body(Arc::clone(&conn)).await {
                    Ok(value) => match conn.execute("COMMIT", &[]).await {
                        Ok(_) => Ok(value),
                        Err(err) => Err(abort(conn.as_ref(), err).await),
                    },
                    Err(err) => Err(abort(conn.as_ref(), err).await),
                }
            }
        })
        .await
    }

    /// The executor: acquire a connection, run the unit of work, classify
    /// any failure. Connection errors invalidate the rotator and surface
    /// immediately; retriable backend errors retry with linear backoff
    /// under the configured cap; anything else is fatal, with opaque
    /// backend text wrapped in the operation tag.
    async fn with_conn<T, F, Fut>(&self, tag: &'static str, work: F) -> Result<T>
    where
        F: Fn(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let conn = self.rotator.acquire().await?;
            match work(conn).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if retry::is_connection_error(&err) {
                        self.rotator.invalidate().await;
                        return Err(err);
                    }
                    if retry::is_retriable(&err) {
                        let limit = self.config.retry_limit;
                        if limit > 0 && attempt >= limit {
                            return Err(ReporsError::RetriesExceeded {
                                attempts: attempt + 1,
                                limit,
                                message: err.to_string(),
                            });
                        }
                        attempt += 1;
                        info!(tag, attempt, error = %err, "retriable backend error, will retry");
                        sleep(Duration::from_millis(u64::from(attempt) * 10)).await;
                        continue;
                    }
                    return Err(tag_fatal(tag, err));
                }
            }
        }
    }
}

/// Rolls back and folds a rollback failure into the primary error.
async fn abort(conn: &dyn Connection, primary: ReporsError) -> ReporsError {
    let rollback_err = conn.execute("ROLLBACK", &[]).await.err();
    merge_into(primary, rollback_err)
}

fn tag_fatal(tag: &'static str, err: ReporsError) -> ReporsError {
    match err {
        ReporsError::Backend(message) => ReporsError::Tagged { tag, message },
        other => other,
    }
}

/// INSERT for unkeyed records, upsert for keyed ones. NULL fields are
/// left to the backend's column defaults.
fn save_statement<M: Model>(record: &M) -> (String, Vec<SqlValue>) {
    let fields: Vec<(&'static str, SqlValue)> = record
        .fields()
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect();
    match record.key() {
        SqlValue::Null => statements::insert(M::table_name(), &fields, false),
        key => statements::upsert(M::table_name(), M::key_column(), key, &fields),
    }
}

/// The record as a query template: its key (when set) plus every non-NULL
/// field, matched by equality.
fn template_of<M: Model>(record: &M) -> Vec<(&'static str, SqlValue)> {
    let mut template = Vec::new();
    let key = record.key();
    if !key.is_null() {
        template.push((M::key_column(), key));
    }
    for (column, value) in record.fields() {
        if !value.is_null() {
            template.push((column, value));
        }
    }
    template
}

fn require_key<M: Model>(record: &M, operation: &'static str) -> Result<SqlValue> {
    let key = record.key();
    if key.is_null() {
        return Err(ReporsError::Usage {
            operation,
            reason: "record has no primary key set",
        });
    }
    Ok(key)
}

fn relation_def<M: Model>(name: &str) -> Result<&'static RelationDef> {
    M::relations()
        .iter()
        .find(|def| def.name == name)
        .ok_or_else(|| ReporsError::UnknownRelation(name.to_string()))
}

fn materialize<M: Model + Default>(result: RawQueryResult) -> Result<Vec<M>> {
    let RawQueryResult { columns, rows } = result;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = M::default();
        record.apply(&columns, &row)?;
        records.push(record);
    }
    Ok(records)
}

fn count_from(result: &RawQueryResult) -> Result<i64> {
    match result.rows.first().and_then(|row| row.first()) {
        Some(cell) => cell.as_i64().ok_or(ReporsError::Scan {
            wanted: "int64",
            found: cell.kind(),
        }),
        None => Ok(0),
    }
}
