//! PostgreSQL executor.
//!
//! [`PgExecutor`] runs builder output over any [`GenericClient`]: a plain
//! `tokio_postgres::Client`, a transaction, or a pooled connection.
//!
//! ```ignore
//! let exec = PgExecutor::new(client).with_config(ExecutorConfig::new().timeout(Duration::from_secs(5)));
//! let adults = exec.table("users").where_("age > ?", vec![18.into()]).fetch_all().await?;
//! ```

use crate::client::GenericClient;
use crate::config::ExecutorConfig;
use crate::error::{TableError, TableResult};
use crate::executor::Executor;
use crate::placeholder::number_placeholders;
use crate::record::{FetchStyle, Record};
use crate::table::TableQb;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

const PRIMARY_KEY_SQL: &str = "SELECT a.attname::text FROM pg_index i \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
     WHERE i.indrelid = to_regclass($1) AND i.indisprimary \
     ORDER BY array_position(i.indkey, a.attnum) \
     LIMIT 1";

/// [`Executor`] backed by a tokio-postgres connection.
///
/// Primary key lookups are cached per qualified table name for the lifetime of
/// the executor, so inserts pay for the catalog query once per table. Build a
/// new executor after altering a table's key.
pub struct PgExecutor<C> {
    client: C,
    config: ExecutorConfig,
    last_sql: Mutex<Option<String>>,
    primary_keys: Mutex<HashMap<String, Option<String>>>,
}

impl<C: GenericClient> PgExecutor<C> {
    /// Wrap a client with default settings.
    pub fn new(client: C) -> Self {
        Self {
            client,
            config: ExecutorConfig::default(),
            last_sql: Mutex::new(None),
            primary_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the executor settings.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Start a builder for `table` that borrows this executor.
    pub fn table(&self, name: impl Into<String>) -> TableQb<&Self> {
        TableQb::with_executor(self, name)
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Consume the executor and return the underlying client.
    pub fn into_inner(self) -> C {
        self.client
    }

    async fn execute_with_timeout<T, F>(&self, future: F) -> TableResult<T>
    where
        F: std::future::Future<Output = TableResult<T>> + Send,
    {
        match self.config.query_timeout {
            Some(timeout) => {
                tokio::pin!(future);
                tokio::select! {
                    result = &mut future => result,
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(cancel_token) = self.client.cancel_token() {
                            tokio::spawn(async move {
                                let _ = cancel_token.cancel_query(tokio_postgres::NoTls).await;
                            });
                        }
                        Err(TableError::Timeout(timeout))
                    }
                }
            }
            None => future.await,
        }
    }

    fn record(&self, kind: &'static str, sql: &str, param_count: usize) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "pgtable.sql",
            kind,
            param_count,
            sql = %self.truncate_sql(sql),
        );
        #[cfg(not(feature = "tracing"))]
        let _ = (kind, param_count);

        let mut last = self.last_sql.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(sql.to_string());
    }

    #[cfg(feature = "tracing")]
    fn truncate_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.config.max_logged_sql_length {
            Some(max) if sql.len() > max => {
                let mut end = max;
                while end > 0 && !sql.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &sql[..end]).into()
            }
            _ => sql.into(),
        }
    }

    async fn query_rows(
        &self,
        kind: &'static str,
        sql: &str,
        params: &[Value],
    ) -> TableResult<Vec<Row>> {
        self.record(kind, sql, params.len());
        let refs = param_refs(params);
        self.execute_with_timeout(self.client.query(sql, &refs)).await
    }

    async fn query_row(
        &self,
        kind: &'static str,
        sql: &str,
        params: &[Value],
    ) -> TableResult<Option<Row>> {
        self.record(kind, sql, params.len());
        let refs = param_refs(params);
        self.execute_with_timeout(self.client.query_first(sql, &refs)).await
    }

    async fn execute_stmt(
        &self,
        kind: &'static str,
        sql: &str,
        params: &[Value],
    ) -> TableResult<u64> {
        self.record(kind, sql, params.len());
        let refs = param_refs(params);
        self.execute_with_timeout(self.client.execute(sql, &refs)).await
    }

    fn cached_primary_key(&self, qualified: &str) -> Option<Option<String>> {
        self.primary_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(qualified)
            .cloned()
    }

    fn qualified_name(&self, table: &str) -> String {
        if table.contains('.') {
            table.to_string()
        } else {
            format!("{}.{}", self.config.schema, table)
        }
    }
}

impl<C: GenericClient> Executor for PgExecutor<C> {
    async fn execute(&self, sql: &str, params: &[Value]) -> TableResult<u64> {
        let sql = number_placeholders(sql, 1, params.len());
        self.execute_stmt("execute", &sql, params).await
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> TableResult<Vec<Record>> {
        let sql = number_placeholders(sql, 1, params.len());
        let rows = self.query_rows("select", &sql, params).await?;
        decode_rows(&rows, style)
    }

    async fn fetch_one(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> TableResult<Option<Record>> {
        let sql = number_placeholders(sql, 1, params.len());
        match self.query_row("select", &sql, params).await? {
            Some(row) => to_record(&row, &column_names(&row), style).map(Some),
            None => Ok(None),
        }
    }

    async fn insert(&self, table: &str, data: &[(&str, Value)]) -> TableResult<Option<Value>> {
        let pk = self.primary_key(table).await?;
        let sql = insert_sql(table, data, pk.as_deref());
        let values: Vec<Value> = data.iter().map(|(_, v)| v.clone()).collect();

        match pk {
            Some(_) => {
                let row = self.query_row("insert", &sql, &values).await?;
                Ok(row
                    .as_ref()
                    .map(decode_values)
                    .transpose()?
                    .and_then(|values| values.into_iter().next()))
            }
            None => {
                self.execute_stmt("insert", &sql, &values).await?;
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        table: &str,
        data: &[(&str, Value)],
        predicate: &str,
        params: &[Value],
    ) -> TableResult<u64> {
        if data.is_empty() {
            return Err(TableError::validation(format!(
                "update of `{table}` needs at least one column"
            )));
        }
        let sql = update_sql(table, data, predicate, params.len());
        let values: Vec<Value> = data
            .iter()
            .map(|(_, v)| v.clone())
            .chain(params.iter().cloned())
            .collect();
        self.execute_stmt("update", &sql, &values).await
    }

    async fn delete(
        &self,
        table: &str,
        predicate: Option<&str>,
        params: &[Value],
    ) -> TableResult<u64> {
        let sql = delete_sql(table, predicate, params.len());
        self.execute_stmt("delete", &sql, params).await
    }

    async fn primary_key(&self, table: &str) -> TableResult<Option<String>> {
        let qualified = self.qualified_name(table);
        if let Some(pk) = self.cached_primary_key(&qualified) {
            return Ok(pk);
        }

        let params = [Value::Text(qualified.clone())];
        let pk = match self.query_row("primary_key", PRIMARY_KEY_SQL, &params).await? {
            Some(row) => Some(
                row.try_get::<_, String>(0)
                    .map_err(|e| TableError::decode("attname", e.to_string()))?,
            ),
            None => None,
        };

        self.primary_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(qualified, pk.clone());
        Ok(pk)
    }

    fn last_statement(&self) -> Option<String> {
        self.last_sql
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<C> std::fmt::Debug for PgExecutor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn param_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn decode_rows(rows: &[Row], style: FetchStyle) -> TableResult<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| to_record(row, &columns, style))
        .collect()
}

fn column_names(row: &Row) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

fn to_record(row: &Row, columns: &Arc<[String]>, style: FetchStyle) -> TableResult<Record> {
    let values = decode_values(row)?;
    Ok(match style {
        FetchStyle::Named => Record::named(Arc::clone(columns), values),
        FetchStyle::Positional => Record::positional(values),
    })
}

fn decode_values(row: &Row) -> TableResult<Vec<Value>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            row.try_get::<_, Value>(idx)
                .map_err(|e| TableError::decode(column.name(), e.to_string()))
        })
        .collect()
}

fn insert_sql(table: &str, data: &[(&str, Value)], returning: Option<&str>) -> String {
    let mut sql = format!("INSERT INTO {table}");
    if data.is_empty() {
        sql.push_str(" DEFAULT VALUES");
    } else {
        let columns: Vec<&str> = data.iter().map(|(c, _)| *c).collect();
        let placeholders: Vec<String> = (1..=data.len()).map(|i| format!("${i}")).collect();
        let _ = write!(
            sql,
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
    }
    if let Some(pk) = returning {
        let _ = write!(sql, " RETURNING {pk}");
    }
    sql
}

fn update_sql(table: &str, data: &[(&str, Value)], predicate: &str, param_count: usize) -> String {
    let assignments: Vec<String> = data
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ${}", i + 1))
        .collect();
    let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
    if !predicate.trim().is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&number_placeholders(predicate, data.len() + 1, param_count));
    }
    sql
}

fn delete_sql(table: &str, predicate: Option<&str>, param_count: usize) -> String {
    let mut sql = format!("DELETE FROM {table}");
    if let Some(predicate) = predicate.filter(|p| !p.trim().is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(&number_placeholders(predicate, 1, param_count));
    }
    sql
}
