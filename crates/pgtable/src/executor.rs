//! The executor seam.
//!
//! [`TableQb`](crate::TableQb) only produces SQL text and positional parameters; an
//! [`Executor`] runs them. `PgExecutor` is the PostgreSQL implementation; tests use
//! in-memory recorders.

use crate::error::{TableError, TableResult};
use crate::record::{FetchStyle, Record};
use crate::value::Value;
use std::future::Future;

/// Everything the builder needs from a database connection.
///
/// Placeholders in `sql` and `predicate` are written by the caller (`?` for the
/// bundled PostgreSQL executor) and correlate with `params` by position.
pub trait Executor: Send + Sync {
    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = TableResult<u64>> + Send;

    /// Execute a query and return all rows.
    fn fetch_all(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> impl Future<Output = TableResult<Vec<Record>>> + Send;

    /// Execute a query and return the first row, if any.
    ///
    /// The default implementation uses [`Executor::fetch_all`] and keeps the first row.
    fn fetch_one(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> impl Future<Output = TableResult<Option<Record>>> + Send {
        async move {
            let rows = self.fetch_all(sql, params, style).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// Insert one row and return its identifier when the executor can determine one.
    fn insert(
        &self,
        table: &str,
        data: &[(&str, Value)],
    ) -> impl Future<Output = TableResult<Option<Value>>> + Send;

    /// Update rows matching `predicate` (all rows when it is empty).
    fn update(
        &self,
        table: &str,
        data: &[(&str, Value)],
        predicate: &str,
        params: &[Value],
    ) -> impl Future<Output = TableResult<u64>> + Send;

    /// Delete rows matching `predicate` (all rows when it is `None`).
    fn delete(
        &self,
        table: &str,
        predicate: Option<&str>,
        params: &[Value],
    ) -> impl Future<Output = TableResult<u64>> + Send;

    /// Look up the primary key column of `table`.
    fn primary_key(&self, table: &str) -> impl Future<Output = TableResult<Option<String>>> + Send;

    /// Text of the last statement sent to the database, for diagnostics.
    fn last_statement(&self) -> Option<String>;
}

impl<E: Executor> Executor for &E {
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = TableResult<u64>> + Send {
        (**self).execute(sql, params)
    }

    fn fetch_all(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> impl Future<Output = TableResult<Vec<Record>>> + Send {
        (**self).fetch_all(sql, params, style)
    }

    fn fetch_one(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> impl Future<Output = TableResult<Option<Record>>> + Send {
        (**self).fetch_one(sql, params, style)
    }

    fn insert(
        &self,
        table: &str,
        data: &[(&str, Value)],
    ) -> impl Future<Output = TableResult<Option<Value>>> + Send {
        (**self).insert(table, data)
    }

    fn update(
        &self,
        table: &str,
        data: &[(&str, Value)],
        predicate: &str,
        params: &[Value],
    ) -> impl Future<Output = TableResult<u64>> + Send {
        (**self).update(table, data, predicate, params)
    }

    fn delete(
        &self,
        table: &str,
        predicate: Option<&str>,
        params: &[Value],
    ) -> impl Future<Output = TableResult<u64>> + Send {
        (**self).delete(table, predicate, params)
    }

    fn primary_key(&self, table: &str) -> impl Future<Output = TableResult<Option<String>>> + Send {
        (**self).primary_key(table)
    }

    fn last_statement(&self) -> Option<String> {
        (**self).last_statement()
    }
}

/// Executor of a builder that has no database handle yet.
///
/// Every call fails with [`TableError::Config`]; SQL can still be assembled with
/// [`TableQb::to_sql`](crate::TableQb::to_sql).
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

fn unbound() -> TableError {
    TableError::config("no database handle bound to this builder")
}

impl Executor for Unbound {
    async fn execute(&self, _sql: &str, _params: &[Value]) -> TableResult<u64> {
        Err(unbound())
    }

    async fn fetch_all(
        &self,
        _sql: &str,
        _params: &[Value],
        _style: FetchStyle,
    ) -> TableResult<Vec<Record>> {
        Err(unbound())
    }

    async fn insert(&self, _table: &str, _data: &[(&str, Value)]) -> TableResult<Option<Value>> {
        Err(unbound())
    }

    async fn update(
        &self,
        _table: &str,
        _data: &[(&str, Value)],
        _predicate: &str,
        _params: &[Value],
    ) -> TableResult<u64> {
        Err(unbound())
    }

    async fn delete(
        &self,
        _table: &str,
        _predicate: Option<&str>,
        _params: &[Value],
    ) -> TableResult<u64> {
        Err(unbound())
    }

    async fn primary_key(&self, _table: &str) -> TableResult<Option<String>> {
        Err(unbound())
    }

    fn last_statement(&self) -> Option<String> {
        None
    }
}
