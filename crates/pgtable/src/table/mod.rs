//! Table-bound query builder.
//!
//! A [`TableQb`] belongs to one table and is reused across queries. Fluent
//! setters accumulate raw SQL fragments; a terminal read assembles them into one
//! `SELECT` in a fixed order, hands it to the [`Executor`], and leaves the builder
//! fresh again. Mutations (`insert`, `update`, `delete`) go straight to the
//! executor and never look at the accumulated fragments.
//!
//! Fragments are inserted verbatim. Nothing is escaped or validated, so every
//! raw fragment must come from trusted code; user input belongs in the bound
//! parameters.
//!
//! # Example
//!
//! ```ignore
//! let exec = PgExecutor::new(client);
//! let mut users = exec.table("users");
//!
//! let rows = users
//!     .select_fields("id,name")
//!     .where_("age > ?", [18])
//!     .order_by("id DESC")
//!     .limit(10)
//!     .fetch_all()
//!     .await?;
//!
//! let total = users.scalar(Some("count(*)")).await?;
//! ```

use crate::error::{TableError, TableResult};
use crate::executor::{Executor, Unbound};
use crate::record::{FetchStyle, Record};
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use tokio::sync::OnceCell;

/// Per-query state, cleared by every terminal read.
#[derive(Debug, Clone)]
struct Fragments {
    fields: String,
    alias: String,
    joins: Vec<String>,
    unions: Vec<String>,
    predicate: String,
    params: Vec<Value>,
    group_by: String,
    having: String,
    order_by: String,
    limit: Option<String>,
    offset: Option<String>,
}

impl Default for Fragments {
    fn default() -> Self {
        Self {
            fields: "*".to_string(),
            alias: String::new(),
            joins: Vec::new(),
            unions: Vec::new(),
            predicate: String::new(),
            params: Vec::new(),
            group_by: String::new(),
            having: String::new(),
            order_by: String::new(),
            limit: None,
            offset: None,
        }
    }
}

impl Fragments {
    fn assemble(&self, table: &str) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.fields, table);

        if !self.alias.is_empty() {
            sql.push_str(" AS ");
            sql.push_str(&self.alias);
        }
        if !self.joins.is_empty() {
            sql.push(' ');
            sql.push_str(&self.joins.join(" "));
        }
        if !self.unions.is_empty() {
            sql.push_str(" UNION ");
            sql.push_str(&self.unions.join(" UNION "));
        }
        if !self.predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by);
            if !self.having.is_empty() {
                sql.push_str(" HAVING ");
                sql.push_str(&self.having);
            }
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by);
        }
        // Presence, not emptiness: LIMIT 0 is a valid query.
        if let Some(limit) = &self.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(limit);
        }
        if let Some(offset) = &self.offset {
            sql.push_str(" OFFSET ");
            sql.push_str(offset);
        }

        sql
    }
}

/// Fluent, stateful query builder bound to a single table.
///
/// `E` is the executor that runs the assembled statements. A builder created
/// with [`TableQb::new`] has no executor ([`Unbound`]); it can still assemble
/// SQL, and [`TableQb::bind`] attaches one later.
#[derive(Debug, Clone)]
pub struct TableQb<E = Unbound> {
    table: String,
    db: E,
    primary_key: OnceCell<Option<String>>,
    fragments: Fragments,
}

impl TableQb<Unbound> {
    /// Create a builder for `table` without a database handle.
    pub fn new(table: impl Into<String>) -> Self {
        Self::with_executor(Unbound, table)
    }
}

impl<E: Executor> TableQb<E> {
    /// Create a builder for `table` that runs its statements on `db`.
    pub fn with_executor(db: E, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            db,
            primary_key: OnceCell::new(),
            fragments: Fragments::default(),
        }
    }

    /// Move this builder, including any configured fragments, onto another executor.
    ///
    /// The primary key cache is dropped since it belongs to the old database.
    pub fn bind<E2: Executor>(self, db: E2) -> TableQb<E2> {
        TableQb {
            table: self.table,
            db,
            primary_key: OnceCell::new(),
            fragments: self.fragments,
        }
    }

    /// Table name this builder is bound to.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn executor(&self) -> &E {
        &self.db
    }

    /// Clear every configured fragment.
    pub fn reset(&mut self) -> &mut Self {
        self.fragments = Fragments::default();
        self
    }

    // ==================== Fluent configuration ====================

    /// Replace the projection. An empty string selects `*`.
    pub fn select_fields(&mut self, fields: impl Into<String>) -> &mut Self {
        let fields = fields.into();
        self.fragments.fields = if fields.is_empty() {
            "*".to_string()
        } else {
            fields
        };
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.fragments.alias = alias.into();
        self
    }

    /// Append a raw join clause, e.g. `LEFT JOIN orders o ON o.user_id = u.id`.
    pub fn add_join(&mut self, clause: impl Into<String>) -> &mut Self {
        self.fragments.joins.push(clause.into());
        self
    }

    /// Append a union branch (a complete `SELECT` statement).
    pub fn add_union(&mut self, select: impl Into<String>) -> &mut Self {
        self.fragments.unions.push(select.into());
        self
    }

    /// Replace the WHERE predicate and its bound parameters.
    ///
    /// Placeholders inside `predicate` are positional and must line up with
    /// `params`; the builder does not check this.
    pub fn where_<I, V>(&mut self, predicate: impl Into<String>, params: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.fragments.predicate = predicate.into();
        self.fragments.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the WHERE predicate with one that takes no parameters.
    pub fn where_raw(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.where_(predicate, std::iter::empty::<Value>())
    }

    pub fn limit(&mut self, n: impl Display) -> &mut Self {
        self.fragments.limit = Some(n.to_string());
        self
    }

    /// Set LIMIT and OFFSET together.
    pub fn limit_offset(&mut self, n: impl Display, offset: impl Display) -> &mut Self {
        self.fragments.limit = Some(n.to_string());
        self.fragments.offset = Some(offset.to_string());
        self
    }

    pub fn offset(&mut self, n: impl Display) -> &mut Self {
        self.fragments.offset = Some(n.to_string());
        self
    }

    pub fn group_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.fragments.group_by = expr.into();
        self
    }

    /// Set HAVING. Only emitted when GROUP BY is also set.
    pub fn having(&mut self, expr: impl Into<String>) -> &mut Self {
        self.fragments.having = expr.into();
        self
    }

    pub fn order_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.fragments.order_by = expr.into();
        self
    }

    // ==================== Assembly ====================

    fn ensure_table(&self) -> TableResult<()> {
        if self.table.trim().is_empty() {
            return Err(TableError::config("table name must not be empty"));
        }
        Ok(())
    }

    /// Assemble the configured query without executing it or clearing state.
    pub fn build(&self) -> TableResult<(String, Vec<Value>)> {
        self.ensure_table()?;
        Ok((
            self.fragments.assemble(&self.table),
            self.fragments.params.clone(),
        ))
    }

    /// Assembled SQL text of the configured query.
    pub fn to_sql(&self) -> TableResult<String> {
        self.ensure_table()?;
        Ok(self.fragments.assemble(&self.table))
    }

    /// Parameters bound by the last `where_` call.
    pub fn params(&self) -> &[Value] {
        &self.fragments.params
    }

    /// Take the fragments out of the builder (leaving it fresh) and assemble them.
    fn take_query(&mut self) -> TableResult<(String, Vec<Value>)> {
        let fragments = std::mem::take(&mut self.fragments);
        self.ensure_table()?;
        let sql = fragments.assemble(&self.table);
        Ok((sql, fragments.params))
    }

    // ==================== Terminal reads ====================
    //
    // Terminal reads clear the fragments when called, before the returned
    // future is polled, so a dropped future still leaves a fresh builder.

    /// Run the configured query and return every row.
    pub fn fetch_all(&mut self) -> impl Future<Output = TableResult<Vec<Record>>> {
        let query = self.take_query();
        let db = &self.db;
        async move {
            let (sql, params) = query?;
            db.fetch_all(&sql, &params, FetchStyle::Named).await
        }
    }

    /// Run the configured query and return the first row, or `None` when nothing matches.
    pub fn fetch_one(&mut self) -> impl Future<Output = TableResult<Option<Record>>> {
        let query = self.take_query();
        let db = &self.db;
        async move {
            let (sql, params) = query?;
            db.fetch_one(&sql, &params, FetchStyle::Named).await
        }
    }

    /// [`fetch_all`](Self::fetch_all), deserializing each row into `T`.
    pub fn fetch_all_as<T: DeserializeOwned>(&mut self) -> impl Future<Output = TableResult<Vec<T>>> {
        let rows = self.fetch_all();
        async move { rows.await?.iter().map(|record| record.deserialize()).collect() }
    }

    /// [`fetch_one`](Self::fetch_one), deserializing the row into `T`.
    pub fn fetch_one_as<T: DeserializeOwned>(
        &mut self,
    ) -> impl Future<Output = TableResult<Option<T>>> {
        let row = self.fetch_one();
        async move { row.await?.map(|record| record.deserialize()).transpose() }
    }

    /// Fetch the first column of the first row.
    ///
    /// `column` overrides the projection for this query. Returns `None` when no
    /// row matches or the row has no columns.
    pub fn scalar(
        &mut self,
        column: Option<&str>,
    ) -> impl Future<Output = TableResult<Option<Value>>> {
        if let Some(column) = column {
            self.select_fields(column);
        }
        self.limit(1);
        let query = self.take_query();
        let db = &self.db;
        async move {
            let (sql, params) = query?;
            let record = db.fetch_one(&sql, &params, FetchStyle::Positional).await?;
            Ok(record.and_then(|r| r.into_values().into_iter().next()))
        }
    }

    // ==================== Mutations ====================

    /// Insert one row; returns the generated identifier when the executor reports one.
    pub async fn insert(&self, data: &[(&str, Value)]) -> TableResult<Option<Value>> {
        self.ensure_table()?;
        self.db.insert(&self.table, data).await
    }

    /// Update rows matching `predicate` and return the affected row count.
    pub async fn update(
        &self,
        data: &[(&str, Value)],
        predicate: &str,
        params: &[Value],
    ) -> TableResult<u64> {
        self.ensure_table()?;
        self.db.update(&self.table, data, predicate, params).await
    }

    /// Delete rows matching `predicate`, or every row when it is `None`.
    pub async fn delete(&self, predicate: Option<&str>, params: &[Value]) -> TableResult<u64> {
        self.ensure_table()?;
        self.db.delete(&self.table, predicate, params).await
    }

    /// Delete every row of the table.
    pub async fn delete_all(&self) -> TableResult<u64> {
        self.delete(None, &[]).await
    }

    // ==================== Metadata ====================

    /// Primary key column of the table, looked up once and cached.
    pub async fn primary_key(&self) -> TableResult<Option<String>> {
        self.ensure_table()?;
        let pk = self
            .primary_key
            .get_or_try_init(|| async {
                let pk = self.db.primary_key(&self.table).await?;
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    target: "pgtable.sql",
                    table = %self.table,
                    primary_key = ?pk,
                    "cached primary key"
                );
                Ok::<_, TableError>(pk)
            })
            .await?;
        Ok(pk.clone())
    }

    /// Last statement the executor sent to the database.
    pub fn last_sql(&self) -> Option<String> {
        self.db.last_statement()
    }
}

/// Create a builder for `name` running on `db`.
pub fn table<E: Executor>(db: E, name: impl Into<String>) -> TableQb<E> {
    TableQb::with_executor(db, name)
}

#[cfg(test)]
mod tests;
