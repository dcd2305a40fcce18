//! # pgtable
//!
//! A fluent, table-bound SQL fragment builder for PostgreSQL.
//!
//! ## Features
//!
//! - **One builder per table**: a [`TableQb`] is created once and reused; every read resets it
//! - **Raw fragments**: projection, joins, unions, predicates and ordering are plain SQL text
//! - **Positional parameters**: values travel separately from the SQL as `Vec<Value>`
//! - **Fixed assembly order**: `SELECT … FROM … AS … JOIN … UNION … WHERE … GROUP BY … HAVING … ORDER BY … LIMIT … OFFSET …`
//! - **Pluggable executor**: the builder talks to an [`Executor`]; [`PgExecutor`] runs on tokio-postgres
//! - **Transaction-friendly**: a `PgExecutor` wraps a client, a pooled connection or a transaction
//!
//! Fragments are not escaped or validated. Treat them as code, never as user input.
//!
//! ## Example
//!
//! ```ignore
//! use pgtable::{PgExecutor, Value};
//!
//! let exec = PgExecutor::new(client);
//! let mut users = exec.table("users");
//!
//! // SELECT id,name FROM users WHERE age > $1 ORDER BY id DESC LIMIT 10
//! let adults = users
//!     .select_fields("id,name")
//!     .where_("age > ?", [18])
//!     .order_by("id DESC")
//!     .limit(10)
//!     .fetch_all()
//!     .await?;
//!
//! // The builder is fresh again.
//! let total = users.scalar(Some("count(*)")).await?;
//!
//! let id = users.insert(&[("name", Value::from("alice"))]).await?;
//! users.update(&[("name", Value::from("alicia"))], "id = ?", &[id.unwrap_or_default()]).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod pg;
pub mod placeholder;
pub mod record;
pub mod table;
pub mod value;

pub use client::GenericClient;
pub use config::{DatabaseConfig, ExecutorConfig};
pub use error::{TableError, TableResult};
pub use executor::{Executor, Unbound};
pub use pg::PgExecutor;
pub use record::{FetchStyle, Record};
pub use table::{TableQb, table};
pub use value::Value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_from_config, create_pool_with_tls};

// Re-export tokio_postgres for convenience
pub use tokio_postgres;

#[cfg(feature = "pool")]
pub use deadpool_postgres;
