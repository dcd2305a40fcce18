//! Errors raised while assembling, binding or running table queries.

use thiserror::Error;

/// Shorthand for results of builder and executor calls.
pub type TableResult<T> = Result<T, TableError>;

/// Everything that can go wrong between a configured [`TableQb`](crate::TableQb)
/// and the rows it returns.
///
/// Constraint failures reported by PostgreSQL are split out of
/// [`TableError::Query`] by [`TableError::from_db_error`], so callers can react to
/// a duplicate key without matching on SQLSTATE codes.
#[derive(Debug, Error)]
pub enum TableError {
    /// Empty table name, no database handle, or an invalid config file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not parse the connection string or reach the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// PostgreSQL rejected the statement, or a parameter failed to bind.
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// An insert or update hit a unique index (SQLSTATE 23505).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A referenced row is missing or still referenced (SQLSTATE 23503).
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A CHECK constraint rejected the row (SQLSTATE 23514).
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// A fetched column could not be turned into a [`Value`](crate::Value).
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Mutation arguments that can never form a valid statement, such as an
    /// update with no columns.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A [`Record`](crate::Record) did not match the shape of the requested type.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The statement outlived [`ExecutorConfig::timeout`](crate::ExecutorConfig::timeout).
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// No pooled connection could be handed out.
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    #[error("{0}")]
    Other(String),
}

impl TableError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Decode failure for `column`.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Missing table name or database handle, among others.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Classify a driver error by SQLSTATE. Constraint violations carry
    /// `"<constraint>: <message>"`; everything else stays a [`TableError::Query`].
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for TableError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
