//! Error types for the PostgreSQL storage.

use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign key violation (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL error code for undefined table (42P01).
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

pub fn is_unique_violation(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNIQUE_VIOLATION)
}

pub fn is_foreign_key_violation(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_FOREIGN_KEY_VIOLATION)
}

pub fn is_undefined_table(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNDEFINED_TABLE)
}

/// Name of the unique constraint a violation was raised for, if any.
pub fn violated_constraint(err: &SqlxError) -> Option<String> {
    match err {
        SqlxError::Database(db_err) => db_err.constraint().map(str::to_owned),
        _ => None,
    }
}

// =============================================================================
// Pool / migration errors
// =============================================================================

/// Errors raised while connecting or migrating.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PostgresError>;

// =============================================================================
// Storage errors
// =============================================================================

/// Errors returned by the storages.
///
/// Except for `Database`, the display text is meant for clients.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Insufficient stock for product: {name} (available: {available}, requested: {requested})")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i32,
    },
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    #[must_use]
    pub fn insufficient_stock(name: impl Into<String>, available: i64, requested: i32) -> Self {
        Self::InsufficientStock {
            name: name.into(),
            available,
            requested,
        }
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[must_use]
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, Self::InsufficientStock { .. })
    }

    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_database_error()
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::Database(e),
            PostgresError::Migration(m) => StorageError::invalid_input(format!("Migration error: {m}")),
            PostgresError::Config { message } => {
                StorageError::invalid_input(format!("Configuration error: {message}"))
            }
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
