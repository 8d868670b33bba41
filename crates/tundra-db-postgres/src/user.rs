//! User storage.

use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::instrument;
use tundra_core::{NewUser, Role, User};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult, violated_constraint};

pub const USERNAME_TAKEN: &str = "Username is already taken";
pub const EMAIL_TAKEN: &str = "Email is already registered";

type UserTuple = (Uuid, String, String, String, String, OffsetDateTime, OffsetDateTime);

const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at, updated_at";

fn from_tuple(row: UserTuple) -> StorageResult<User> {
    let role: Role = row
        .4
        .parse()
        .map_err(|e: tundra_core::ValidationError| StorageError::invalid_input(e.to_string()))?;
    Ok(User {
        id: row.0,
        username: row.1,
        email: row.2,
        password_hash: row.3,
        role,
        created_at: row.5,
        updated_at: row.6,
    })
}

/// Maps a unique violation on `users` to the message clients see.
fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(c) if c.contains("email") => EMAIL_TAKEN,
        _ => USERNAME_TAKEN,
    }
}

/// Account storage backed by the `users` table.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserTuple> = query_as(&sql).bind(id).fetch_optional(self.pool).await?;
        row.map(from_tuple).transpose()
    }

    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        row.map(from_tuple).transpose()
    }

    #[instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        row.map(from_tuple).transpose()
    }

    /// Inserts a new account.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` with the username or email message when the unique
    /// constraint is hit, which covers a registration racing the pre-checks.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn create(&self, user: NewUser) -> StorageResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row: UserTuple = query_as(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(self.pool)
            .await
            .map_err(|e| {
                if let sqlx_core::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    let constraint = violated_constraint(&e);
                    return StorageError::conflict(conflict_message(constraint.as_deref()));
                }
                StorageError::from(e)
            })?;

        from_tuple(row)
    }

    pub async fn count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
