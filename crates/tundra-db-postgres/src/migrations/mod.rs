//! Embedded, reversible schema migrations.
//!
//! The SQL lives in `migrations/` as `<version>_<name>.up.sql` /
//! `<version>_<name>.down.sql` pairs and is compiled into the binary, so the
//! server and the CLI can migrate without filesystem access. Applied versions
//! are tracked by sqlx in `_sqlx_migrations`.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result, is_undefined_table};

/// Embedded migrations in chronological order: (version, description, up, down).
///
/// To add a migration, create the SQL pair in `migrations/` and add an entry
/// here.
macro_rules! embedded_migrations {
    () => {
        &[
            (
                20250601000001i64,
                "create_users",
                include_str!("../../migrations/20250601000001_create_users.up.sql"),
                include_str!("../../migrations/20250601000001_create_users.down.sql"),
            ),
            (
                20250601000002i64,
                "create_products",
                include_str!("../../migrations/20250601000002_create_products.up.sql"),
                include_str!("../../migrations/20250601000002_create_products.down.sql"),
            ),
            (
                20250601000003i64,
                "create_orders",
                include_str!("../../migrations/20250601000003_create_orders.up.sql"),
                include_str!("../../migrations/20250601000003_create_orders.down.sql"),
            ),
        ]
    };
}

fn embedded() -> &'static [(i64, &'static str, &'static str, &'static str)] {
    embedded_migrations!()
}

/// Builds the up and down `Migration` for every embedded entry.
fn build_migrations() -> Vec<Migration> {
    embedded()
        .iter()
        .flat_map(|(version, description, up, down)| {
            [
                (MigrationType::ReversibleUp, *up),
                (MigrationType::ReversibleDown, *down),
            ]
            .into_iter()
            .map(move |(migration_type, sql)| Migration {
                version: *version,
                description: Cow::Borrowed(*description),
                migration_type,
                sql: Cow::Borrowed(sql),
                checksum: Cow::Borrowed(&[]),
                no_tx: false,
            })
        })
        .collect()
}

fn migrator() -> Migrator {
    Migrator {
        migrations: Cow::Owned(build_migrations()),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    }
}

/// One row of [`status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: &'static str,
    pub applied: bool,
}

/// Applies all pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails; the failing migration is rolled back.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    info!(count = embedded().len(), "Running database migrations (embedded)");

    migrator()
        .run(pool)
        .await
        .map_err(|e| PostgresError::migration(format!("Migration failed: {e}")))?;

    info!("Database migrations completed");
    Ok(())
}

/// Reverts every applied migration newer than `target`. A target of `0`
/// reverts everything.
///
/// # Errors
///
/// Returns an error if a down migration fails.
#[instrument(skip(pool))]
pub async fn undo(pool: &PgPool, target: i64) -> Result<()> {
    info!(target, "Reverting database migrations");

    migrator()
        .undo(pool, target)
        .await
        .map_err(|e| PostgresError::migration(format!("Revert failed: {e}")))?;

    info!("Database migrations reverted");
    Ok(())
}

/// Versions that have been applied successfully, ascending.
///
/// # Errors
///
/// Returns an error if the migrations table cannot be read.
pub async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>> {
    let versions: std::result::Result<Vec<i64>, _> =
        query_scalar("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
            .fetch_all(pool)
            .await;

    match versions {
        Ok(v) => Ok(v),
        Err(e) if is_undefined_table(&e) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Target version for reverting only the newest applied migration.
///
/// Returns `None` when nothing is applied.
pub fn previous_target(applied: &[i64]) -> Option<i64> {
    match applied {
        [] => None,
        [.., prev, _last] => Some(*prev),
        [_only] => Some(0),
    }
}

/// Lists every embedded migration and whether it has been applied.
///
/// # Errors
///
/// Returns an error if the migrations table cannot be read.
pub async fn status(pool: &PgPool) -> Result<Vec<MigrationStatus>> {
    let applied = applied_versions(pool).await?;
    Ok(embedded()
        .iter()
        .map(|(version, description, _, _)| MigrationStatus {
            version: *version,
            description: *description,
            applied: applied.contains(version),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_migration_is_reversible() {
        let migrations = build_migrations();
        assert_eq!(migrations.len(), embedded().len() * 2);
        for pair in migrations.chunks(2) {
            assert_eq!(pair[0].version, pair[1].version);
            assert!(!pair[0].migration_type.is_down_migration());
            assert!(pair[1].migration_type.is_down_migration());
            assert!(!pair[1].sql.trim().is_empty());
        }
    }

    #[test]
    fn test_versions_are_ascending() {
        let versions: Vec<i64> = embedded().iter().map(|m| m.0).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_previous_target() {
        assert_eq!(previous_target(&[]), None);
        assert_eq!(previous_target(&[1]), Some(0));
        assert_eq!(previous_target(&[1, 2, 3]), Some(2));
    }
}
