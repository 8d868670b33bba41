use anyhow::Result;
use tundra_db_postgres::{PgPool, migrations};

use crate::output::{migration_table, print_skipped, print_success};

pub async fn up(pool: &PgPool) -> Result<()> {
    let before = migrations::applied_versions(pool).await?;
    migrations::run(pool).await?;
    let after = migrations::applied_versions(pool).await?;

    let applied = after.len().saturating_sub(before.len());
    if applied == 0 {
        print_skipped("Database is up to date");
    } else {
        print_success(&format!("Applied {applied} migration(s)"));
    }
    Ok(())
}

/// Without a target only the newest applied migration is reverted.
pub async fn down(pool: &PgPool, target: Option<i64>) -> Result<()> {
    let applied = migrations::applied_versions(pool).await?;
    let target = match target {
        Some(t) => t,
        None => match migrations::previous_target(&applied) {
            Some(t) => t,
            None => {
                print_skipped("No migrations applied");
                return Ok(());
            }
        },
    };

    migrations::undo(pool, target).await?;
    let remaining = migrations::applied_versions(pool).await?;
    print_success(&format!(
        "Reverted {} migration(s), now at version {target}",
        applied.len().saturating_sub(remaining.len())
    ));
    Ok(())
}

pub async fn status(pool: &PgPool) -> Result<()> {
    let rows = migrations::status(pool).await?;
    println!("{}", migration_table(&rows));
    Ok(())
}
