mod cli;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, MigrateCommands};
use output::print_error;
use tundra_db_postgres::{PostgresConfig, PostgresStore, create_pool};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let url = cli
        .database_url
        .clone()
        .filter(|u| !u.is_empty())
        .context("database URL is required (--database-url or DATABASE_URL)")?;
    let config = PostgresConfig::from_url(url)
        .with_pool_size(2)
        .with_run_migrations(false);

    match &cli.command {
        Commands::Migrate(args) => {
            let pool = create_pool(&config).await?;
            match args.command {
                MigrateCommands::Up => commands::migrate::up(&pool).await?,
                MigrateCommands::Down { target } => commands::migrate::down(&pool, target).await?,
                MigrateCommands::Status => commands::migrate::status(&pool).await?,
            }
        }
        Commands::Seed => {
            // Seeding needs the schema.
            let store = PostgresStore::connect(&config.with_run_migrations(true)).await?;
            commands::seed::run(&store).await?;
        }
    }
    Ok(())
}
