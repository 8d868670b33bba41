use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tundra")]
#[command(about = "Tundra admin CLI: database migrations and seed data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage schema migrations
    Migrate(MigrateArgs),
    /// Create the default users and catalog products if missing
    Seed,
}

#[derive(clap::Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommands,
}

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Apply all pending migrations
    Up,
    /// Revert migrations newer than the target version (default: the newest one)
    Down {
        /// Version to revert to; 0 reverts everything
        #[arg(long)]
        target: Option<i64>,
    },
    /// List migrations and whether they are applied
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_down_target() {
        let cli = Cli::try_parse_from([
            "tundra",
            "--database-url",
            "postgres://localhost/tundra",
            "migrate",
            "down",
            "--target",
            "3",
        ])
        .unwrap();
        assert_eq!(
            cli.database_url.as_deref(),
            Some("postgres://localhost/tundra")
        );
        match cli.command {
            Commands::Migrate(MigrateArgs {
                command: MigrateCommands::Down { target },
            }) => assert_eq!(target, Some(3)),
            _ => panic!("expected migrate down"),
        }
    }

    #[test]
    fn test_parse_seed() {
        let cli = Cli::try_parse_from(["tundra", "seed"]).unwrap();
        assert!(matches!(cli.command, Commands::Seed));
    }
}
