use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;
use tundra_db_postgres::migrations::MigrationStatus;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_skipped(msg: &str) {
    println!("{} {}", "-".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn migration_table(rows: &[MigrationStatus]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Version", "Description", "Status"]);
    for row in rows {
        let status = if row.applied { "applied" } else { "pending" };
        builder.push_record([row.version.to_string(), row.description.to_string(), status.to_string()]);
    }
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_table() {
        let table = migration_table(&[
            MigrationStatus {
                version: 1,
                description: "create users",
                applied: true,
            },
            MigrationStatus {
                version: 2,
                description: "create products",
                applied: false,
            },
        ]);
        assert!(table.contains("create users"));
        assert!(table.contains("applied"));
        assert!(table.contains("pending"));
    }
}
