use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use chrono::Utc;
use dotenvy::dotenv;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use cella_authz::authz::{defaults, EntityKind, PermissionManager};
use cella_authz::config::{load_policy_rows, AuthzConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "cella-authz migration and policy tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Validate a policy file against the built-in context graph
    PolicyCheck {
        /// Policy JSON file; defaults to AUTHZ_POLICY_PATH or the built-in policy
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Print the context graph and the effective policy table
    PolicyShow {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::PolicyCheck { path } => {
            let manager = load_manager(path)?;
            println!("Policy OK: {} grants", manager.policy().len());
        }
        Commands::PolicyShow { path } => {
            let manager = load_manager(path)?;
            print_policy(&manager);
        }
    }

    Ok(())
}

fn load_manager(path: Option<PathBuf>) -> anyhow::Result<PermissionManager> {
    let mut config = AuthzConfig::from_env()?;
    if let Some(path) = path {
        // Surface file errors before graph validation for a clearer message.
        load_policy_rows(&path)?;
        config.policy_path = Some(path);
    }
    config
        .permission_manager()
        .context("policy failed validation")
}

fn print_policy(manager: &PermissionManager) {
    let graph = manager.graph();

    println!("{:<14} {:<8} {:<22} {}", "Type", "Kind", "Roles", "Ancestors");
    for name in graph.type_names() {
        let (kind, roles) = match graph.kind_of(name) {
            Some(EntityKind::Context { roles }) => ("context", roles.join(",")),
            _ => ("product", String::from("-")),
        };
        let ancestors = graph
            .ancestors_of(name)
            .map(|a| a.iter().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        println!("{:<14} {:<8} {:<22} {}", name, kind, roles, ancestors);
    }

    println!();
    println!("{:<14} {:<14} {:<8} {}", "Subject", "Context", "Role", "Grants");
    for row in manager.policy().rows() {
        println!(
            "{:<14} {:<14} {:<8} {}",
            row.subject, row.context, row.role, row.permissions
        );
    }

    let allowlist = defaults::ENTITY_TYPES.join(",");
    println!();
    println!("Default entity types: {}", allowlist);
}

/// `./migrations` when run from the repository, else the one shipped next to
/// the manifest.
fn migrations_dir() -> PathBuf {
    let local = Path::new("migrations");
    if local.is_dir() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let slug = migration_slug(name);
    if slug.is_empty() {
        anyhow::bail!("migration name `{name}` has no usable characters");
    }

    let path = migrations_dir().join(format!("{}_{}.sql", Utc::now().format("%Y%m%d%H%M%S"), slug));
    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, format!("-- {name}\n"))
        .with_context(|| format!("failed to create migration at {}", path.display()))?;
    Ok(path)
}

/// Lowercase ASCII alphanumerics; every other run of characters becomes one `_`.
fn migration_slug(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn get_migrator() -> anyhow::Result<Migrator> {
    let dir = migrations_dir();
    Migrator::new(dir.clone())
        .await
        .with_context(|| format!("failed to load migrations from {}", dir.display()))
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<HashSet<i64>> {
    let tracked = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
        .fetch_optional(pool)
        .await?
        .is_some();
    if !tracked {
        return Ok(HashSet::new());
    }

    let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<i64, _>("version").map_err(Into::into))
        .collect()
}

async fn print_status(pool: &SqlitePool, migrator: &Migrator) -> anyhow::Result<()> {
    let applied = applied_versions(pool).await?;

    println!("{:<8} {:<16} {}", "Status", "Version", "Description");
    for migration in migrator.iter() {
        let status = if applied.contains(&migration.version) { "applied" } else { "pending" };
        println!("{:<8} {:<16} {}", status, migration.version, migration.description.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_separators() {
        assert_eq!(migration_slug("Add memberships index"), "add_memberships_index");
        assert_eq!(migration_slug("--archive  flag--"), "archive_flag");
        assert_eq!(migration_slug("!!"), "");
    }
}
