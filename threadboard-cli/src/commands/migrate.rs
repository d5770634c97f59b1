//! Schema migration command

use anyhow::{Context, Result};
use clap::Parser;

use threadboard_server::db::{create_pool, migrations};

/// Arguments for the migrate command
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL to migrate
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

/// Create board tables and indexes if missing
pub async fn run_migrate(args: MigrateArgs) -> Result<()> {
    let pool = create_pool(&args.database_url)
        .await
        .context("Failed to create database pool")?;

    migrations::run(&pool)
        .await
        .context("Failed to run migrations")?;

    pool.close().await;
    println!("Migrations complete");
    Ok(())
}
