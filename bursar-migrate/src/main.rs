//! Bursar Migration CLI Tool
//!
//! Inspects and applies the schema migrations bundled with the `bursar`
//! library. The service applies pending migrations on startup; this tool is
//! for operators and CI pipelines that want to do it explicitly.

use anyhow::{bail, Context, Result};
use bursar::connection::connect;
use bursar::executor::{MayPostgresExecutor, SqlExecutor};
use bursar::migration::{MigrationStatus, Migrator};
use clap::{Parser, Subcommand};
use std::process;

#[derive(Parser)]
#[command(name = "bursar-migrate")]
#[command(about = "Migration management tool for the bursar service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status (applied vs pending)
    Status,

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Print the statements that would run
        #[arg(long)]
        dry_run: bool,
    },

    /// Rollback migrations
    Down {
        /// Number of migrations to rollback (default: 1)
        #[arg(long, default_value = "1")]
        steps: usize,

        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate checksums of applied migrations
    Validate,

    /// Show detailed migration information
    Info {
        /// Show information for a specific migration version
        #[arg(long)]
        version: Option<i64>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("✅ Success");
            }
        }
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            process::exit(1);
        }
    }
}

fn database_url(cli: &Cli) -> Result<String> {
    cli.database_url
        .clone()
        .or_else(|| std::env::var("BURSAR__DATABASE__URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context(
            "Database URL not provided. Use --database-url or set BURSAR__DATABASE__URL \
             or DATABASE_URL",
        )
}

fn run(cli: &Cli) -> Result<()> {
    let url = database_url(cli)?;
    let client = connect(&url).context("connecting to database")?;
    let executor = MayPostgresExecutor::new(client);
    let migrator = Migrator::bundled();

    match &cli.command {
        Commands::Status => handle_status(&migrator, &executor),
        Commands::Up { steps, dry_run } => handle_up(&migrator, &executor, *steps, *dry_run),
        Commands::Down { steps, dry_run } => handle_down(&migrator, &executor, *steps, *dry_run),
        Commands::Validate => {
            println!("Validating checksums...");
            migrator.validate_checksums(&executor)?;
            println!("✅ All checksums valid");
            Ok(())
        }
        Commands::Info { version } => handle_info(&migrator, &executor, *version),
    }
}

fn handle_status(migrator: &Migrator, executor: &dyn SqlExecutor) -> Result<()> {
    let status = migrator.status(executor)?;

    println!("\n📊 Migration Status\n");
    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied.len());
        for record in &status.applied {
            let time_str = record
                .execution_time_ms
                .map_or_else(|| "N/A".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  ✓ m{}_{} ({}, {})",
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time_str
            );
        }
    }

    println!();
    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending.len());
        for pending in &status.pending {
            println!("  ⏳ m{}_{} (pending)", pending.version, pending.name);
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied.len(),
        status.pending.len()
    );
    Ok(())
}

fn handle_up(
    migrator: &Migrator,
    executor: &dyn SqlExecutor,
    steps: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        let status = migrator.status(executor)?;
        if status.pending.is_empty() {
            println!("No pending migrations to apply");
            return Ok(());
        }
        let to_apply = steps.unwrap_or(status.pending.len());
        println!("Would apply {to_apply} migration(s):");
        for pending in status.pending.iter().take(to_apply) {
            println!("\n-- m{}_{}", pending.version, pending.name);
            if let Some(m) = migrator.migrations().iter().find(|m| m.version == pending.version) {
                for statement in m.up {
                    println!("{};", statement.trim());
                }
            }
        }
        return Ok(());
    }

    println!("Applying migrations...");
    let applied = migrator.up(executor, steps)?;
    if applied > 0 {
        println!("✅ Successfully applied {applied} migration(s)");
    } else {
        println!("✅ No migrations to apply");
    }
    Ok(())
}

fn handle_down(
    migrator: &Migrator,
    executor: &dyn SqlExecutor,
    steps: usize,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        let status = migrator.status(executor)?;
        if status.applied.is_empty() {
            println!("No applied migrations to rollback");
            return Ok(());
        }
        let mut applied = status.applied;
        applied.sort_by_key(|m| std::cmp::Reverse(m.version));

        let to_rollback = steps.min(applied.len());
        println!("Would rollback {to_rollback} migration(s):");
        for (i, record) in applied.iter().take(to_rollback).enumerate() {
            println!("  {}. m{}_{}", i + 1, record.version, record.name);
        }
        return Ok(());
    }

    println!("Rolling back migrations...");
    let rolled_back = migrator.down(executor, Some(steps))?;
    if rolled_back > 0 {
        println!("✅ Successfully rolled back {rolled_back} migration(s)");
    } else {
        println!("✅ No migrations to rollback");
    }
    Ok(())
}

fn handle_info(migrator: &Migrator, executor: &dyn SqlExecutor, version: Option<i64>) -> Result<()> {
    let status = migrator.status(executor)?;

    let Some(version) = version else {
        print_summary(migrator, &status);
        return Ok(());
    };

    if let Some(record) = status.applied.iter().find(|r| r.version == version) {
        println!("\n📋 Migration Information\n");
        println!("Version: {}", record.version);
        println!("Name: {}", record.name);
        println!("Checksum: {}", record.checksum);
        println!("Applied At: {}", record.applied_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(ms) = record.execution_time_ms {
            println!("Execution Time: {ms}ms");
        }
        println!("Success: {}", record.success);
    } else if let Some(pending) = status.pending.iter().find(|p| p.version == version) {
        println!("\n📋 Migration Information (Pending)\n");
        println!("Version: {}", pending.version);
        println!("Name: {}", pending.name);
        println!("Checksum: {}", pending.checksum);
        println!("Status: Pending");
    } else {
        bail!("no migration with version {version}");
    }
    Ok(())
}

fn print_summary(migrator: &Migrator, status: &MigrationStatus) {
    println!("\n📋 Migration System Information\n");
    println!("Total Migrations: {}", migrator.migrations().len());
    println!("Applied: {}", status.applied.len());
    println!("Pending: {}", status.pending.len());
    if let Some(latest) = status.latest_applied_version() {
        println!("Latest Applied Version: {latest}");
    }
    if let Some(next) = status.next_pending_version() {
        println!("Next Pending Version: {next}");
    }
}
