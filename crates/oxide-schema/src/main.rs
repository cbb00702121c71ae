//! oxide-schema CLI
//!
//! Command-line tool for reconciling declared schemas with a live database.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::prelude::*;

/// Declarative table schemas with live reconciliation.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (`mysql://...` or `sqlite:...`).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Maximum pooled connections.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or reconcile every table declared in a file.
    Sync {
        /// JSON file holding an array of schema declarations.
        file: PathBuf,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a live table's structure as JSON.
    Inspect {
        /// Table name.
        table: String,
    },

    /// Print the rows of a declared table matching an example.
    Find {
        /// JSON file holding an array of schema declarations.
        schemas: PathBuf,

        /// Schema (table) name.
        table: String,

        /// Example as a JSON object.
        #[arg(default_value = "{}")]
        example: String,
    },

    /// Show or set the schema version.
    Version {
        /// New version to store.
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = StoreConfig::new(&cli.database).max_connections(cli.max_connections);
    let executor = SqlxExecutor::connect(&config).await?;
    let mut catalog = Catalog::new(Arc::new(executor));

    match cli.command {
        Commands::Sync { file, dry_run } => {
            let schemas = load_declarations(&file)?;
            info!(count = schemas.len(), file = %file.display(), "Loaded declarations");

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
                for schema in schemas {
                    let name = schema.name.clone();
                    catalog.define(schema)?;
                    let sql = if catalog.exists(&name).await? {
                        catalog.plan(&name).await?.sql(catalog.dialect())
                    } else {
                        catalog
                            .dialect()
                            .create_table_sql(catalog.get_schema(&name)?)
                    };
                    println!("-- {name}");
                    for statement in sql {
                        println!("{statement};");
                    }
                }
                return Ok(());
            }

            let mut failed = 0;
            for schema in schemas {
                let name = schema.name.clone();
                let outcome = catalog.add(schema).await?;
                if outcome.is_failed() {
                    failed += 1;
                }
                println!("{name}: {outcome:?}");
            }
            catalog.start().await?;
            if failed > 0 {
                warn!(failed, "Some tables could not be reconciled");
            }
        }

        Commands::Inspect { table } => {
            let live = catalog.introspect(&table).await?;
            println!("{}", serde_json::to_string_pretty(&live)?);
        }

        Commands::Find {
            schemas,
            table,
            example,
        } => {
            for schema in load_declarations(&schemas)? {
                catalog.define(schema)?;
            }
            let example: Record = serde_json::from_str(&example)?;
            let rows = catalog.find(&table, &example).await?;
            let rows: Vec<Record> = rows
                .into_iter()
                .map(|row| catalog.clean(&table, row))
                .collect::<oxide_schema::Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Version { set } => {
            let last = catalog.last_version().await?;
            if let Some(version) = set {
                catalog.set_version(&version).await?;
                info!(from = %last, to = %version, "Schema version updated");
            } else {
                let current = catalog.current_version().await?.unwrap_or_default();
                println!("last: {last}");
                println!("current: {current}");
            }
        }
    }

    Ok(())
}
