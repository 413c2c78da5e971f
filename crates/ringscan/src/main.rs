use std::path::PathBuf;

use clap::Parser;
use ringscan::common::SchemaTableName;
use ringscan::coordinator::{CoordinatorError, Settings};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file; falls back to RINGSCAN_CONFIG_PATH.
    #[arg(short, long)]
    config: Option<String>,

    /// Ring snapshot JSON (nodes and partitions).
    #[arg(long)]
    ring: PathBuf,

    /// Catalog JSON (schemas and their tables).
    #[arg(long)]
    catalog: PathBuf,

    #[arg(long, default_value = "default")]
    schema: String,

    /// Table to scan; `parent/child` names a sub-table.
    #[arg(short, long)]
    table: String,

    /// Predicate JSON; scans everything when omitted.
    #[arg(long)]
    predicate: Option<PathBuf>,

    #[command(flatten)]
    overrides: ringscan::Overrides,
}

#[tokio::main]
async fn main() -> Result<(), CoordinatorError> {
    // Stdout carries the splits.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };
    ringscan::apply_overrides(&mut settings, args.overrides);
    let batch_size = settings.batch_size;

    let manager = ringscan::manager_from_files(&args.ring, &args.catalog, settings)?;
    let predicate = ringscan::predicate_from_file(args.predicate.as_deref())?;
    let table = SchemaTableName::new(args.schema, args.table);

    let source = manager.get_splits(&table, &predicate).await?;
    let mut failed = None;
    let delivered = ringscan::drain(&source, batch_size, |splits| {
        for split in splits {
            match split.to_json() {
                Ok(line) => println!("{}", line),
                Err(e) => {
                    failed.get_or_insert(e);
                }
            }
        }
    });
    if let Some(e) = failed {
        return Err(e.into());
    }

    info!(table = %table, splits = delivered, "all splits handed out");
    Ok(())
}
