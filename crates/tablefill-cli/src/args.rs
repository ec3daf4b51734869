use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// `--table` value that fills every base table of the schema.
pub const ALL_TABLES: &str = "all_tables";

#[derive(Parser, Debug)]
#[command(
    name = "tablefill",
    about = "Bulk-fill PostgreSQL tables with generated rows that respect foreign keys",
    version,
    after_help = "Examples:\n  tablefill fill --table orders --count 1000000\n  tablefill fill --schema sales --table all_tables --count 5000 --order-by-dependencies\n  tablefill fill --table orders --count 250 --sample status --output-dir ./batches\n  tablefill inspect --table orders"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate rows for one table, or every table in a schema, and load them
    Fill(FillArgs),

    /// Show a table's columns, foreign keys and how each column would be filled
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
pub struct FillArgs {
    /// Database connection URL (postgres://)
    /// Falls back to DATABASE_URL env var, .env file or tablefill.toml
    #[arg(long, env = "DATABASE_URL")]
    pub db: Option<String>,

    /// Schema holding the table (default: public)
    #[arg(long)]
    pub schema: Option<String>,

    /// Table to fill, or "all_tables" for every table in the schema
    #[arg(long)]
    pub table: String,

    /// Rows to generate per table
    #[arg(long)]
    pub count: usize,

    /// Rows per bulk-load batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Columns to fill with values sampled from existing rows
    #[arg(long, value_delimiter = ',')]
    pub sample: Vec<String>,

    /// Batch loads allowed to run at the same time
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Random seed for reproducible values
    #[arg(long)]
    pub seed: Option<u64>,

    /// With all_tables, fill referenced tables before the tables pointing at them
    #[arg(long)]
    pub order_by_dependencies: bool,

    /// Write each batch as a delimited file under this directory instead of loading it
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Leave columns of unsupported types to their default instead of failing
    #[arg(long)]
    pub skip_unsupported: bool,

    /// With all_tables, keep going after a table fails
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub db: Option<String>,

    /// Schema holding the table (default: public)
    #[arg(long)]
    pub schema: Option<String>,

    /// Table to inspect
    #[arg(long)]
    pub table: String,

    /// Columns that would be sampled from existing rows
    #[arg(long, value_delimiter = ',')]
    pub sample: Vec<String>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: InspectFormat,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum InspectFormat {
    Table,
    Json,
}

impl FillArgs {
    pub fn all_tables(&self) -> bool {
        self.table == ALL_TABLES
    }
}
