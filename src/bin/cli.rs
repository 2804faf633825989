//! shadowtab CLI
//!
//! Command-line administration for series and their shadow indexes:
//! - Create and describe series
//! - Create, drop, probe and audit shadow indexes
//! - Count, query and explain requests

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use shadowtab::config::{generate_default_config, LoggingConfig};
use shadowtab::planner::{PlanSummary, QueryRequest};
use shadowtab::store::{Cell, RelationalStore};
use shadowtab::{Config, SeriesDefinition, Session};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "shadowtab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Shadow-index administration for versioned record series")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a series from a JSON definition file
    CreateSeries {
        /// Definition file
        path: PathBuf,
    },

    /// Show a series' keywords and shadow state
    Describe { series: String },

    /// Check whether a series has its shadow index
    ShadowExists { series: String },

    /// Build a series' shadow index
    CreateShadow {
        series: String,
        /// Build a standalone copy under this name
        #[arg(long)]
        alt: Option<String>,
    },

    /// Drop a series' shadow index and its triggers
    DropShadow {
        series: String,
        #[arg(long)]
        alt: Option<String>,
    },

    /// Compare a shadow index with its primary table
    CheckShadow { series: String },

    /// Count current versions
    Count(RequestArgs),

    /// Select current versions
    Query(RequestArgs),

    /// Show the statements a query would run
    Explain(RequestArgs),

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct RequestArgs {
    series: String,
    /// Columns to return (default: all)
    #[arg(short = 'C', long, value_delimiter = ',')]
    columns: Vec<String>,
    /// Predicate on primary-key attributes
    #[arg(long)]
    pk: Option<String>,
    /// Predicate on other attributes
    #[arg(long)]
    npk: Option<String>,
    /// Keep only the smallest value of this primary-key attribute
    #[arg(long)]
    first: Vec<String>,
    /// Keep only the largest value of this primary-key attribute
    #[arg(long)]
    last: Vec<String>,
    #[arg(short, long)]
    limit: Option<u64>,
    /// First N groups
    #[arg(long, conflicts_with = "last_n")]
    top: Option<u64>,
    /// Last N groups, in descending order
    #[arg(long)]
    last_n: Option<u64>,
    /// Read through a cursor
    #[arg(long)]
    stream: bool,
    /// Plan as a count
    #[arg(long)]
    count: bool,
}

impl RequestArgs {
    fn request(&self, count: bool) -> QueryRequest {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let mut req = if count {
            QueryRequest::count()
        } else {
            QueryRequest::select(&columns)
        };
        if let Some(pk) = &self.pk {
            req = req.pk_filter(pk.as_str());
        }
        if let Some(npk) = &self.npk {
            req = req.npk_filter(npk.as_str());
        }
        for attr in &self.first {
            req = req.first(attr);
        }
        for attr in &self.last {
            req = req.last(attr);
        }
        if let Some(n) = self.limit {
            req = req.limit(n);
        }
        if let Some(n) = self.top {
            req = req.top(n);
        }
        if let Some(n) = self.last_n {
            req = req.last_n(n);
        }
        req.streaming(self.stream)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path).with_context(|| format!("loading {:?}", path))?,
        None => Config::load_default(),
    };
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }
    init_logging(&config.logging)?;

    if let Commands::Config { output } = &cli.command {
        let text = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &text)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", text),
        }
        return Ok(());
    }

    let session = Session::open(&config)
        .with_context(|| format!("opening store {}", config.store.path))?;
    let json = cli.format == "json";

    match &cli.command {
        Commands::CreateSeries { path } => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            let definition = SeriesDefinition::from_json(&text)?;
            if definition.create_shadow {
                session.enable_shadow_creation(true);
            }
            let series = session.create_series(&definition)?;
            println!(
                "Created {} with primary key ({})",
                series.name(),
                series.primary_keys().join(", ")
            );
        }

        Commands::Describe { series } => {
            let s = session.series(series)?;
            let present = session.shadow_index_exists(series)?;
            if json {
                let attributes: Vec<_> = s.attributes().iter().collect();
                let out = serde_json::json!({
                    "name": s.name(),
                    "description": s.description(),
                    "primary_key": s.primary_keys(),
                    "attributes": attributes,
                    "shadow_index": present,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Series: {}", s.name());
                if !s.description().is_empty() {
                    println!("Description: {}", s.description());
                }
                println!("Primary key: {}", s.primary_keys().join(", "));
                println!("Shadow index: {}", if present { "present" } else { "absent" });
                println!();
                println!("{:<20} {:<10} {:<8} {}", "Keyword", "Type", "Unit", "Rank");
                println!("{}", "-".repeat(46));
                for a in s.attributes() {
                    println!(
                        "{:<20} {:<10} {:<8} {}",
                        a.name,
                        a.ty.name(),
                        a.unit.as_deref().unwrap_or("-"),
                        a.rank
                    );
                }
            }
        }

        Commands::ShadowExists { series } => {
            let present = session.shadow_index_exists(series)?;
            println!("{}", present);
            if !present {
                std::process::exit(1);
            }
        }

        Commands::CreateShadow { series, alt } => {
            // Running this command is the explicit enable
            session.enable_shadow_creation(true);
            let outcome = session.create_shadow_index(series, alt.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{:?}", outcome);
            }
        }

        Commands::DropShadow { series, alt } => {
            if session.drop_shadow_index(series, alt.as_deref())? {
                println!("Dropped shadow index of {}", series);
            } else {
                println!("No shadow index to drop for {}", series);
            }
        }

        Commands::CheckShadow { series } => {
            let report = session.check_shadow(series)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Groups: {}", report.groups);
                println!("Shadow rows: {}", report.shadow_rows);
                println!("Missing: {}", report.missing.len());
                println!("Stale: {}", report.stale.len());
                println!("Orphans: {}", report.orphans.len());
            }
            if !report.is_consistent() {
                bail!("shadow index of {} is inconsistent", series);
            }
        }

        Commands::Count(args) => {
            let n = session.count(&args.series, &args.request(true))?;
            println!("{}", n);
        }

        Commands::Query(args) => {
            let request = args.request(false);
            let plan = session.plan(&args.series, &request)?;
            let columns = plan.columns.clone();
            let mut rows: Vec<Vec<Cell>> = Vec::new();
            if request.streaming {
                session.stream(&args.series, &request, &mut |row| {
                    rows.push(row.clone());
                    true
                })?;
            } else {
                rows = session.select(&args.series, &request)?.rows;
            }
            print_rows(&columns, &rows, json)?;
        }

        Commands::Explain(args) => {
            let plan = session.plan(&args.series, &args.request(args.count))?;
            let summary: PlanSummary = plan.summary(session.store().dialect())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Strategy: {}", summary.strategy);
                for (i, stmt) in summary.statements.iter().enumerate() {
                    println!("{:>2}. {}", i + 1, stmt);
                }
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shadowtab={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);
    let json = config.format == "json";

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            let writer = Mutex::new(file);
            if json {
                registry.with(fmt::layer().json().with_writer(writer)).init();
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init();
            }
        }
        None if json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        None => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
    Ok(())
}

fn cell_json(cell: &Cell) -> serde_json::Value {
    match cell {
        Cell::Null => serde_json::Value::Null,
        Cell::Integer(v) => serde_json::json!(v),
        Cell::Real(v) => serde_json::json!(v),
        Cell::Text(s) => serde_json::json!(s),
    }
}

fn print_rows(columns: &[String], rows: &[Vec<Cell>], json: bool) -> Result<()> {
    if json {
        let out: Vec<serde_json::Map<String, serde_json::Value>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(cell_json))
                    .collect()
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No rows");
        return Ok(());
    }
    println!("{}", columns.join("\t"));
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|c| c.to_text().unwrap_or_else(|| "NULL".to_string()))
            .collect();
        println!("{}", cells.join("\t"));
    }
    println!("\n{} rows", rows.len());
    Ok(())
}
