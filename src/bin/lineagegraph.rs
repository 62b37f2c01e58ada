//! Operator CLI over a lineage store.
//!
//! Loads the whole graph from a JSON-lines dump or a SQLite database, runs
//! one command and prints JSON to stdout. Logs go to stderr.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use lineagegraph::{
    ChangeType, EngineConfig, ImpactRequest, JsonlSource, LineageEngine, LineageError,
    LineageQuery, LineageSource, PathWeighting, SqliteLineageStore, TraversalAlgorithm,
    TraversalDirection, check_integrity, dump_snapshot_to_path,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lineagegraph")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// JSON-lines dump to load
    #[arg(long)]
    jsonl: Option<PathBuf>,

    /// SQLite lineage database to load
    #[arg(long)]
    sqlite: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Graph size, snapshot version and load report
    Stats,

    /// Referential integrity report; exits 1 when violations exist
    Check,

    /// Traverse lineage from an asset
    Query {
        asset: String,

        /// upstream, downstream or bidirectional
        #[arg(short, long, default_value = "downstream")]
        direction: TraversalDirection,

        #[arg(long, default_value_t = 3)]
        depth: u32,

        /// bfs, dfs, shortest_path, all_paths or critical_path
        #[arg(short, long, default_value = "bfs")]
        algorithm: TraversalAlgorithm,

        /// hops or certainty (shortest_path only)
        #[arg(long, default_value = "hops")]
        weighting: PathWeighting,

        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,

        /// Keep only these asset types (comma separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Downstream impact of changing an asset
    Impact {
        asset: String,

        /// deletion, schema_change, quality_issue, data_update or other
        #[arg(short, long, default_value = "schema_change")]
        change: ChangeType,

        #[arg(long)]
        depth: Option<u32>,
    },

    /// Write the loaded graph as a JSON-lines dump
    Export {
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let engine = match open_engine(&cli) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    match run_command(&engine, cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("command failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn open_engine(cli: &Cli) -> Result<LineageEngine, LineageError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let source: Arc<dyn LineageSource> = match (&cli.source.jsonl, &cli.source.sqlite) {
        (Some(path), _) => Arc::new(JsonlSource::new(path)),
        (None, Some(path)) => Arc::new(open_sqlite(path)?),
        (None, None) => return Err(LineageError::invalid_input("one of --jsonl or --sqlite is required")),
    };
    LineageEngine::builder(config).source(source).build()
}

fn open_sqlite(path: &Path) -> Result<SqliteLineageStore, LineageError> {
    if !path.exists() {
        return Err(LineageError::invalid_input(format!("{} does not exist", path.display())));
    }
    SqliteLineageStore::open(path)
}

fn run_command(engine: &LineageEngine, command: Commands) -> Result<ExitCode, LineageError> {
    match command {
        Commands::Stats => {
            #[derive(Serialize)]
            struct Stats {
                health: lineagegraph::HealthReport,
                load: Option<lineagegraph::LoadReport>,
            }
            print_json(&Stats {
                health: engine.health(),
                load: engine.refresh_status().and_then(|status| status.last_report),
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => {
            let report = check_integrity(&engine.snapshot());
            print_json(&report)?;
            Ok(if report.has_issues() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Query {
            asset,
            direction,
            depth,
            algorithm,
            weighting,
            min_confidence,
            types,
        } => {
            let mut query = LineageQuery::new(asset)
                .direction(direction)
                .max_depth(depth)
                .algorithm(algorithm)
                .weighting(weighting)
                .min_confidence(min_confidence);
            if !types.is_empty() {
                query = query.asset_types(types);
            }
            let graph = engine.query_lineage(&query)?;
            print_json(graph.as_ref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Impact { asset, change, depth } => {
            let mut request = ImpactRequest::new(asset, change);
            request.max_depth = depth;
            print_json(&engine.analyze_impact(&request)?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export { out } => {
            let summary = dump_snapshot_to_path(&engine.snapshot(), &out)?;
            eprintln!("wrote {} nodes and {} edges to {}", summary.nodes, summary.edges, out.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), LineageError> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}
