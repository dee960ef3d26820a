//! Surveyload CLI - import survey-response CSV files
//!
//! # Main Commands
//!
//! ```bash
//! surveyload serve                              # Start HTTP server (port 3000)
//! surveyload import data.csv -s rules.json -t respuestas
//! surveyload check data.csv -s rules.json       # Validate without writing
//! surveyload parse data.csv                     # Just parse CSV to JSON
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use surveyload::{
    parse_bytes, validate, ErrorPolicy, ImportCoordinator, ImportJob, ImportSchema, JobRegistry,
    JobStatus, JsonlStore, ResponseCache, SignalGate, TokioRunner,
};

#[derive(Parser)]
#[command(name = "surveyload")]
#[command(about = "Bulk-import survey response CSV files with schema validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output the raw records as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a CSV file against a rule set without writing anything
    Check {
        /// Input CSV file
        input: PathBuf,

        /// JSON file with the per-column rules
        #[arg(short, long)]
        schema: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output converted records as JSON (default: summary only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a full import into the local JSONL store
    Import {
        /// Input CSV file
        input: PathBuf,

        /// JSON file with the per-column rules
        #[arg(short, long)]
        schema: PathBuf,

        /// Target table name
        #[arg(short, long, default_value = "responses")]
        table: String,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Import valid cells even when the file has errors
        #[arg(long)]
        partial: bool,

        /// Data directory (default: SURVEYLOAD_DATA_DIR or .surveyload/responses)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Delete every stored record of a table
    Drop {
        /// Table name
        table: String,

        /// Data directory (default: SURVEYLOAD_DATA_DIR or .surveyload/responses)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: PORT env var or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Check {
            input,
            schema,
            delimiter,
            output,
        } => cmd_check(&input, &schema, delimiter, output.as_deref()),

        Commands::Import {
            input,
            schema,
            table,
            delimiter,
            partial,
            data_dir,
        } => cmd_import(&input, &schema, &table, delimiter, partial, data_dir),

        Commands::Drop { table, data_dir } => cmd_drop(&table, data_dir),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn data_dir_or_default(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir
        .or_else(|| std::env::var_os("SURVEYLOAD_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(surveyload::DEFAULT_DATA_DIR))
}

fn build_coordinator(data_dir: Option<PathBuf>) -> Arc<ImportCoordinator> {
    let store = Arc::new(JsonlStore::with_dir(data_dir_or_default(data_dir)));
    let cache = Arc::new(ResponseCache::new(SignalGate::new()));
    let jobs = Arc::new(JobRegistry::new());
    Arc::new(ImportCoordinator::new(store, cache, jobs))
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("parsing {}", input.display());

    let bytes = fs::read(input)?;
    let result = parse_bytes(&bytes, delimiter);

    eprintln!("  encoding:  {}", result.encoding);
    eprintln!(
        "  delimiter: '{}'{}",
        format_delimiter(result.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("  columns:   {}", result.headers.join(", "));
    eprintln!("  records:   {}", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_check(
    input: &Path,
    schema_path: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("checking {}", input.display());

    let schema = load_schema(schema_path)?;
    let bytes = fs::read(input)?;
    let parsed = parse_bytes(&bytes, delimiter);
    let out = validate(&parsed.records, &schema);

    eprintln!("  {}", out.summary());

    for err in out.errors.iter().take(10) {
        eprintln!(
            "  row {}, column '{}' (value '{}'): {}",
            err.row, err.column, err.value, err.message
        );
    }
    if out.errors.len() > 10 {
        eprintln!("  ... and {} more", out.errors.len() - 10);
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&out)?;
        fs::write(path, json)?;
        eprintln!("  converted output written to {}", path.display());
    }

    if !out.is_clean() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_import(
    input: &Path,
    schema_path: &Path,
    table: &str,
    delimiter: Option<char>,
    partial: bool,
    data_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("importing {} into table '{}'", input.display(), table);

    let schema_doc = load_schema_doc(schema_path)?;
    // fail on a malformed rule set before creating the job
    ImportSchema::from_json(&schema_doc)?;

    let delimiter = delimiter.or_else(|| {
        let bytes = fs::read(input).ok()?;
        let content =
            surveyload::decode_content(&bytes, &surveyload::detect_encoding(&bytes));
        Some(surveyload::detect_delimiter(&content))
    });

    let policy = if partial {
        ErrorPolicy::Partial
    } else {
        ErrorPolicy::Strict
    };

    let coordinator = build_coordinator(data_dir);
    let job = coordinator.jobs().create(ImportJob::new(
        table,
        input.to_path_buf(),
        delimiter,
        schema_doc,
        policy,
    ));

    coordinator.run_import(job.id);

    let job = coordinator
        .jobs()
        .get(job.id)
        .ok_or("job vanished from registry")?;

    eprintln!("  status:    {}", job.status);
    eprintln!("  rows read: {}", job.total_rows);
    eprintln!("  written:   {}", job.processed_rows);
    if job.error_count > 0 {
        eprintln!("  errors:    {}", job.error_count);
        for err in job.errors.iter().take(5) {
            eprintln!(
                "    row {}, column '{}' (value '{}'): {}",
                err.row, err.column, err.value, err.message
            );
        }
    }
    if let Some(ref message) = job.error_message {
        eprintln!("  failure:   {message}");
    }

    if job.status != JobStatus::Completed {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_drop(table: &str, data_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = build_coordinator(data_dir);
    let removed = coordinator.delete_table(table)?;
    eprintln!("deleted {removed} rows from table '{table}'");
    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(3000);

    let coordinator = build_coordinator(None);
    let runner = Arc::new(TokioRunner::new(Arc::clone(&coordinator)));
    let state = Arc::new(surveyload::server::AppState {
        coordinator,
        runner,
        upload_dir: PathBuf::from(".surveyload/uploads"),
    });

    surveyload::server::start_server(port, state).await
}

fn load_schema(path: &Path) -> Result<ImportSchema, Box<dyn std::error::Error>> {
    Ok(ImportSchema::from_json(&load_schema_doc(path)?)?)
}

fn load_schema_doc(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("output written to {}", p.display());
        }
        None => {
            println!("{content}");
        }
    }
    Ok(())
}
