//! Equalify CLI: reconcile scan documents into a local database.
//!
//! Usage:
//!   equalify [--db path] [--config path] ingest --property ID FILE...
//!   equalify [--db path] [--config path] property <create NAME | list>

use clap::{Parser, Subcommand};
use equalify_reconcile::{
    BatchSummary, EngineConfig, PropertyId, Reconciler, ScanDocument, ScanStore, SqliteStore,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "equalify",
    version,
    about = "Reconcile accessibility scan results and track equalified nodes"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile scan documents, one transaction per file
    Ingest {
        /// Property the scanned URLs belong to
        #[arg(long)]
        property: PropertyId,
        /// Scan result JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Manage properties
    Property {
        #[command(subcommand)]
        action: PropertyAction,
    },
}

#[derive(Subcommand)]
enum PropertyAction {
    /// Create a new property
    Create {
        /// Name for the new property
        name: String,
    },
    /// List all properties
    List,
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("Warning: invalid log filter '{}' ({}), using 'info'", filter, e);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &EngineConfig) -> Result<SqliteStore, String> {
    let db_path = config.db_path();
    SqliteStore::open_with_timeout(&db_path, config.busy_timeout())
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

fn read_document(path: &Path) -> Result<ScanDocument, String> {
    let file = File::open(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    ScanDocument::from_reader(BufReader::new(file))
        .map_err(|e| format!("malformed document '{}': {}", path.display(), e))
}

fn cmd_ingest(store: SqliteStore, property: PropertyId, files: &[PathBuf]) -> i32 {
    let reconciler = Reconciler::new(store);
    let mut summary = BatchSummary::default();

    for path in files {
        let outcome = read_document(path).and_then(|doc| {
            reconciler
                .reconcile(doc, property)
                .map_err(|e| format!("'{}': {}", path.display(), e))
        });
        match outcome {
            Ok(report) => {
                summary.record_success(&report);
                let line = serde_json::json!({
                    "file": path.display().to_string(),
                    "report": report,
                });
                println!("{}", line);
            }
            Err(e) => {
                summary.record_failure();
                error!(file = %path.display(), "ingest failed");
                eprintln!("Error: {}", e);
            }
        }
    }

    match serde_json::to_string(&serde_json::json!({ "summary": summary })) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("Error: cannot encode summary: {}", e),
    }

    if summary.has_failures() {
        1
    } else {
        0
    }
}

fn cmd_property_create(store: &SqliteStore, name: &str) -> i32 {
    let name = name.trim();
    if name.is_empty() {
        eprintln!("Error: property name must not be empty");
        return 1;
    }
    match store.atomically(|tx| tx.create_property(name)) {
        Ok(id) => {
            println!("Created property '{}' ({})", name, id);
            0
        }
        Err(e) if e.is_constraint_violation() => {
            eprintln!("Error: property '{}' already exists", name);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_property_list(store: &SqliteStore) -> i32 {
    let properties = match store.atomically(|tx| tx.list_properties()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if properties.is_empty() {
        println!("No properties defined.");
        return 0;
    }
    println!("{:>8}  {}", "ID", "NAME");
    println!("{}", "-".repeat(40));
    for property in properties {
        println!("{:>8}  {}", property.id, property.name);
    }
    0
}

fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::load(cli.config.as_deref()).and_then(EngineConfig::with_env) {
        Ok(mut config) => {
            if let Some(db) = cli.db {
                config.database.path = Some(db);
            }
            config
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    init_logging(&config.logging.filter);

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Ingest { property, files } => cmd_ingest(store, property, &files),
        Commands::Property { action } => match action {
            PropertyAction::Create { name } => cmd_property_create(&store, &name),
            PropertyAction::List => cmd_property_list(&store),
        },
    };
    std::process::exit(code);
}
