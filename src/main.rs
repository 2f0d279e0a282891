//! report-ingest CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use report_ingest::{
    commands::{
        cmd_check, cmd_init, cmd_process, cmd_status, cmd_tasks, print_check,
        print_process_report, print_status, print_tasks, InitOptions,
    },
    config::Config,
    error::Result,
    meta::open_record_store,
    models::Source,
    pipeline::{Pipeline, TaskRegistry},
    progress::LogWriterFactory,
    store::QdrantIndex,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "report-ingest")]
#[command(
    version,
    about = "Classify, index and extract structured data from commodity market reports",
    long_about = None
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and create the record schema
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// Skip creating the Qdrant collections
        #[arg(long)]
        skip_collections: bool,
    },

    /// Process PDF reports (files or directories)
    Process {
        /// Files or directories to process
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Documents processed at once (defaults to pipeline.max_concurrent_documents)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show what is known about a file
    Check {
        /// PDF file to check
        path: PathBuf,
    },

    /// List registered extraction tasks
    Tasks {
        /// Only tasks for this source
        #[arg(long)]
        source: Option<Source>,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(LogWriterFactory::default()))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(LogWriterFactory::default()))
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Init {
            force,
            skip_collections,
        } => {
            let (base_dir, config_path) = init_locations(cli.config);
            let config = cmd_init(InitOptions {
                base_dir,
                config_path,
                force,
                create_collections: !skip_collections,
            })
            .await?;

            println!("✓ report-ingest initialized successfully");
            println!("  Config: {}", config.paths.config_file.display());
            println!("\nNext steps:");
            println!("  1. Set {} for the extraction service", config.extraction.api_key_env);
            println!("  2. Start Qdrant: docker run -p 6334:6334 qdrant/qdrant");
            println!("  3. Process reports: report-ingest process /path/to/reports");
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "report-ingest", &mut std::io::stdout());
        }

        Commands::Tasks { source } => {
            let tasks = cmd_tasks(&TaskRegistry::standard(), source);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }

        Commands::Process { paths, concurrency } => {
            let config = load_config(cli.config.as_deref())?;
            let pipeline = Pipeline::from_config(&config).await?;
            let concurrency = concurrency.unwrap_or(config.pipeline.max_concurrent_documents);

            let report = cmd_process(&pipeline, &paths, concurrency).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_process_report(&report);
            }
            if report.has_errors() {
                std::process::exit(2);
            }
        }

        Commands::Check { path } => {
            let config = load_config(cli.config.as_deref())?;
            let records = open_record_store(&config).await?;
            let index = QdrantIndex::connect(&config)?;

            let info = cmd_check(&config, records.as_ref(), &index, &path).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_check(&info);
            }
        }

        Commands::Status => {
            let config = load_config(cli.config.as_deref())?;
            let records = open_record_store(&config).await?;
            records.init_schema().await?;
            let index = QdrantIndex::connect(&config)?;

            let status = cmd_status(&config, records.as_ref(), &index).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

/// Base directory and config path for `init`. A `.toml` path names the file,
/// anything else names the directory.
fn init_locations(config: Option<PathBuf>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => {
            let config_path = dir.join("config.toml");
            (dir, config_path)
        }
        None => {
            let base = Config::default_base_dir();
            let config_path = base.join("config.toml");
            (base, config_path)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    Config::load(&config_path)
}
