//! Skiff - build and deploy applications from the terminal
//!
//! Usage:
//!   skiff up [DIR]...          # Build and deploy, streaming progress
//!   skiff version              # Client and server versions
//!   skiff create --pack DIR    # Seed an application from a pack
//!   skiff history list         # Local build records

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skiff_core::commands::{
    CreateCommand, CreateOptions, CreateReport, HistoryCommand, UpCommand, UpOptions, UpReport,
};
use skiff_core::config::{ConfigStore, SkiffConfig};
use skiff_core::progress::{ColorMode, LineSink, Palette};
use skiff_core::rpc::Client;
use skiff_core::storage::{BuildRecord, BuildStore, FileStore, MemoryStore};
use skiff_core::version::VersionInfo;

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Build and deploy applications to a skiff server", long_about = None)]
#[command(version)]
struct Cli {
    /// Server address (host:port or URL); overrides config and SKIFF_HOST
    #[arg(long, global = true)]
    host: Option<String>,

    /// Path to skiff.toml (default: ~/.config/skiff/skiff.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// When to color progress output
    #[arg(long, global = true, value_enum)]
    color: Option<ColorArg>,

    /// Output format
    #[arg(short = 'o', long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and deploy application directories
    Up(UpArgs),

    /// Show client and server versions
    Version,

    /// Create an application from a starter pack
    Create {
        /// Application directory (default: current directory)
        dest: Option<PathBuf>,

        /// Pack directory to copy from
        #[arg(long)]
        pack: PathBuf,
    },

    /// Inspect local build records
    History(HistoryArgs),
}

#[derive(Args)]
struct UpArgs {
    /// Application directories (default: current directory)
    dirs: Vec<PathBuf>,

    /// Application name (default: directory name)
    #[arg(long)]
    app: Option<String>,

    /// Target namespace
    #[arg(long, short, default_value = skiff_core::commands::up::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Source reference (default: git HEAD of the directory)
    #[arg(long)]
    source_ref: Option<String>,

    /// Use the duplex stream even for a single directory
    #[arg(long)]
    stream: bool,

    /// Do not keep a local build record
    #[arg(long)]
    no_record: bool,
}

#[derive(Args)]
struct HistoryArgs {
    #[command(subcommand)]
    command: HistorySubcommand,
}

#[derive(Subcommand)]
enum HistorySubcommand {
    /// List build records
    List {
        /// Only this application
        app: Option<String>,
    },

    /// Show one build record
    Show { app: String, build_id: String },

    /// Delete one build record, or all records of an application
    #[command(alias = "rm")]
    Delete {
        app: String,
        build_id: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => ColorMode::Auto,
            ColorArg::Always => ColorMode::Always,
            ColorArg::Never => ColorMode::Never,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with progress lines on stdout.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skiff=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Up(args) => run_up(&cli, &config, args).await,
        Commands::Version => run_version(&cli, &config).await,
        Commands::Create { dest, pack } => run_create(&cli, dest.clone(), pack.clone()),
        Commands::History(args) => run_history(&cli, &config, &args.command),
    }
}

fn load_config(cli: &Cli) -> Result<SkiffConfig> {
    let store = match &cli.config {
        Some(path) => ConfigStore::from_path(path.clone()),
        None => ConfigStore::from_default_dir()?,
    };
    let mut config = store.load_with_env()?;
    config.apply_host_override(cli.host.clone());
    if let Some(color) = cli.color {
        config.display.color = color.into();
    }
    Ok(config)
}

fn build_store(config: &SkiffConfig) -> Result<FileStore> {
    let dir = match &config.storage.dir {
        Some(dir) => dir.clone(),
        None => FileStore::default_dir()?,
    };
    Ok(FileStore::new(dir))
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

async fn run_up(cli: &Cli, config: &SkiffConfig, args: &UpArgs) -> Result<()> {
    let client = Client::connect_to(&config.server.host, config.server.connect_timeout())?;
    let store: Box<dyn BuildStore> = if args.no_record {
        Box::new(MemoryStore::new())
    } else {
        Box::new(build_store(config)?)
    };
    let cmd = UpCommand::new(client, store)
        .with_palette(Palette::for_mode(config.display.color))
        .with_tick(config.display.tick())
        .with_anomaly_policy(config.display.anomalies);

    let mut options = UpOptions::default()
        .with_namespace(&args.namespace)
        .with_stream(args.stream)
        .with_record(!args.no_record);
    for dir in &args.dirs {
        options = options.with_app_dir(dir);
    }
    if let Some(app) = &args.app {
        options = options.with_app_name(app);
    }
    if let Some(source_ref) = &args.source_ref {
        options = options.with_source_ref(source_ref);
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    // JSON output owns stdout, so progress moves to stderr.
    let report = match cli.format {
        OutputFormat::Table => {
            cmd.execute(&cancel, &options, Arc::new(LineSink::stdout()))
                .await?
        }
        OutputFormat::Json => {
            cmd.execute(&cancel, &options, Arc::new(LineSink::new(io::stderr())))
                .await?
        }
    };

    print_up_result(cli.format, &report)?;
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_up_result(format: OutputFormat, report: &UpReport) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for warning in &report.warnings {
                println!("⚠ {}", warning);
            }
            if let Some(error) = &report.error {
                eprintln!("Error: {}", error);
            } else if !report.render.incomplete.is_empty() {
                eprintln!(
                    "Unfinished stages: {}",
                    report.render.incomplete.join(", ")
                );
            }
            println!("Build {}", report.build_id);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "build_id": report.build_id,
                "apps": report.apps,
                "succeeded": report.render.succeeded,
                "failed": report.render.failed,
                "incomplete": report.render.incomplete,
                "ignored": report.render.ignored,
                "error": report.error.as_ref().map(|e| e.to_string()),
                "warnings": report.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    io::stdout().flush()?;
    Ok(())
}

async fn run_version(cli: &Cli, config: &SkiffConfig) -> Result<()> {
    let client_version = VersionInfo::client();
    let client = Client::connect_to(&config.server.host, config.server.connect_timeout())?;
    let server_version = client.version().await;

    match cli.format {
        OutputFormat::Table => {
            println!("Client: {}", client_version);
            match &server_version {
                Ok(server) => println!("Server: {}", server),
                Err(_) => println!("Server: unavailable"),
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "client": client_version,
                "server": server_version.as_ref().ok(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    server_version?;
    Ok(())
}

fn run_create(cli: &Cli, dest: Option<PathBuf>, pack: PathBuf) -> Result<()> {
    let options = CreateOptions {
        dest: dest.unwrap_or_else(|| PathBuf::from(".")),
        pack_dir: pack,
    };
    let report = CreateCommand::new().execute(&options)?;
    print_create_result(cli.format, &report)
}

fn print_create_result(format: OutputFormat, report: &CreateReport) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!(
                "✓ Created chart '{}' in {}",
                report.chart,
                report.dest.display()
            );
            if report.dockerfile_kept {
                println!("  Kept existing Dockerfile");
            }
            if let Some(tasks) = &report.tasks_file {
                println!("  Tasks written to {}", tasks.display());
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "dest": report.dest,
                "chart": report.chart,
                "dockerfile_kept": report.dockerfile_kept,
                "tasks_file": report.tasks_file,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn run_history(cli: &Cli, config: &SkiffConfig, command: &HistorySubcommand) -> Result<()> {
    let history = HistoryCommand::new(Box::new(build_store(config)?));
    let records = match command {
        HistorySubcommand::List { app } => history.list(app.as_deref())?,
        HistorySubcommand::Show { app, build_id } => vec![history.show(app, build_id)?],
        HistorySubcommand::Delete { app, build_id } => {
            let removed = history.delete(app, build_id.as_deref())?;
            if let OutputFormat::Table = cli.format {
                println!("✓ Deleted {} build record(s) of '{}'", removed.len(), app);
                return Ok(());
            }
            removed
        }
    };

    match cli.format {
        OutputFormat::Table => print_history_table(&records),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
    }
    Ok(())
}

fn print_history_table(records: &[BuildRecord]) {
    if records.is_empty() {
        println!("No builds recorded.");
        println!("Run one with: skiff up [DIR]");
        return;
    }

    println!(
        "{:<20} {:<28} {:<20} {:<8} Source",
        "App", "Build", "Created", "Result"
    );
    println!("{}", "-".repeat(90));

    for record in records {
        let result = if record.is_success() { "ok" } else { "failed" };
        println!(
            "{:<20} {:<28} {:<20} {:<8} {}",
            record.app_name,
            record.build_id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            result,
            record.source_ref.as_deref().unwrap_or("-"),
        );
    }
}
