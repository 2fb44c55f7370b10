mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tb_core::updater::DEFAULT_REMOTE;

const DEFAULT_CONFIG: &str = "config.toml";
const DEFAULT_LOG_FILE: &str = "turbo.log";

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// turbo -- self-updating bot bootstrap.
#[derive(Parser)]
#[command(name = "turbo", version, about)]
struct Cli {
    /// Repository root to keep up to date (defaults to the current directory).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Remote to pull from.
    #[arg(long, global = true, default_value = DEFAULT_REMOTE)]
    remote: String,

    /// Skip the update when tracked files have uncommitted changes.
    #[arg(long, global = true)]
    require_clean: bool,

    /// Console log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Self-update, then load config and document (default when no subcommand is given).
    Run(RunArgs),

    /// Show whether the working copy would be updated, without pulling.
    Preflight {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Settings file.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Optional YAML document to load after the settings.
    #[arg(long)]
    document: Option<PathBuf>,

    /// Do not self-update.
    #[arg(long)]
    no_update: bool,

    /// File sink for debug-level logs (truncated on start).
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Emit console logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG),
            document: None,
            no_update: false,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            json_logs: false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let repo = match cli.repo {
        Some(repo) => repo,
        None => std::env::current_dir()?,
    };
    let global = commands::GlobalOptions {
        repo,
        remote: cli.remote,
        require_clean: cli.require_clean,
        log_level: cli.log_level,
    };

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => commands::run::run(
            &global,
            commands::run::RunOptions {
                config: args.config,
                document: args.document,
                no_update: args.no_update,
                log_file: args.log_file,
                json_logs: args.json_logs,
            },
        ),
        Commands::Preflight { json } => commands::preflight::run(&global, json),
    }
}
