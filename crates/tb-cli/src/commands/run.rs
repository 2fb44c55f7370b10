use std::path::PathBuf;

use tb_cli::bootstrap::{bootstrap, BootstrapOptions, Halt, Startup};
use tb_core::updater::{Git2WorkingCopy, UpdateOutcome};
use tb_telemetry::logging::{LogContext, LogFormat, LogSettings};
use tracing::info;

use super::GlobalOptions;

pub struct RunOptions {
    pub config: PathBuf,
    pub document: Option<PathBuf>,
    pub no_update: bool,
    pub log_file: PathBuf,
    pub json_logs: bool,
}

pub fn run(global: &GlobalOptions, opts: RunOptions) -> anyhow::Result<()> {
    let settings = LogSettings {
        console_level: global.log_level.clone(),
        console_format: if opts.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Human
        },
        file: Some(opts.log_file),
    };
    let logs = LogContext::new("turbo", &settings)?;

    let bootstrap_opts = BootstrapOptions {
        repo_dir: global.repo.clone(),
        rules: global.rules(),
        skip_update: opts.no_update,
        config_path: opts.config,
        document_path: opts.document,
    };

    logs.scope(|| {
        let startup = bootstrap(&bootstrap_opts, Git2WorkingCopy)?;
        match startup {
            Startup::Halt(halt) => {
                if let Halt::RestartRequired(result) = &halt {
                    info!(
                        from = result.old_commit.as_deref().unwrap_or("-"),
                        to = %result.commit,
                        "The repository was updated. Restart this process."
                    );
                }
                std::process::exit(halt.exit_code());
            }
            Startup::Ready(ready) => {
                let updated = match &ready.update {
                    UpdateOutcome::Skipped { reason } => format!("skipped ({reason})"),
                    UpdateOutcome::UpToDate { result } => format!("up to date ({:.7})", result.commit),
                    UpdateOutcome::RestartRequired { .. } => "restart pending".to_string(),
                };
                info!(
                    update = %updated,
                    prefix = %ready.config.general.prefix,
                    selfbot = ready.config.general.selfbot,
                    database = %format!("{}:{}", ready.config.database.host, ready.config.database.port),
                    document = ready.document.is_some(),
                    "bootstrap complete"
                );
                Ok(())
            }
        }
    })
}
