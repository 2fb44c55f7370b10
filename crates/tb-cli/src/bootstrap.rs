use std::path::PathBuf;

use anyhow::Context;
use tb_core::config::{Config, ConfigError};
use tb_core::document::DocumentLoader;
use tb_core::updater::{
    PreflightRules, SkipReason, SyncResult, UpdateOutcome, UpdateSupervisor, WorkingCopyAdapter,
};
use tracing::{info, warn};

/// Exit status asking the process manager to relaunch from updated code.
pub const EXIT_RESTART: i32 = 1;
/// Exit status for an unusable config file.
///
/// Deliberately the same value as [`EXIT_RESTART`]; operators tell the two
/// apart from the log, not the status.
pub const EXIT_CONFIG_FATAL: i32 = 1;

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub repo_dir: PathBuf,
    pub rules: PreflightRules,
    pub skip_update: bool,
    pub config_path: PathBuf,
    pub document_path: Option<PathBuf>,
}

/// Everything the application needs once startup succeeded.
#[derive(Debug)]
pub struct Ready {
    pub update: UpdateOutcome,
    pub config: Config,
    pub document: Option<serde_yaml::Value>,
}

/// Startup must stop here; the entry point turns this into an exit status.
#[derive(Debug)]
pub enum Halt {
    RestartRequired(SyncResult),
    ConfigFatal(ConfigError),
}

impl Halt {
    pub fn exit_code(&self) -> i32 {
        match self {
            Halt::RestartRequired(_) => EXIT_RESTART,
            Halt::ConfigFatal(_) => EXIT_CONFIG_FATAL,
        }
    }
}

#[derive(Debug)]
pub enum Startup {
    Ready(Ready),
    Halt(Halt),
}

/// Run the startup sequence once.
///
/// Order matters: the update step runs before anything reads settings, so a
/// restart leaves config and document untouched. A failing pull is returned
/// as `Err`.
pub fn bootstrap<A: WorkingCopyAdapter>(
    opts: &BootstrapOptions,
    adapter: A,
) -> anyhow::Result<Startup> {
    let update = if opts.skip_update {
        info!("Skipping update: {}", SkipReason::Disabled);
        UpdateOutcome::Skipped {
            reason: SkipReason::Disabled,
        }
    } else {
        UpdateSupervisor::new(adapter, opts.rules.clone())
            .run(&opts.repo_dir)
            .with_context(|| format!("self-update of {} failed", opts.repo_dir.display()))?
    };

    if let UpdateOutcome::RestartRequired { result } = update {
        return Ok(Startup::Halt(Halt::RestartRequired(result)));
    }

    let config = match Config::load(&opts.config_path) {
        Ok(config) => config,
        Err(e) => return Ok(Startup::Halt(Halt::ConfigFatal(e))),
    };

    let document = opts.document_path.as_ref().and_then(|path| {
        let doc = DocumentLoader::parse(path);
        if doc.is_none() {
            warn!(path = %path.display(), "continuing without document");
        }
        doc
    });

    Ok(Startup::Ready(Ready {
        update,
        config,
        document,
    }))
}
