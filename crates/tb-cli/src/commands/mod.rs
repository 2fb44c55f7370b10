pub mod preflight;
pub mod run;

use std::path::PathBuf;

use tb_core::updater::PreflightRules;

/// Flags shared by every subcommand.
pub struct GlobalOptions {
    pub repo: PathBuf,
    pub remote: String,
    pub require_clean: bool,
    pub log_level: String,
}

impl GlobalOptions {
    pub fn rules(&self) -> PreflightRules {
        PreflightRules {
            remote: self.remote.clone(),
            require_clean: self.require_clean,
        }
    }
}
