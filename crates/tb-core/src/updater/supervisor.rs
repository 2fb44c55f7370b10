use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    PreflightOutcome, PreflightRules, Result, SkipReason, SyncResult, UpdateError, UpdateOutcome,
    WorkingCopyAdapter,
};

/// Drives one pass of `preflight -> synchronize -> decide`.
pub struct UpdateSupervisor<A> {
    adapter: A,
    rules: PreflightRules,
}

impl<A: WorkingCopyAdapter> UpdateSupervisor<A> {
    pub fn new(adapter: A, rules: PreflightRules) -> Self {
        Self { adapter, rules }
    }

    pub fn rules(&self) -> &PreflightRules {
        &self.rules
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Decide whether `dir` can be synchronized. First failing check wins.
    ///
    /// Never fails: every problem becomes a [`PreflightOutcome::Skip`].
    pub fn preflight(&self, dir: &Path) -> PreflightOutcome {
        debug!(path = %dir.display(), "using directory as updater path");

        let working_copy = match self.adapter.open(dir) {
            Ok(wc) => wc,
            Err(e) => {
                debug!(error = %e, "open failed");
                return PreflightOutcome::Skip(SkipReason::NotARepository);
            }
        };

        if working_copy.is_bare() {
            return PreflightOutcome::Skip(SkipReason::Bare);
        }

        if self.rules.require_clean {
            match self.adapter.is_dirty(&working_copy) {
                Ok(false) => {}
                Ok(true) => return PreflightOutcome::Skip(SkipReason::Dirty),
                Err(e) => {
                    debug!(error = %e, "status check failed");
                    return PreflightOutcome::Skip(SkipReason::Dirty);
                }
            }
        }

        let name = &self.rules.remote;
        let remote = match self.adapter.find_remote(&working_copy, name) {
            Ok(Some(remote)) => remote,
            Ok(None) => return PreflightOutcome::Skip(SkipReason::RemoteMissing(name.clone())),
            Err(e) => {
                debug!(error = %e, remote = %name, "remote lookup failed");
                return PreflightOutcome::Skip(SkipReason::RemoteMissing(name.clone()));
            }
        };

        if !remote.is_valid() {
            return PreflightOutcome::Skip(SkipReason::RemoteInvalid(name.clone()));
        }

        PreflightOutcome::Proceed {
            working_copy,
            remote,
        }
    }

    /// Run the full update step once.
    ///
    /// Preflight problems come back as [`UpdateOutcome::Skipped`]. A failing
    /// pull is returned as `Err` and is not retried.
    pub fn run(&self, dir: &Path) -> Result<UpdateOutcome> {
        let (working_copy, remote) = match self.preflight(dir) {
            PreflightOutcome::Proceed {
                working_copy,
                remote,
            } => (working_copy, remote),
            PreflightOutcome::Skip(reason) => {
                info!("Skipping update: {reason}");
                return Ok(UpdateOutcome::Skipped { reason });
            }
        };

        let results = self.adapter.pull(&working_copy, &remote)?;
        let count = results.len();

        // Only the first entry is consulted, even when the pull touched several refs.
        let primary = results
            .into_iter()
            .next()
            .ok_or_else(|| UpdateError::EmptySyncResult(remote.name.clone()))?;

        debug!(
            refs = count,
            reference = %primary.reference,
            "pull result was: {} ({})",
            primary.status,
            primary.note
        );
        debug!(commit = %primary.commit, old_commit = ?primary.old_commit, "primary reference");

        Ok(classify(primary))
    }

    /// Evaluate preflight for display, without pulling.
    pub fn report(&self, dir: &Path) -> PreflightReport {
        let outcome = self.preflight(dir);
        let (proceed, skip_reason, remote_url, dirty) = match &outcome {
            PreflightOutcome::Proceed {
                working_copy,
                remote,
            } => (
                true,
                None,
                remote.url.clone(),
                self.adapter.is_dirty(working_copy).ok(),
            ),
            PreflightOutcome::Skip(reason) => (false, Some(reason.clone()), None, None),
        };

        PreflightReport {
            directory: dir.to_path_buf(),
            checked_at: Utc::now(),
            remote: self.rules.remote.clone(),
            remote_url,
            require_clean: self.rules.require_clean,
            dirty,
            proceed,
            skip_reason,
        }
    }
}

/// Map the primary pull result to a terminal outcome.
///
/// A reference with no prior commit (first fetch, or already current) never
/// triggers a restart; one that moved from a known commit always does.
pub fn classify(result: SyncResult) -> UpdateOutcome {
    if result.fetched_new_content() {
        UpdateOutcome::RestartRequired { result }
    } else {
        UpdateOutcome::UpToDate { result }
    }
}

// ---------------------------------------------------------------------------
// PreflightReport
// ---------------------------------------------------------------------------

/// Snapshot of the preflight decision, for the `preflight` subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub directory: PathBuf,
    pub checked_at: DateTime<Utc>,
    pub remote: String,
    pub remote_url: Option<String>,
    pub require_clean: bool,
    /// Only computed when preflight passed.
    pub dirty: Option<bool>,
    pub proceed: bool,
    pub skip_reason: Option<SkipReason>,
}

impl std::fmt::Display for PreflightReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "directory:     {}", self.directory.display())?;
        writeln!(f, "remote:        {}", self.remote)?;
        if let Some(url) = &self.remote_url {
            writeln!(f, "remote url:    {url}")?;
        }
        writeln!(f, "require clean: {}", self.require_clean)?;
        if let Some(dirty) = self.dirty {
            writeln!(f, "dirty:         {dirty}")?;
        }
        match &self.skip_reason {
            None => write!(f, "result:        proceed"),
            Some(reason) => write!(f, "result:        skip ({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
