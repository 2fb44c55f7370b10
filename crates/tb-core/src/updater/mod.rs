//! Self-update supervisor.
//!
//! Runs once at process start: checks that the working copy can be
//! synchronized, pulls from the tracked remote, and reports whether the
//! running code is now stale. The supervisor never exits the process itself;
//! [`UpdateOutcome::RestartRequired`] is handed back to the entry point.

pub mod git2_ops;
pub mod supervisor;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use git2_ops::Git2WorkingCopy;
pub use supervisor::{classify, PreflightReport, UpdateSupervisor};

/// Remote the supervisor syncs with unless told otherwise.
pub const DEFAULT_REMOTE: &str = "origin";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("git operation failed: {0}")]
    Git(String),

    #[error("not a git repository: {0}")]
    NotARepo(String),

    #[error("remote '{0}' not found")]
    RemoteNotFound(String),

    #[error("pull from '{0}' returned no results")]
    EmptySyncResult(String),

    #[error("cannot fast-forward '{branch}' onto '{upstream}'")]
    NotFastForward { branch: String, upstream: String },
}

impl From<git2::Error> for UpdateError {
    fn from(e: git2::Error) -> Self {
        UpdateError::Git(e.message().to_string())
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;

// ---------------------------------------------------------------------------
// Working copy and remote
// ---------------------------------------------------------------------------

/// The on-disk versioned tree the process runs from.
///
/// Only a directory that opened as a repository becomes a `WorkingCopy`, so
/// validity is implied by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCopy {
    root: PathBuf,
    bare: bool,
}

impl WorkingCopy {
    pub fn new(root: impl Into<PathBuf>, bare: bool) -> Self {
        Self {
            root: root.into(),
            bare,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this is a bare repository (no working tree checkout).
    pub fn is_bare(&self) -> bool {
        self.bare
    }
}

/// A named upstream declared in the working copy's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: Option<String>,
}

impl Remote {
    /// Lightweight existence check: the remote has a usable url configured.
    /// No network round-trip.
    pub fn is_valid(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Sync results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The reference did not exist locally before the pull.
    NewHead,
    UpToDate,
    FastForward,
    ForcedUpdate,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::NewHead => "NEW_HEAD",
            SyncStatus::UpToDate => "HEAD_UPTODATE",
            SyncStatus::FastForward => "FAST_FORWARD",
            SyncStatus::ForcedUpdate => "FORCED_UPDATE",
        };
        f.write_str(s)
    }
}

/// Outcome of a pull for one reference.
///
/// `old_commit` is only set when the reference moved: it is `None` both for a
/// reference seen for the first time and for one that was already current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub reference: String,
    pub commit: String,
    pub old_commit: Option<String>,
    pub status: SyncStatus,
    pub note: String,
}

impl SyncResult {
    /// True when the reference had a prior state and now points elsewhere.
    pub fn fetched_new_content(&self) -> bool {
        self.old_commit
            .as_deref()
            .is_some_and(|old| old != self.commit)
    }
}

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

/// Why the update step was skipped. The `Display` text is what gets logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    NotARepository,
    Bare,
    RemoteMissing(String),
    RemoteInvalid(String),
    Dirty,
    Disabled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotARepository => f.write_str("not a valid repository"),
            SkipReason::Bare => f.write_str("repository is bare"),
            SkipReason::RemoteMissing(name) => write!(f, "remote '{name}' does not exist"),
            SkipReason::RemoteInvalid(_) => f.write_str("remote is not valid"),
            SkipReason::Dirty => f.write_str("working tree is dirty"),
            SkipReason::Disabled => f.write_str("updates are disabled"),
        }
    }
}

/// Which preflight checks run, and against which remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightRules {
    pub remote: String,
    /// Skip the update when the working tree has uncommitted changes.
    /// Off by default: a dirty tree is still pulled.
    pub require_clean: bool,
}

impl Default for PreflightRules {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.into(),
            require_clean: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    Proceed {
        working_copy: WorkingCopy,
        remote: Remote,
    },
    Skip(SkipReason),
}

/// Terminal state of one supervisor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UpdateOutcome {
    Skipped { reason: SkipReason },
    /// Pulled, nothing new for the primary reference. Startup continues.
    UpToDate { result: SyncResult },
    /// New content was pulled; the running code is stale.
    RestartRequired { result: SyncResult },
}

impl UpdateOutcome {
    pub fn restart_required(&self) -> bool {
        matches!(self, UpdateOutcome::RestartRequired { .. })
    }
}

// ---------------------------------------------------------------------------
// Adapter seam
// ---------------------------------------------------------------------------

/// Repository access used by the supervisor.
///
/// Implementations are stateless with respect to the supervisor: each call
/// receives the working copy it concerns.
pub trait WorkingCopyAdapter {
    /// Open `dir` as a repository. `Err` means it is not one.
    fn open(&self, dir: &Path) -> Result<WorkingCopy>;

    /// Look up a declared remote by name.
    fn find_remote(&self, wc: &WorkingCopy, name: &str) -> Result<Option<Remote>>;

    /// Uncommitted changes to tracked files (untracked files do not count).
    fn is_dirty(&self, wc: &WorkingCopy) -> Result<bool>;

    /// Fetch from `remote` and integrate into the checked-out branch.
    ///
    /// Returns one entry per fetched reference, in fetch order.
    fn pull(&self, wc: &WorkingCopy, remote: &Remote) -> Result<Vec<SyncResult>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
