//! libgit2-backed [`WorkingCopyAdapter`].
//!
//! Stateless: the repository is reopened from the working copy root on each
//! call, which avoids stale index state between preflight and pull.
//!
//! A pull here is `fetch` with the remote's configured refspecs followed by a
//! fast-forward of the checked-out branch onto its upstream. Anything that is
//! not a fast-forward is reported as an error; merges and rebases are never
//! attempted.

use std::collections::HashMap;
use std::path::Path;

use git2::{build::CheckoutBuilder, Cred, CredentialType, ErrorCode, Oid};
use tracing::debug;

use super::{Remote, Result, SyncResult, SyncStatus, UpdateError, WorkingCopy, WorkingCopyAdapter};

const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

pub struct Git2WorkingCopy;

impl Git2WorkingCopy {
    fn repo(wc: &WorkingCopy) -> Result<git2::Repository> {
        git2::Repository::open(wc.root()).map_err(UpdateError::from)
    }

    /// Every direct reference and the commit it points at.
    fn snapshot_refs(repo: &git2::Repository) -> Result<HashMap<String, Oid>> {
        let mut refs = HashMap::new();
        for reference in repo.references()? {
            let reference = reference?;
            if let (Some(name), Some(target)) = (reference.name(), reference.target()) {
                refs.insert(name.to_string(), target);
            }
        }
        Ok(refs)
    }

    /// Local name a fetched remote reference is stored under.
    fn local_name(remote: &git2::Remote<'_>, remote_ref: &str) -> Option<String> {
        if remote_ref.starts_with("refs/tags/") {
            return Some(remote_ref.to_string());
        }
        remote
            .refspecs()
            .filter(|spec| matches!(spec.direction(), git2::Direction::Fetch))
            .find(|spec| spec.src_matches(remote_ref))
            .and_then(|spec| spec.transform(remote_ref).ok())
            .and_then(|buf| buf.as_str().map(str::to_string))
    }

    /// Entries of FETCH_HEAD in file order (merge heads first).
    fn fetch_head(repo: &git2::Repository) -> Result<Vec<(String, Oid)>> {
        let mut entries = Vec::new();
        let walked = repo.fetchhead_foreach(|name, _url, oid, _is_merge| {
            entries.push((name.to_string(), *oid));
            true
        });
        match walked {
            Ok(()) => Ok(entries),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_options(repo: &git2::Repository) -> git2::FetchOptions<'static> {
        let config = repo.config().ok();
        let mut attempts = 0usize;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("no usable credentials for remote"));
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                if let Some(user) = username {
                    return Cred::ssh_key_from_agent(user);
                }
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(config) = &config {
                    return Cred::credential_helper(config, url, username);
                }
            }
            if allowed.contains(CredentialType::DEFAULT) {
                return Cred::default();
            }
            Err(git2::Error::from_str("no usable credentials for remote"))
        });

        let mut opts = git2::FetchOptions::new();
        opts.remote_callbacks(callbacks);
        opts
    }

    fn describe(
        repo: &git2::Repository,
        remote_ref: &str,
        old: Option<Oid>,
        new: Oid,
    ) -> Result<(SyncStatus, Option<String>, String)> {
        let Some(old) = old else {
            let note = if remote_ref.starts_with("refs/tags/") {
                "[new tag]"
            } else {
                "[new branch]"
            };
            return Ok((SyncStatus::NewHead, None, note.to_string()));
        };

        if old == new {
            Ok((SyncStatus::UpToDate, None, "[up to date]".to_string()))
        } else if repo.graph_descendant_of(new, old)? {
            Ok((
                SyncStatus::FastForward,
                Some(old.to_string()),
                format!("{:.7}..{:.7}", old, new),
            ))
        } else {
            Ok((
                SyncStatus::ForcedUpdate,
                Some(old.to_string()),
                format!("+ {:.7}...{:.7} (forced update)", old, new),
            ))
        }
    }

    /// Fast-forward the checked-out branch onto its upstream.
    ///
    /// Detached or unborn HEAD and branches without a fetched upstream are
    /// left alone. Returns the move when HEAD changed.
    fn integrate(repo: &git2::Repository, remote_name: &str) -> Result<Option<Integration>> {
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) => {
                debug!(error = %e.message(), "no HEAD to integrate into");
                return Ok(None);
            }
        };
        if !head.is_branch() {
            debug!("detached HEAD; leaving working tree as is");
            return Ok(None);
        }

        let branch_ref = head
            .name()
            .ok_or_else(|| UpdateError::Git("HEAD name is not valid utf-8".into()))?
            .to_string();
        let upstream_ref = match repo.branch_upstream_name(&branch_ref) {
            Ok(buf) => buf.as_str().map(str::to_string),
            Err(_) => None,
        }
        .unwrap_or_else(|| {
            let short = head.shorthand().unwrap_or("HEAD");
            format!("refs/remotes/{remote_name}/{short}")
        });

        let upstream = match repo.find_reference(&upstream_ref) {
            Ok(r) => r,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(upstream = %upstream_ref, "no upstream for current branch");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let fetch_commit = repo.reference_to_annotated_commit(&upstream)?;
        let (analysis, _preference) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            Ok(None)
        } else if analysis.is_fast_forward() {
            let from = head
                .target()
                .ok_or_else(|| UpdateError::Git("HEAD has no target".into()))?;
            let target = repo.find_object(fetch_commit.id(), None)?;
            repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;

            let mut reference = repo.find_reference(&branch_ref)?;
            reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
            debug!(branch = %branch_ref, target = %fetch_commit.id(), "fast-forwarded");
            Ok(Some(Integration {
                upstream: upstream_ref,
                from,
                to: fetch_commit.id(),
            }))
        } else {
            Err(UpdateError::NotFastForward {
                branch: branch_ref,
                upstream: upstream_ref,
            })
        }
    }
}

impl WorkingCopyAdapter for Git2WorkingCopy {
    fn open(&self, dir: &Path) -> Result<WorkingCopy> {
        let repo = git2::Repository::open(dir)
            .map_err(|e| UpdateError::NotARepo(format!("{}: {}", dir.display(), e.message())))?;
        Ok(WorkingCopy::new(dir, repo.is_bare()))
    }

    fn find_remote(&self, wc: &WorkingCopy, name: &str) -> Result<Option<Remote>> {
        let repo = Self::repo(wc)?;
        let declared = repo.remotes()?.iter().flatten().any(|r| r == name);
        if !declared {
            return Ok(None);
        }

        let url = match repo.config()?.get_string(&format!("remote.{name}.url")) {
            Ok(url) => Some(url),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Remote {
            name: name.to_string(),
            url,
        }))
    }

    fn is_dirty(&self, wc: &WorkingCopy) -> Result<bool> {
        let repo = Self::repo(wc)?;

        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);

        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .any(|entry| entry.status() != git2::Status::CURRENT))
    }

    fn pull(&self, wc: &WorkingCopy, remote: &Remote) -> Result<Vec<SyncResult>> {
        let repo = Self::repo(wc)?;
        let before = Self::snapshot_refs(&repo)?;

        let mut git_remote = repo
            .find_remote(&remote.name)
            .map_err(|_| UpdateError::RemoteNotFound(remote.name.clone()))?;
        let mut opts = Self::fetch_options(&repo);

        debug!(remote = %remote.name, url = ?remote.url, "fetching");
        git_remote.fetch::<&str>(&[], Some(&mut opts), None)?;

        let mut results = Vec::new();
        for (remote_ref, new) in Self::fetch_head(&repo)? {
            let local = Self::local_name(&git_remote, &remote_ref);
            let old = local.as_ref().and_then(|name| before.get(name)).copied();
            let (status, old_commit, note) = Self::describe(&repo, &remote_ref, old, new)?;

            results.push(SyncResult {
                reference: local.unwrap_or(remote_ref),
                commit: new.to_string(),
                old_commit,
                status,
                note,
            });
        }

        if let Some(moved) = Self::integrate(&repo, &remote.name)? {
            Self::record_integration(&mut results, moved);
        }
        Ok(results)
    }
}

/// A fast-forward of the checked-out branch.
#[derive(Debug)]
struct Integration {
    upstream: String,
    from: Oid,
    to: Oid,
}

impl Git2WorkingCopy {
    /// Put the integrated branch first and make it carry the HEAD move.
    ///
    /// The fetch diff alone misses a tracking ref that was already ahead
    /// before this run (an earlier manual fetch, or an interrupted update),
    /// yet the checkout still changed underneath the process.
    fn record_integration(results: &mut Vec<SyncResult>, moved: Integration) {
        let position = results.iter().position(|r| r.reference == moved.upstream);
        let mut primary = match position {
            Some(i) => results.remove(i),
            None => SyncResult {
                reference: moved.upstream.clone(),
                commit: moved.to.to_string(),
                old_commit: None,
                status: SyncStatus::UpToDate,
                note: String::new(),
            },
        };

        if !primary.fetched_new_content() {
            primary.commit = moved.to.to_string();
            primary.old_commit = Some(moved.from.to_string());
            primary.status = SyncStatus::FastForward;
            primary.note = format!("{:.7}..{:.7}", moved.from, moved.to);
        }
        results.insert(0, primary);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo() -> (tempfile::TempDir, git2::Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit_file(repo: &git2::Repository, name: &str, contents: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), contents).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let sig = git2::Signature::now("turbo", "turbo@example.com").unwrap();
        let parents = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect::<Vec<_>>();
        let parents = parents.iter().collect::<Vec<_>>();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
            .unwrap()
    }

    #[test]
    fn open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Git2WorkingCopy.open(dir.path()).unwrap_err();
        assert!(matches!(err, UpdateError::NotARepo(_)));
    }

    #[test]
    fn open_detects_bare() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init_bare(dir.path()).unwrap();
        let wc = Git2WorkingCopy.open(dir.path()).unwrap();
        assert!(wc.is_bare());
    }

    #[test]
    fn open_working_tree() {
        let (dir, _repo) = init_repo();
        let wc = Git2WorkingCopy.open(dir.path()).unwrap();
        assert!(!wc.is_bare());
        assert_eq!(wc.root(), dir.path());
    }

    #[test]
    fn find_remote_missing_and_present() {
        let (dir, repo) = init_repo();
        let wc = Git2WorkingCopy.open(dir.path()).unwrap();
        assert_eq!(Git2WorkingCopy.find_remote(&wc, "origin").unwrap(), None);

        repo.remote("origin", "https://example.com/bot.git").unwrap();
        let remote = Git2WorkingCopy.find_remote(&wc, "origin").unwrap().unwrap();
        assert_eq!(remote.name, "origin");
        assert_eq!(remote.url.as_deref(), Some("https://example.com/bot.git"));
        assert!(remote.is_valid());
    }

    #[test]
    fn dirty_ignores_untracked_files() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "bot.txt", "v1");
        let wc = Git2WorkingCopy.open(dir.path()).unwrap();
        assert!(!Git2WorkingCopy.is_dirty(&wc).unwrap());

        std::fs::write(dir.path().join("scratch.txt"), "untracked").unwrap();
        assert!(!Git2WorkingCopy.is_dirty(&wc).unwrap());

        std::fs::write(dir.path().join("bot.txt"), "v2").unwrap();
        assert!(Git2WorkingCopy.is_dirty(&wc).unwrap());
    }

    #[test]
    fn describe_statuses() {
        let (_dir, repo) = init_repo();
        let first = commit_file(&repo, "bot.txt", "v1");
        let second = commit_file(&repo, "bot.txt", "v2");

        let (status, old, note) =
            Git2WorkingCopy::describe(&repo, "refs/heads/main", None, first).unwrap();
        assert_eq!(status, SyncStatus::NewHead);
        assert_eq!(old, None);
        assert_eq!(note, "[new branch]");

        let (status, old, _) =
            Git2WorkingCopy::describe(&repo, "refs/heads/main", Some(first), first).unwrap();
        assert_eq!(status, SyncStatus::UpToDate);
        assert_eq!(old, None);

        let (status, old, note) =
            Git2WorkingCopy::describe(&repo, "refs/heads/main", Some(first), second).unwrap();
        assert_eq!(status, SyncStatus::FastForward);
        assert_eq!(old, Some(first.to_string()));
        assert_eq!(note, format!("{:.7}..{:.7}", first, second));

        let (status, _, note) =
            Git2WorkingCopy::describe(&repo, "refs/heads/main", Some(second), first).unwrap();
        assert_eq!(status, SyncStatus::ForcedUpdate);
        assert!(note.ends_with("(forced update)"));
    }

    #[test]
    fn integration_becomes_primary_result() {
        let (_dir, repo) = init_repo();
        let first = commit_file(&repo, "bot.txt", "v1");
        let second = commit_file(&repo, "bot.txt", "v2");

        let mut results = vec![
            SyncResult {
                reference: "refs/tags/v1".into(),
                commit: first.to_string(),
                old_commit: None,
                status: SyncStatus::NewHead,
                note: "[new tag]".into(),
            },
            SyncResult {
                reference: "refs/remotes/origin/main".into(),
                commit: second.to_string(),
                old_commit: None,
                status: SyncStatus::UpToDate,
                note: "[up to date]".into(),
            },
        ];
        Git2WorkingCopy::record_integration(
            &mut results,
            Integration {
                upstream: "refs/remotes/origin/main".into(),
                from: first,
                to: second,
            },
        );

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].reference, "refs/remotes/origin/main");
        assert_eq!(results[0].old_commit, Some(first.to_string()));
        assert_eq!(results[0].status, SyncStatus::FastForward);
        assert!(results[0].fetched_new_content());
        assert_eq!(results[1].reference, "refs/tags/v1");
    }

    #[test]
    fn integration_without_fetch_entry_is_synthesized() {
        let (_dir, repo) = init_repo();
        let first = commit_file(&repo, "bot.txt", "v1");
        let second = commit_file(&repo, "bot.txt", "v2");

        let mut results = Vec::new();
        Git2WorkingCopy::record_integration(
            &mut results,
            Integration {
                upstream: "refs/remotes/origin/main".into(),
                from: first,
                to: second,
            },
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].commit, second.to_string());
        assert!(results[0].fetched_new_content());
    }

    #[test]
    fn new_tag_note() {
        let (_dir, repo) = init_repo();
        let first = commit_file(&repo, "bot.txt", "v1");
        let (_, _, note) = Git2WorkingCopy::describe(&repo, "refs/tags/v1", None, first).unwrap();
        assert_eq!(note, "[new tag]");
    }
}
