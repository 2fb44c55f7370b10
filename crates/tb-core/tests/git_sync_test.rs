//! End-to-end update runs through libgit2 against a local bare "origin".

use std::path::{Path, PathBuf};

use git2::{Oid, Repository, Signature};
use tb_core::updater::{
    Git2WorkingCopy, PreflightRules, SkipReason, SyncStatus, UpdateError, UpdateOutcome,
    UpdateSupervisor,
};
use tempfile::TempDir;

// ===========================================================================
// Fixture
// ===========================================================================

struct Fixture {
    _tmp: TempDir,
    origin: PathBuf,
    deploy: PathBuf,
}

impl Fixture {
    /// A bare origin with one commit, and a clone of it.
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin.git");
        let deploy = tmp.path().join("deploy");

        let bare = Repository::init_bare(&origin).unwrap();
        commit_to_bare(&bare, "bot.txt", "v1");
        Repository::clone(origin.to_str().unwrap(), &deploy).unwrap();

        Self {
            _tmp: tmp,
            origin,
            deploy,
        }
    }

    fn push_upstream(&self, file: &str, contents: &str) -> Oid {
        let bare = Repository::open_bare(&self.origin).unwrap();
        commit_to_bare(&bare, file, contents)
    }

    fn deploy_head(&self) -> Oid {
        Repository::open(&self.deploy)
            .unwrap()
            .head()
            .unwrap()
            .target()
            .unwrap()
    }
}

/// Commit `file` on top of the bare repo's HEAD without a working tree.
fn commit_to_bare(repo: &Repository, file: &str, contents: &str) -> Oid {
    let blob = repo.blob(contents.as_bytes()).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let base_tree = parent.as_ref().map(|c| c.tree().unwrap());

    let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
    builder.insert(file, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let sig = Signature::now("turbo", "turbo@example.com").unwrap();
    let parents = parent.iter().collect::<Vec<_>>();
    repo.commit(Some("HEAD"), &sig, &sig, &format!("update {file}"), &tree, &parents)
        .unwrap()
}

fn commit_in_workdir(repo_dir: &Path, file: &str, contents: &str) -> Oid {
    let repo = Repository::open(repo_dir).unwrap();
    std::fs::write(repo_dir.join(file), contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let sig = Signature::now("turbo", "turbo@example.com").unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "local change", &tree, &[&parent])
        .unwrap()
}

fn supervisor() -> UpdateSupervisor<Git2WorkingCopy> {
    UpdateSupervisor::new(Git2WorkingCopy, PreflightRules::default())
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn fresh_clone_is_up_to_date() {
    let fx = Fixture::new();
    let outcome = supervisor().run(&fx.deploy).unwrap();

    match outcome {
        UpdateOutcome::UpToDate { result } => {
            assert_eq!(result.status, SyncStatus::UpToDate);
            assert_eq!(result.old_commit, None);
            assert!(result.reference.starts_with("refs/remotes/origin/"));
        }
        other => panic!("expected up to date, got {other:?}"),
    }
}

#[test]
fn upstream_commit_requires_restart_and_fast_forwards() {
    let fx = Fixture::new();
    let before = fx.deploy_head();
    let after = fx.push_upstream("bot.txt", "v2");

    let outcome = supervisor().run(&fx.deploy).unwrap();
    match outcome {
        UpdateOutcome::RestartRequired { result } => {
            assert_eq!(result.status, SyncStatus::FastForward);
            assert_eq!(result.old_commit, Some(before.to_string()));
            assert_eq!(result.commit, after.to_string());
        }
        other => panic!("expected restart, got {other:?}"),
    }

    assert_eq!(fx.deploy_head(), after);
    let contents = std::fs::read_to_string(fx.deploy.join("bot.txt")).unwrap();
    assert_eq!(contents, "v2");
}

#[test]
fn tracking_ref_fetched_earlier_still_requires_restart() {
    let fx = Fixture::new();
    let before = fx.deploy_head();
    let after = fx.push_upstream("bot.txt", "v2");

    // A fetch outside the supervisor moves origin/* without touching HEAD.
    let repo = Repository::open(&fx.deploy).unwrap();
    repo.find_remote("origin")
        .unwrap()
        .fetch::<&str>(&[], None, None)
        .unwrap();
    assert_eq!(fx.deploy_head(), before);

    match supervisor().run(&fx.deploy).unwrap() {
        UpdateOutcome::RestartRequired { result } => {
            assert_eq!(result.old_commit, Some(before.to_string()));
            assert_eq!(result.commit, after.to_string());
            assert_eq!(result.status, SyncStatus::FastForward);
        }
        other => panic!("expected restart, got {other:?}"),
    }
    assert_eq!(fx.deploy_head(), after);
    assert_eq!(
        std::fs::read_to_string(fx.deploy.join("bot.txt")).unwrap(),
        "v2"
    );

    assert!(matches!(
        supervisor().run(&fx.deploy).unwrap(),
        UpdateOutcome::UpToDate { .. }
    ));
}

#[test]
fn second_run_after_update_is_up_to_date() {
    let fx = Fixture::new();
    fx.push_upstream("bot.txt", "v2");

    let sup = supervisor();
    assert!(sup.run(&fx.deploy).unwrap().restart_required());

    let again = sup.run(&fx.deploy).unwrap();
    assert!(matches!(again, UpdateOutcome::UpToDate { .. }));
    let third = sup.run(&fx.deploy).unwrap();
    assert_eq!(again, third);
}

#[test]
fn dirty_tracked_file_does_not_block_pull() {
    let fx = Fixture::new();
    std::fs::write(fx.deploy.join("bot.txt"), "local edit").unwrap();
    let after = fx.push_upstream("extra.txt", "new file");

    let outcome = supervisor().run(&fx.deploy).unwrap();
    assert!(outcome.restart_required());
    assert_eq!(fx.deploy_head(), after);
    assert_eq!(
        std::fs::read_to_string(fx.deploy.join("bot.txt")).unwrap(),
        "local edit"
    );
    assert!(fx.deploy.join("extra.txt").exists());
}

#[test]
fn dirty_tree_skips_when_clean_required() {
    let fx = Fixture::new();
    std::fs::write(fx.deploy.join("bot.txt"), "local edit").unwrap();

    let rules = PreflightRules {
        require_clean: true,
        ..PreflightRules::default()
    };
    let outcome = UpdateSupervisor::new(Git2WorkingCopy, rules)
        .run(&fx.deploy)
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Skipped {
            reason: SkipReason::Dirty
        }
    );
}

#[test]
fn diverged_branch_fails_the_pull() {
    let fx = Fixture::new();
    commit_in_workdir(&fx.deploy, "local.txt", "local only");
    fx.push_upstream("bot.txt", "v2");

    let err = supervisor().run(&fx.deploy).unwrap_err();
    assert!(matches!(err, UpdateError::NotFastForward { .. }));
}

#[test]
fn plain_directory_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let outcome = supervisor().run(tmp.path()).unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Skipped {
            reason: SkipReason::NotARepository
        }
    );
}

#[test]
fn bare_repository_is_skipped() {
    let fx = Fixture::new();
    let outcome = supervisor().run(&fx.origin).unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Skipped {
            reason: SkipReason::Bare
        }
    );
}

#[test]
fn repository_without_origin_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    Repository::init(tmp.path()).unwrap();

    let outcome = supervisor().run(tmp.path()).unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Skipped {
            reason: SkipReason::RemoteMissing("origin".into())
        }
    );
}

#[test]
fn unreachable_remote_fails_the_pull() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Repository::init(tmp.path()).unwrap();
    let missing = tmp.path().join("does-not-exist.git");
    repo.remote("origin", missing.to_str().unwrap()).unwrap();

    // The url is configured, so preflight passes; the fetch itself fails.
    let err = supervisor().run(tmp.path()).unwrap_err();
    assert!(matches!(err, UpdateError::Git(_)));
}
