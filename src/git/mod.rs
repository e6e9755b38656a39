//! Utilities for interacting with `git` repositories for the `pk` application.
//!
//! Ref reads and writes go through `git2`; rebases, pushes, and fetches shell
//! out to the `git` executable, which owns the merge machinery, the
//! `--force-with-lease` protocol, and the conflict-resolution state the user
//! interacts with.

use crate::errors::{PkError, PkResult};
use git2::{build::CheckoutBuilder, BranchType, Oid, Repository, StatusOptions};
use std::{
    env,
    path::{Path, PathBuf},
    process::{Command, Output},
};

/// Returns the repository for the current working directory, and [None] if
/// the current working directory is not within a git repository or an error
/// occurs.
pub fn active_repository() -> Option<Repository> {
    Repository::discover(env::current_dir().ok()?).ok()
}

/// Extension trait for the [Repository] type to expose helper functions
/// related to stack management.
pub trait RepositoryExt {
    /// Returns the name of the currently checked out branch.
    fn current_branch_name(&self) -> PkResult<String>;

    /// Returns the head commit of the given local branch.
    fn branch_head(&self, name: &str) -> PkResult<Oid>;

    /// Returns whether a local branch with the given name exists.
    fn branch_exists(&self, name: &str) -> bool;

    /// Lists all local branch names.
    fn local_branches(&self) -> PkResult<Vec<String>>;

    /// Creates a local branch at the given commit.
    fn create_branch(&self, name: &str, at: Oid) -> PkResult<()>;

    /// Renames a local branch.
    fn rename_branch(&self, old: &str, new: &str) -> PkResult<()>;

    /// Deletes a local branch ref.
    fn delete_branch(&self, name: &str) -> PkResult<()>;

    /// Checks out a branch with the given name.
    fn checkout_branch(&self, name: &str) -> PkResult<()>;

    /// Moves a branch ref to the given commit without touching the working
    /// tree. Used when rolling back from journal pre-images.
    fn reset_branch(&self, name: &str, to: Oid) -> PkResult<()>;

    /// Whether the working tree has no uncommitted changes.
    fn is_working_tree_clean(&self) -> PkResult<bool>;

    /// Whether `ancestor` is reachable from `descendant`.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> PkResult<bool>;

    /// Commits the index onto the current branch, optionally staging all
    /// tracked changes first.
    fn commit_staged(&self, message: &str, stage_all: bool) -> PkResult<Oid>;

    /// Amends the current branch's head commit with the index contents and,
    /// optionally, a new message.
    fn amend_head(&self, message: Option<&str>, stage_all: bool) -> PkResult<Oid>;

    /// The `owner/repo` pair parsed from the given remote's URL.
    fn owner_and_repository(&self, remote: &str) -> PkResult<(String, String)>;
}

impl RepositoryExt for Repository {
    fn current_branch_name(&self) -> PkResult<String> {
        let head = self.head()?;
        head.shorthand()
            .map(ToOwned::to_owned)
            .ok_or_else(|| PkError::Fatal("HEAD ref does not have a name".to_string()))
    }

    fn branch_head(&self, name: &str) -> PkResult<Oid> {
        let branch = self
            .find_branch(name, BranchType::Local)
            .map_err(|_| PkError::RefMissing(name.to_string()))?;
        branch
            .get()
            .target()
            .ok_or_else(|| PkError::RefMissing(name.to_string()))
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.find_branch(name, BranchType::Local).is_ok()
    }

    fn local_branches(&self) -> PkResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn create_branch(&self, name: &str, at: Oid) -> PkResult<()> {
        let commit = self.find_commit(at)?;
        self.branch(name, &commit, false)?;
        Ok(())
    }

    fn rename_branch(&self, old: &str, new: &str) -> PkResult<()> {
        let mut branch = self
            .find_branch(old, BranchType::Local)
            .map_err(|_| PkError::RefMissing(old.to_string()))?;
        branch.rename(new, false)?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> PkResult<()> {
        let mut branch = self
            .find_branch(name, BranchType::Local)
            .map_err(|_| PkError::RefMissing(name.to_string()))?;
        branch.delete()?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> PkResult<()> {
        self.set_head(&format!("refs/heads/{name}"))?;
        self.checkout_head(Some(CheckoutBuilder::default().force()))?;
        Ok(())
    }

    fn reset_branch(&self, name: &str, to: Oid) -> PkResult<()> {
        let mut reference = self
            .find_reference(&format!("refs/heads/{name}"))
            .map_err(|_| PkError::RefMissing(name.to_string()))?;
        reference.set_target(to, "pk: restore pre-image")?;
        // Keep the working tree in sync if the branch is checked out.
        if self.current_branch_name().ok().as_deref() == Some(name) {
            self.checkout_head(Some(CheckoutBuilder::default().force()))?;
        }
        Ok(())
    }

    fn is_working_tree_clean(&self) -> PkResult<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        let statuses = self.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> PkResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.graph_descendant_of(descendant, ancestor)?)
    }

    fn commit_staged(&self, message: &str, stage_all: bool) -> PkResult<Oid> {
        let mut index = self.index()?;
        if stage_all {
            index.update_all(["."].iter(), None)?;
            index.write()?;
        }
        let tree_id = index.write_tree()?;
        let tree = self.find_tree(tree_id)?;
        let signature = self.signature()?;
        let head_commit = self.head()?.peel_to_commit()?;
        let oid = self.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit],
        )?;
        Ok(oid)
    }

    fn amend_head(&self, message: Option<&str>, stage_all: bool) -> PkResult<Oid> {
        let mut index = self.index()?;
        if stage_all {
            index.update_all(["."].iter(), None)?;
            index.write()?;
        }
        let tree_id = index.write_tree()?;
        let tree = self.find_tree(tree_id)?;
        let signature = self.signature()?;
        let head_commit = self.head()?.peel_to_commit()?;
        let oid = head_commit.amend(
            Some("HEAD"),
            Some(&signature),
            Some(&signature),
            None,
            message,
            Some(&tree),
        )?;
        Ok(oid)
    }

    fn owner_and_repository(&self, remote: &str) -> PkResult<(String, String)> {
        let remote = self.find_remote(remote)?;
        let url = remote
            .url()
            .ok_or_else(|| PkError::Fatal("remote has no URL".to_string()))?;
        parse_owner_repo(url).ok_or_else(|| {
            PkError::Fatal(format!("could not parse owner/repo from remote URL `{url}`"))
        })
    }
}

/// Parses `owner/repo` out of an HTTPS or SSH remote URL.
fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let trimmed = url.strip_suffix(".git").unwrap_or(url);
    let path = if let Some(rest) = trimmed.split_once("://").map(|(_, r)| r) {
        rest.split_once('/')?.1
    } else if let Some(rest) = trimmed.split_once(':').map(|(_, r)| r) {
        rest
    } else {
        return None;
    };
    let mut parts = path.rsplitn(2, '/');
    let repo = parts.next()?;
    let owner = parts.next()?;
    Some((owner.to_string(), repo.to_string()))
}

/// Outcome of a mutating git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOutcome {
    Ok,
    /// The rebase stopped on conflicts in the given paths.
    Conflict { paths: Vec<String> },
    /// A push-with-lease failed because the remote ref moved.
    Diverged { branch: String },
    Fatal { detail: String },
}

/// State of any rebase the repository is currently in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseState {
    None,
    InProgress,
}

/// Wrapper around the `git` executable, rooted at the repository workdir.
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    /// Rebases `branch` onto `onto`. With a `boundary` commit, only the
    /// commits strictly above the boundary are replayed (`--onto`); without
    /// one, git falls back to merge-base semantics.
    pub fn rebase_onto(
        &self,
        branch: &str,
        onto: &str,
        boundary: Option<&str>,
    ) -> PkResult<GitOutcome> {
        let output = match boundary {
            Some(boundary) => self.run(&["rebase", "--onto", onto, boundary, branch])?,
            None => self.run(&["rebase", onto, branch])?,
        };
        if output.status.success() {
            return Ok(GitOutcome::Ok);
        }
        if self.rebase_state() == RebaseState::InProgress {
            return Ok(GitOutcome::Conflict {
                paths: self.conflicted_paths()?,
            });
        }
        Ok(GitOutcome::Fatal {
            detail: stderr_of(&output),
        })
    }

    /// Continues a suspended rebase after the user resolved conflicts.
    pub fn rebase_continue(&self) -> PkResult<GitOutcome> {
        let output = Command::new("git")
            .args(["rebase", "--continue"])
            .current_dir(&self.repo_root)
            .env("GIT_EDITOR", "true")
            .output()?;
        if output.status.success() {
            return Ok(GitOutcome::Ok);
        }
        if self.rebase_state() == RebaseState::InProgress {
            return Ok(GitOutcome::Conflict {
                paths: self.conflicted_paths()?,
            });
        }
        Ok(GitOutcome::Fatal {
            detail: stderr_of(&output),
        })
    }

    /// Aborts any rebase in progress. A no-op when none is.
    pub fn rebase_abort(&self) -> PkResult<()> {
        if self.rebase_state() == RebaseState::InProgress {
            self.run_checked(&["rebase", "--abort"])?;
        }
        Ok(())
    }

    /// Whether a rebase is currently in progress.
    pub fn rebase_state(&self) -> RebaseState {
        let git_dir = self.repo_root.join(".git");
        if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            RebaseState::InProgress
        } else {
            RebaseState::None
        }
    }

    /// Paths currently in conflict.
    pub fn conflicted_paths(&self) -> PkResult<Vec<String>> {
        let output = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(ToOwned::to_owned)
            .collect())
    }

    /// Pushes `branch`, guarding against remote movement with a lease on the
    /// expected remote head. `expected` of [None] leases on the remote
    /// tracking ref.
    pub fn push_with_lease(
        &self,
        remote: &str,
        branch: &str,
        expected: Option<&str>,
    ) -> PkResult<GitOutcome> {
        let lease = match expected {
            Some(commit) => format!("--force-with-lease={branch}:{commit}"),
            None => format!("--force-with-lease={branch}"),
        };
        let output = self.run(&["push", lease.as_str(), remote, branch])?;
        if output.status.success() {
            return Ok(GitOutcome::Ok);
        }
        let detail = stderr_of(&output);
        if detail.contains("stale info") || detail.contains("[rejected]") {
            return Ok(GitOutcome::Diverged {
                branch: branch.to_string(),
            });
        }
        Ok(GitOutcome::Fatal { detail })
    }

    /// Deletes `branch` on the remote.
    pub fn push_delete(&self, remote: &str, branch: &str) -> PkResult<()> {
        // A branch the forge already deleted on merge is fine.
        let refspec = format!(":{branch}");
        let output = self.run(&["push", remote, refspec.as_str()])?;
        if !output.status.success() {
            let detail = stderr_of(&output);
            if !detail.contains("remote ref does not exist") {
                return Err(PkError::Fatal(detail));
            }
        }
        Ok(())
    }

    /// Fetches from the remote; with a refspec, only that ref.
    pub fn fetch(&self, remote: &str, refspec: Option<&str>) -> PkResult<()> {
        match refspec {
            Some(spec) => self.run_checked(&["fetch", remote, spec]),
            None => self.run_checked(&["fetch", remote]),
        }
    }

    /// Fast-forwards the checked-out branch to `target`; refuses to merge.
    pub fn merge_ff(&self, target: &str) -> PkResult<()> {
        self.run_checked(&["merge", "--ff-only", target])
    }

    fn run(&self, args: &[&str]) -> PkResult<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|err| PkError::Fatal(format!("failed to run git {}: {err}", args.join(" "))))
    }

    fn run_checked(&self, args: &[&str]) -> PkResult<()> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(PkError::Fatal(format!(
                "`git {}` failed: {}",
                args.join(" "),
                stderr_of(&output)
            )))
        }
    }
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        trimmed.to_string()
    }
}
