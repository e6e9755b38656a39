//! The in-memory context of the `pk` application.

use crate::{
    config::PkConfig,
    errors::{PkError, PkResult},
    forge::{github::GitHubForge, Forge},
    git::{GitCli, RepositoryExt},
    journal::Journal,
    reconcile,
    store::MetadataStore,
    tree::StackTree,
};
use git2::Repository;
use std::path::PathBuf;

mod fmt;
pub use fmt::DisplayBranch;

/// The in-memory context of the `pk` application: the repository, the
/// configuration, the metadata store, the journal, and the stack tree
/// mirror. Constructed once per invocation; the tree is only persisted by
/// the operation engine's commit step (or `pk init`).
pub struct PkContext<'a> {
    /// The repository associated with the store.
    pub repository: &'a Repository,
    /// The repository workdir root.
    pub repo_root: PathBuf,
    /// Per-repository configuration.
    pub config: PkConfig,
    /// Handle on `.pancake/`.
    pub store: MetadataStore,
    /// The operation journal.
    pub journal: Journal,
    /// The `git` executable wrapper.
    pub git: GitCli,
    /// The in-memory stack tree.
    pub tree: StackTree,
}

impl<'a> PkContext<'a> {
    fn assemble(
        config: PkConfig,
        repository: &'a Repository,
        tree: Option<StackTree>,
    ) -> PkResult<Self> {
        let repo_root = repository
            .workdir()
            .ok_or_else(|| PkError::Fatal("bare repositories are not supported".to_string()))?
            .to_path_buf();
        let store = MetadataStore::new(&repo_root);
        let journal = Journal::new(&store.journal_path());
        let git = GitCli::new(&repo_root);
        let tree = match tree {
            Some(tree) => tree,
            None => store.load(&config.repository.main_branch)?,
        };
        Ok(Self {
            repository,
            repo_root,
            config,
            store,
            journal,
            git,
            tree,
        })
    }

    /// Loads the context for an initialized repository.
    pub fn load(config: PkConfig, repository: &'a Repository) -> PkResult<Self> {
        Self::assemble(config, repository, None)
    }

    /// Loads the context, falling back to the notes-based rebuild when the
    /// metadata file is corrupt. Read-only commands use this path; writing
    /// commands go through [Self::load] so corruption is surfaced first.
    pub fn load_or_recover(config: PkConfig, repository: &'a Repository) -> PkResult<Self> {
        match Self::load(config.clone(), repository) {
            Err(PkError::MetadataCorrupt(_)) => {
                let tree =
                    reconcile::rebuild_from_notes(repository, &config.repository.main_branch)?;
                Self::assemble(config, repository, Some(tree))
            }
            other => other,
        }
    }

    /// Whether `branch` is stacked behind its parent's current head: its
    /// recorded anchor no longer matches the parent's live ref.
    pub fn needs_restack(&self, branch: &str) -> bool {
        let Some(node) = self.tree.get(branch) else {
            return false;
        };
        let Some(parent) = node.parent.as_deref() else {
            return false;
        };
        let Ok(parent_head) = self.repository.branch_head(parent) else {
            return false;
        };
        match &node.anchor {
            Some(anchor) => anchor != &parent_head.to_string(),
            // Adopted without an anchor; the first sync establishes one.
            None => true,
        }
    }

    /// Constructs the forge client for this repository.
    pub fn forge(&self) -> PkResult<Box<dyn Forge>> {
        let token = self.config.forge_token().ok_or(PkError::ForgeAuth)?;
        let (owner, repo) = self
            .repository
            .owner_and_repository(&self.config.repository.remote)?;
        Ok(Box::new(GitHubForge::new(
            &token,
            &owner,
            &repo,
            self.config.forge.timeout_secs,
        )?))
    }

    /// The PR URL for a bound branch, if the binding carries one.
    pub fn pr_url(&self, branch: &str) -> Option<String> {
        let pr = self.tree.get(branch)?.pr.as_ref()?;
        if let Some(url) = &pr.url {
            return Some(url.clone());
        }
        let (owner, repo) = self
            .repository
            .owner_and_repository(&self.config.repository.remote)
            .ok()?;
        Some(format!("https://github.com/{owner}/{repo}/pull/{}", pr.id))
    }
}
