//! `init` subcommand.

use crate::{
    config::PkConfig,
    errors::{PkError, PkResult},
    git::RepositoryExt,
    reconcile,
    store::{notes, MetadataStore},
    tree::{InsertPos, StackTree, TrackedBranch},
};
use clap::Args;
use git2::Repository;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `init` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct InitCmd {
    /// Overwrite an existing configuration.
    #[clap(long)]
    force: bool,
    /// Explicitly set the main branch.
    #[clap(long)]
    main_branch: Option<String>,
    /// Explicitly set the git remote to use.
    #[clap(long)]
    remote: Option<String>,
}

impl InitCmd {
    /// Run the `init` subcommand. This is the only command that runs before
    /// a [PkContext] exists.
    ///
    /// [PkContext]: crate::ctx::PkContext
    pub fn run(self, repo: &Repository) -> PkResult<()> {
        let repo_root = repo
            .workdir()
            .ok_or_else(|| PkError::Fatal("bare repositories are not supported".to_string()))?
            .to_path_buf();

        if PkConfig::try_load(&repo_root)?.is_some() && !self.force {
            return Err(PkError::InvalidInput(
                "pancake is already initialized; use `pk init --force` to overwrite".to_string(),
            ));
        }

        let main_branch = match self.main_branch {
            Some(name) => name,
            None => detect_main_branch(repo)?,
        };
        let remote = self
            .remote
            .or_else(|| detect_remote(repo))
            .unwrap_or_else(|| "origin".to_string());

        let config = PkConfig::new(&main_branch, &remote);
        config.save(&repo_root)?;

        let store = MetadataStore::new(&repo_root);
        let _lock = store.lock()?;

        // A clone that lost `.pancake/` but kept the notes mirror can adopt
        // the whole tree straight away.
        let mut tree = if store.exists() {
            store.load(&main_branch)?
        } else {
            let rebuilt = reconcile::rebuild_from_notes(repo, &main_branch)?;
            if !rebuilt.stack_branches().is_empty() {
                println!("Adopted {} branch(es) from git notes.", rebuilt.stack_branches().len());
            }
            rebuilt
        };

        reconcile::adopt_heads(&mut tree, repo)?;
        adopt_prefixed_branches(repo, &config, &mut tree)?;
        store.save(&tree)?;
        notes::sync_tree(repo, &tree)?;

        println!(
            "Pancake initialized.\n- repo: {}\n- main branch: {}\n- remote: {}",
            repo_root.display(),
            Blue.paint(&main_branch),
            Blue.paint(&remote)
        );
        Ok(())
    }
}

/// Offers adoption of untracked local branches matching the configured
/// prefix. Adoption only ever happens here; other commands report such
/// branches and move on.
fn adopt_prefixed_branches(
    repo: &Repository,
    config: &PkConfig,
    tree: &mut StackTree,
) -> PkResult<()> {
    let prefix = &config.stack.prefix;
    if prefix.is_empty() {
        return Ok(());
    }
    for name in repo.local_branches()? {
        if !name.starts_with(prefix.as_str()) || tree.get(&name).is_some() {
            continue;
        }
        let confirm = inquire::Confirm::new(
            format!("Track existing branch `{}` on top of trunk?", Blue.paint(&name)).as_str(),
        )
        .with_default(false)
        .prompt()?;
        if confirm {
            let head = repo.branch_head(&name)?.to_string();
            let trunk = tree.trunk_name.clone();
            tree.insert(
                &trunk,
                TrackedBranch::new(&name, None, &head, None),
                InsertPos::Last,
            )?;
        }
    }
    Ok(())
}

fn detect_main_branch(repo: &Repository) -> PkResult<String> {
    for candidate in ["main", "master", "develop"] {
        if repo.branch_exists(candidate) {
            return Ok(candidate.to_string());
        }
    }
    repo.current_branch_name().map_err(|_| {
        PkError::InvalidInput(
            "unable to detect the main branch; use `pk init --main-branch <name>`".to_string(),
        )
    })
}

fn detect_remote(repo: &Repository) -> Option<String> {
    let remotes = repo.remotes().ok()?;
    if remotes.iter().flatten().any(|name| name == "origin") {
        return Some("origin".to_string());
    }
    remotes.iter().flatten().next().map(ToOwned::to_owned)
}
