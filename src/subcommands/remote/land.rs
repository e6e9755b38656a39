//! `land` subcommand.

use crate::{
    ctx::PkContext,
    engine::Engine,
    errors::{PkError, PkResult},
    git::RepositoryExt,
    plan::{Intent, MergeMethod},
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `land` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct LandCmd {
    /// Squash-merge the PR (the default).
    #[clap(long)]
    squash: bool,
    /// Merge with a merge commit.
    #[clap(long, conflicts_with = "squash")]
    merge: bool,
    /// Rebase-merge the PR.
    #[clap(long, conflicts_with_all = ["squash", "merge"])]
    rebase: bool,
    /// Land the entire current path, bottom-up.
    #[clap(long)]
    all: bool,
}

impl LandCmd {
    /// Run the `land` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let method = if self.merge {
            MergeMethod::Merge
        } else if self.rebase {
            MergeMethod::Rebase
        } else {
            MergeMethod::Squash
        };

        let current = ctx.repository.current_branch_name()?;
        if ctx.tree.get(&current).is_none() || ctx.tree.is_trunk(&current) {
            return Err(PkError::BranchNotTracked(current));
        }

        // Bottom-up: each landed branch folds its children onto the trunk,
        // so the next target is simply the new bottom of the same path.
        let targets: Vec<String> = if self.all {
            let mut path: Vec<String> = ctx
                .tree
                .ancestors(&current)
                .into_iter()
                .filter(|a| !ctx.tree.is_trunk(a))
                .collect();
            path.reverse();
            path.push(current.clone());
            let mut cursor = current.clone();
            while let Some(first) = ctx.tree.children(&cursor).first().cloned() {
                path.push(first.clone());
                cursor = first;
            }
            path
        } else {
            vec![ctx.tree.bottom_of(&current)]
        };

        for branch in targets {
            let has_pr = ctx
                .tree
                .get(&branch)
                .map(|b| b.pr.is_some())
                .unwrap_or(false);
            if !has_pr {
                return Err(PkError::InvalidInput(format!(
                    "`{branch}` has no PR; run `pk submit` first"
                )));
            }
            let forge = ctx.forge()?;
            Engine::new(&mut ctx)
                .with_forge(forge)
                .execute(Intent::Land {
                    name: branch.clone(),
                    method,
                })
                .await?;
            println!(
                "Landed `{}`. `pk undo` restores the local branch and metadata.",
                Blue.paint(&branch)
            );
        }
        Ok(())
    }
}
