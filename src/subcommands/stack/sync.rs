//! `sync` subcommand.

use crate::{
    ctx::PkContext,
    engine::Engine,
    errors::{PkError, PkResult},
    git::RepositoryExt,
    plan::Intent,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `sync` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SyncCmd {
    /// Sync the entire stack, starting from the bottom.
    #[clap(long)]
    all: bool,
    /// Fetch the trunk from the remote first, then sync the whole stack.
    #[clap(long = "from-main")]
    from_main: bool,
    /// Continue an in-progress sync after resolving conflicts.
    #[clap(long = "continue")]
    continue_rebase: bool,
    /// Abort the in-progress sync.
    #[clap(long)]
    abort: bool,
}

impl SyncCmd {
    /// Run the `sync` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        if self.continue_rebase && self.abort {
            return Err(PkError::InvalidInput(
                "cannot use --continue and --abort together".to_string(),
            ));
        }
        if self.continue_rebase {
            Engine::new(&mut ctx).resume().await?;
            println!("Sync finished.");
            return Ok(());
        }
        if self.abort {
            Engine::new(&mut ctx).abort()?;
            println!("Aborted sync; branches restored.");
            return Ok(());
        }

        let current = ctx.repository.current_branch_name()?;
        if ctx.tree.get(&current).is_none() {
            return Err(PkError::BranchNotTracked(current));
        }

        if self.from_main {
            // Bring the trunk up to date before restacking onto it. The
            // fetch fast-forwards the local trunk ref directly.
            let remote = ctx.config.repository.remote.clone();
            let trunk = ctx.tree.trunk_name.clone();
            ctx.git.fetch(&remote, Some(&format!("{trunk}:{trunk}")))?;
        }

        let root = if self.all || self.from_main {
            ctx.tree.bottom_of(&current)
        } else {
            current.clone()
        };

        Engine::new(&mut ctx)
            .execute(Intent::Restack { root: root.clone() })
            .await?;

        // Rebasing leaves HEAD on the last rebased branch.
        ctx.repository.checkout_branch(&current)?;
        println!(
            "Synced `{}` and its descendants.",
            Blue.paint(&root)
        );
        Ok(())
    }
}
