//! `restack` subcommand.

use crate::{
    ctx::PkContext,
    engine::Engine,
    errors::{PkError, PkResult},
    git::RepositoryExt,
    plan::Intent,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `restack` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RestackCmd {
    /// Continue an in-progress restack after resolving conflicts.
    #[clap(long = "continue")]
    continue_rebase: bool,
    /// Abort the in-progress restack.
    #[clap(long)]
    abort: bool,
}

impl RestackCmd {
    /// Run the `restack` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        if self.continue_rebase && self.abort {
            return Err(PkError::InvalidInput(
                "cannot use --continue and --abort together".to_string(),
            ));
        }
        if self.continue_rebase {
            Engine::new(&mut ctx).resume().await?;
            println!("Restack finished.");
            return Ok(());
        }
        if self.abort {
            Engine::new(&mut ctx).abort()?;
            println!("Aborted restack; branches restored.");
            return Ok(());
        }

        let current = ctx.repository.current_branch_name()?;
        if ctx.tree.get(&current).is_none() {
            return Err(PkError::BranchNotTracked(current));
        }
        let bottom = ctx.tree.bottom_of(&current);

        Engine::new(&mut ctx)
            .execute(Intent::Restack { root: bottom.clone() })
            .await?;

        ctx.repository.checkout_branch(&current)?;
        println!("Restacked the stack rooted at `{}`.", Blue.paint(&bottom));
        Ok(())
    }
}
