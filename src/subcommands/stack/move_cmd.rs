//! `move` subcommand.

use crate::{
    ctx::PkContext, engine::Engine, errors::PkResult, git::RepositoryExt, plan::Intent,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `move` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct MoveCmd {
    /// The new parent branch.
    #[clap(long)]
    to: String,
    /// The branch to move (default: the current branch).
    #[clap(long)]
    from: Option<String>,
}

impl MoveCmd {
    /// Run the `move` subcommand. The moved branch and its descendants are
    /// rewritten onto the new parent; pushed branches need a lease re-push
    /// on the next submit.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let branch = match self.from {
            Some(from) => ctx.tree.resolve(&from)?,
            None => ctx.repository.current_branch_name()?,
        };
        let onto = ctx.tree.resolve(&self.to)?;

        Engine::new(&mut ctx)
            .execute(Intent::Move {
                branch: branch.clone(),
                onto: onto.clone(),
            })
            .await?;

        println!(
            "Moved `{}` onto `{}`. Re-submit to update pull requests.",
            Blue.paint(&branch),
            Blue.paint(&onto)
        );
        Ok(())
    }
}
