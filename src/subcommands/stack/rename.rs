//! `branch rename` subcommand.

use crate::{
    ctx::PkContext, engine::Engine, errors::PkResult, git::RepositoryExt, plan::Intent,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `branch rename` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RenameCmd {
    /// The branch to rename, or the new name for the current branch when a
    /// second argument is omitted (the `git branch -m` convention).
    #[clap(index = 1)]
    first: String,
    /// The new name.
    #[clap(index = 2)]
    second: Option<String>,
}

impl RenameCmd {
    /// Run the `branch rename` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let (old, new) = match self.second {
            Some(new) => (ctx.tree.resolve(&self.first)?, new),
            None => (ctx.repository.current_branch_name()?, self.first),
        };

        // Children with PRs have their base branch renamed on the forge.
        let needs_forge = ctx
            .tree
            .children(&old)
            .iter()
            .any(|c| ctx.tree.get(c).map(|b| b.pr.is_some()).unwrap_or(false));
        let forge = if needs_forge { Some(ctx.forge()?) } else { None };

        let mut engine = Engine::new(&mut ctx);
        if let Some(forge) = forge {
            engine = engine.with_forge(forge);
        }
        engine
            .execute(Intent::Rename {
                old: old.clone(),
                new: new.clone(),
            })
            .await?;

        println!("Renamed `{}` to `{}`.", Blue.paint(&old), Blue.paint(&new));
        Ok(())
    }
}
