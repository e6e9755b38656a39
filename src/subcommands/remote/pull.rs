//! `pull` subcommand.

use crate::{ctx::PkContext, errors::PkResult, git::RepositoryExt};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `pull` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct PullCmd;

impl PullCmd {
    /// Run the `pull` subcommand: fetch the remote and fast-forward the
    /// trunk. Stacked branches are left alone; `pk sync` restacks them.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let remote = ctx.config.repository.remote.clone();
        let trunk = ctx.tree.trunk_name.clone();
        let current = ctx.repository.current_branch_name()?;

        ctx.git.fetch(&remote, None)?;
        if current == trunk {
            ctx.git.merge_ff(&format!("{remote}/{trunk}"))?;
        } else {
            // A non-checked-out trunk can be fast-forwarded in place.
            ctx.git.fetch(&remote, Some(&format!("{trunk}:{trunk}")))?;
        }

        println!(
            "Fetched `{}` and fast-forwarded `{}`. Run `pk sync --all` to restack.",
            Blue.paint(&remote),
            Blue.paint(&trunk)
        );
        Ok(())
    }
}
