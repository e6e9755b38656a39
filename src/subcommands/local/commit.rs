//! `commit` and `amend` subcommands.

use crate::{
    ctx::PkContext,
    errors::{PkError, PkResult},
    git::RepositoryExt,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `commit` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CommitCmd {
    /// Commit message.
    #[clap(short, long)]
    message: Option<String>,
    /// Stage all tracked changes before committing.
    #[clap(short, long)]
    all: bool,
    /// Amend the last commit instead of creating a new one.
    #[clap(long)]
    amend: bool,
}

impl CommitCmd {
    /// Run the `commit` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let current = ctx.repository.current_branch_name()?;

        if self.amend {
            ctx.repository.amend_head(self.message.as_deref(), self.all)?;
            println!("Amended commit on branch `{}`.", Blue.paint(&current));
        } else {
            let message = self.message.ok_or_else(|| {
                PkError::InvalidInput("commit message required; use `-m <message>`".to_string())
            })?;
            ctx.repository.commit_staged(&message, self.all)?;
            println!("Created commit on branch `{}`.", Blue.paint(&current));
        }

        hint_descendants(&ctx, &current);
        Ok(())
    }
}

/// CLI arguments for the `amend` subcommand (shorthand for
/// `commit --amend --all`).
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct AmendCmd {
    /// Replace the commit message.
    #[clap(short, long)]
    message: Option<String>,
}

impl AmendCmd {
    /// Run the `amend` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let current = ctx.repository.current_branch_name()?;
        ctx.repository.amend_head(self.message.as_deref(), true)?;
        println!("Amended commit on branch `{}`.", Blue.paint(&current));
        hint_descendants(&ctx, &current);
        Ok(())
    }
}

fn hint_descendants(ctx: &PkContext<'_>, branch: &str) {
    if !ctx.tree.children(branch).is_empty() {
        println!("Descendants need a restack; run `pk sync`.");
    }
}
