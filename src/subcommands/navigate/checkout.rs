//! `checkout` subcommand.

use crate::{ctx::PkContext, errors::PkResult, git::RepositoryExt};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `checkout` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CheckoutCmd {
    /// The branch to check out (fuzzy-matched). Prompts when omitted.
    #[clap(index = 1)]
    branch: Option<String>,
}

impl CheckoutCmd {
    /// Run the `checkout` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let branch = match self.branch {
            Some(pattern) => ctx.tree.resolve(&pattern)?,
            None => {
                let branches = ctx.display_branches()?;
                inquire::Select::new("Select a branch to checkout", branches)
                    .with_formatter(&|f| f.value.branch_name.clone())
                    .prompt()?
                    .branch_name
            }
        };
        ctx.repository.checkout_branch(&branch)?;
        println!("Switched to branch `{}`.", Blue.paint(&branch));
        Ok(())
    }
}
