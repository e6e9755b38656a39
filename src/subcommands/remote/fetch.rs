//! `fetch` subcommand.

use crate::{ctx::PkContext, errors::PkResult};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `fetch` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct FetchCmd;

impl FetchCmd {
    /// Run the `fetch` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let remote = ctx.config.repository.remote.clone();
        ctx.git.fetch(&remote, None)?;
        println!("Fetched `{}`.", Blue.paint(&remote));
        Ok(())
    }
}
