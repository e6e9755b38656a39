//! `log` and `graph` subcommands.

use crate::{ctx::PkContext, errors::PkResult};
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `log` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct LogCmd {
    /// Show all stacks (the default).
    #[clap(long = "all")]
    _all: bool,
    /// Print the condensed one-line-per-path form.
    #[clap(long)]
    short: bool,
}

impl LogCmd {
    /// Run the `log` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        if ctx.tree.stack_branches().is_empty() {
            println!("No tracked stacks yet. Create one with `pk bc <name>`.");
            return Ok(());
        }
        if self.short {
            ctx.print_short()
        } else {
            ctx.print_tree()
        }
    }
}

/// CLI arguments for the `graph` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct GraphCmd;

impl GraphCmd {
    /// Run the `graph` subcommand: the tree plus last-fetched PR state.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        ctx.print_tree()?;
        for name in ctx.tree.stack_branches() {
            let Some(branch) = ctx.tree.get(&name) else {
                continue;
            };
            if let Some(pr) = &branch.pr {
                let status = pr.status.as_deref().unwrap_or("not fetched");
                let age = pr
                    .fetched_at
                    .map(|t| format!(" (as of {})", t.format("%Y-%m-%d %H:%M UTC")))
                    .unwrap_or_default();
                println!(
                    "  {} #{} base {} {}{}",
                    Color::Blue.paint(&name),
                    pr.id,
                    pr.base,
                    status,
                    age
                );
            }
        }
        Ok(())
    }
}
