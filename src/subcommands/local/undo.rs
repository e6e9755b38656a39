//! `undo` and `redo` subcommands.

use crate::{ctx::PkContext, engine::Engine, errors::PkResult};
use clap::Args;

/// CLI arguments for the `undo` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UndoCmd {
    /// Reverse even if the involved branches were pushed since.
    #[clap(long)]
    force: bool,
}

impl UndoCmd {
    /// Run the `undo` subcommand.
    pub fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        Engine::new(&mut ctx).undo(self.force)?;
        println!("Reversed the last operation. `pk redo` re-applies it.");
        Ok(())
    }
}

/// CLI arguments for the `redo` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RedoCmd;

impl RedoCmd {
    /// Run the `redo` subcommand.
    pub fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        Engine::new(&mut ctx).redo()?;
        println!("Re-applied the undone operation.");
        Ok(())
    }
}
