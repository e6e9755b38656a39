//! Subcommands pertaining to stack management.

use crate::{ctx::PkContext, errors::PkResult};
use clap::Subcommand;

mod create;
pub use create::CreateCmd;

mod rename;
pub use rename::RenameCmd;

mod delete;
pub use delete::DeleteCmd;

mod log;
pub use log::{GraphCmd, LogCmd};

mod restack;
pub use restack::RestackCmd;

mod sync;
pub use sync::SyncCmd;

mod move_cmd;
pub use move_cmd::MoveCmd;

mod repair;
pub use repair::StackCmd;

/// The `pk branch` subcommand group.
#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct BranchCmd {
    #[clap(subcommand)]
    command: BranchSubcommands,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
enum BranchSubcommands {
    /// Create and track a new branch within the current stack.
    #[clap(visible_alias = "c")]
    Create(CreateCmd),
    /// Rename a tracked branch.
    #[clap(visible_alias = "rn")]
    Rename(RenameCmd),
    /// Delete a branch that is tracked with `pk`.
    #[clap(visible_aliases = ["d", "del"])]
    Delete(DeleteCmd),
    /// Checkout a branch that is tracked with `pk`.
    #[clap(visible_alias = "co")]
    Checkout(crate::subcommands::navigate::CheckoutCmd),
}

impl BranchCmd {
    pub async fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        match self.command {
            BranchSubcommands::Create(cmd) => cmd.run(ctx).await,
            BranchSubcommands::Rename(cmd) => cmd.run(ctx).await,
            BranchSubcommands::Delete(cmd) => cmd.run(ctx).await,
            BranchSubcommands::Checkout(cmd) => cmd.run(ctx),
        }
    }
}
