//! The subcommands for the `pk` application.

use crate::{ctx::PkContext, errors::PkResult};
use clap::Subcommand;

pub mod local;
pub mod navigate;
pub mod remote;
pub mod stack;

use local::{AmendCmd, CommitCmd, ConfigCmd, InitCmd, RedoCmd, UndoCmd};
use navigate::{BottomCmd, CheckoutCmd, DownCmd, TopCmd, UpCmd};
use remote::{FetchCmd, LandCmd, PrCmd, PullCmd, PushCmd, SubmitCmd};
use stack::{
    BranchCmd, CreateCmd, DeleteCmd, GraphCmd, LogCmd, MoveCmd, RenameCmd, RestackCmd, StackCmd,
    SyncCmd,
};

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Subcommands {
    /// Initialize pancake in the current repository.
    Init(InitCmd),
    /// Branch management commands.
    Branch(BranchCmd),
    /// Create and track a new branch within the current stack.
    #[clap(name = "bc")]
    Bc(CreateCmd),
    /// Rename a tracked branch.
    #[clap(name = "br")]
    Br(RenameCmd),
    /// Delete a branch that is tracked with `pk`.
    #[clap(name = "bd")]
    Bd(DeleteCmd),
    /// Checkout a branch that is tracked with `pk`.
    #[clap(name = "co")]
    Co(CheckoutCmd),
    /// Navigate up the stack, towards children.
    #[clap(visible_alias = "u")]
    Up(UpCmd),
    /// Navigate down the stack, towards the trunk.
    #[clap(visible_alias = "d")]
    Down(DownCmd),
    /// Navigate to the top of the current stack.
    Top(TopCmd),
    /// Navigate to the bottom of the current stack, just above trunk.
    Bottom(BottomCmd),
    /// Print a tree of all tracked stacks.
    #[clap(visible_aliases = ["l", "ls"])]
    Log(LogCmd),
    /// Restack the current branch and its descendants onto fresh parents.
    #[clap(visible_alias = "s")]
    Sync(SyncCmd),
    /// Restack the entire current stack from the bottom.
    #[clap(visible_alias = "r")]
    Restack(RestackCmd),
    /// Create a commit on the current branch.
    #[clap(visible_alias = "c")]
    Commit(CommitCmd),
    /// Amend the current branch's head commit.
    Amend(AmendCmd),
    /// Move a branch (and its descendants) onto a new parent.
    Move(MoveCmd),
    /// Push branches and open or refresh their pull requests.
    #[clap(visible_alias = "sub")]
    Submit(SubmitCmd),
    /// Inspect pull requests bound to the stack.
    Pr(PrCmd),
    /// Merge the bottom PR of the stack and fold the stack down.
    Land(LandCmd),
    /// Show the stack with drift diagnostics; `--repair` reconciles.
    Stack(StackCmd),
    /// Show the stack annotated with PR state.
    Graph(GraphCmd),
    /// Push branches to the remote with a lease.
    Push(PushCmd),
    /// Fetch the remote and fast-forward the trunk branch.
    Pull(PullCmd),
    /// Fetch the remote.
    Fetch(FetchCmd),
    /// Reverse the last completed operation.
    Undo(UndoCmd),
    /// Re-apply the last undone operation.
    Redo(RedoCmd),
    /// Show or edit the repository configuration.
    Config(ConfigCmd),
}

impl Subcommands {
    /// Whether the subcommand tolerates a corrupt metadata file: read-only
    /// commands recover transparently from git notes, and `stack --repair`
    /// is itself the recovery path.
    pub fn recovers_from_corrupt_metadata(&self) -> bool {
        matches!(
            self,
            Self::Log(_)
                | Self::Graph(_)
                | Self::Up(_)
                | Self::Down(_)
                | Self::Top(_)
                | Self::Bottom(_)
                | Self::Co(_)
                | Self::Config(_)
                | Self::Stack(_)
        )
    }

    /// Run the subcommand with the given context.
    pub async fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        match self {
            Self::Init(_) => unreachable!("init runs before a context exists"),
            Self::Branch(cmd) => cmd.run(ctx).await,
            Self::Bc(cmd) => cmd.run(ctx).await,
            Self::Br(cmd) => cmd.run(ctx).await,
            Self::Bd(cmd) => cmd.run(ctx).await,
            Self::Co(cmd) => cmd.run(ctx),
            Self::Up(cmd) => cmd.run(ctx),
            Self::Down(cmd) => cmd.run(ctx),
            Self::Top(cmd) => cmd.run(ctx),
            Self::Bottom(cmd) => cmd.run(ctx),
            Self::Log(cmd) => cmd.run(ctx),
            Self::Sync(cmd) => cmd.run(ctx).await,
            Self::Restack(cmd) => cmd.run(ctx).await,
            Self::Commit(cmd) => cmd.run(ctx),
            Self::Amend(cmd) => cmd.run(ctx),
            Self::Move(cmd) => cmd.run(ctx).await,
            Self::Submit(cmd) => cmd.run(ctx).await,
            Self::Pr(cmd) => cmd.run(ctx).await,
            Self::Land(cmd) => cmd.run(ctx).await,
            Self::Stack(cmd) => cmd.run(ctx),
            Self::Graph(cmd) => cmd.run(ctx),
            Self::Push(cmd) => cmd.run(ctx).await,
            Self::Pull(cmd) => cmd.run(ctx),
            Self::Fetch(cmd) => cmd.run(ctx),
            Self::Undo(cmd) => cmd.run(ctx),
            Self::Redo(cmd) => cmd.run(ctx),
            Self::Config(cmd) => cmd.run(ctx),
        }
    }
}
