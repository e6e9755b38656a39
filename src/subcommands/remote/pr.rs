//! `pr` subcommand.

use crate::{
    ctx::PkContext,
    errors::{PkError, PkResult},
    git::RepositoryExt,
};
use chrono::Utc;
use clap::{Args, Subcommand};
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `pr` subcommand group.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct PrCmd {
    #[clap(subcommand)]
    command: PrSubcommands,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum PrSubcommands {
    /// Fetch and show the review/CI state of a branch's PR.
    Status {
        /// The branch to inspect (default: the current branch).
        branch: Option<String>,
    },
    /// List open PRs in the repository, marking tracked branches.
    List,
}

impl PrCmd {
    /// Run the `pr` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        match self.command {
            PrSubcommands::Status { branch } => {
                let branch = match branch {
                    Some(pattern) => ctx.tree.resolve(&pattern)?,
                    None => ctx.repository.current_branch_name()?,
                };
                let pr_id = ctx
                    .tree
                    .get(&branch)
                    .and_then(|b| b.pr.as_ref())
                    .map(|pr| pr.id)
                    .ok_or_else(|| {
                        PkError::InvalidInput(format!("`{branch}` has no PR; run `pk submit`"))
                    })?;

                let forge = ctx.forge()?;
                let status = forge.pr_status(pr_id).await?;
                println!(
                    "PR #{} for `{}`: {:?}, {}",
                    pr_id,
                    Blue.paint(&branch),
                    status.state,
                    status.summary()
                );

                // Cache the snapshot for `pk graph`.
                let _lock = ctx.store.lock()?;
                if let Some(pr) = ctx.tree.get_mut(&branch).and_then(|b| b.pr.as_mut()) {
                    pr.status = Some(status.summary());
                    pr.fetched_at = Some(Utc::now());
                }
                ctx.store.save(&ctx.tree)?;
            }
            PrSubcommands::List => {
                let forge = ctx.forge()?;
                for pr in forge.list_prs().await? {
                    let tracked = if ctx.tree.get(&pr.branch).is_some() {
                        " [tracked]"
                    } else {
                        ""
                    };
                    println!("#{} {}{}", pr.id, pr.branch, tracked);
                }
            }
        }
        Ok(())
    }
}
