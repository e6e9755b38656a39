//! `push` subcommand.

use crate::{
    ctx::PkContext,
    errors::{PkError, PkResult},
    forge::PrUpdate,
    git::{GitOutcome, RepositoryExt},
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `push` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct PushCmd {
    /// Push every branch in the current stack.
    #[clap(long)]
    all: bool,
    /// Push refs only; leave PR bases untouched.
    #[clap(long = "no-pr")]
    no_pr: bool,
}

impl PushCmd {
    /// Run the `push` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let current = ctx.repository.current_branch_name()?;
        if ctx.tree.get(&current).is_none() || ctx.tree.is_trunk(&current) {
            return Err(PkError::BranchNotTracked(current));
        }

        let targets: Vec<String> = if self.all {
            let bottom = ctx.tree.bottom_of(&current);
            let mut t = vec![bottom.clone()];
            t.extend(ctx.tree.descendants(&bottom));
            t
        } else {
            vec![current]
        };

        // PR bases drifted from parents are healed unless --no-pr.
        let needs_forge = !self.no_pr
            && targets.iter().any(|b| {
                ctx.tree
                    .get(b)
                    .and_then(|node| node.pr.as_ref().map(|pr| (node, pr)))
                    .map(|(node, pr)| node.parent.as_deref() != Some(pr.base.as_str()))
                    .unwrap_or(false)
            });
        let forge = if needs_forge { Some(ctx.forge()?) } else { None };

        let _lock = ctx.store.lock()?;
        let remote = ctx.config.repository.remote.clone();
        for branch in &targets {
            let expected = ctx
                .tree
                .get(branch)
                .and_then(|b| b.pr.as_ref())
                .map(|pr| pr.head.clone());
            match ctx.git.push_with_lease(&remote, branch, expected.as_deref())? {
                GitOutcome::Ok => {}
                GitOutcome::Diverged { branch } => return Err(PkError::RemoteDiverged(branch)),
                GitOutcome::Fatal { detail } => return Err(PkError::Fatal(detail)),
                GitOutcome::Conflict { .. } => unreachable!("push does not conflict"),
            }
            let head = ctx.repository.branch_head(branch)?.to_string();
            let parent = ctx.tree.parent(branch).map(ToOwned::to_owned);

            if let Some(node) = ctx.tree.get_mut(branch) {
                if let Some(pr) = node.pr.as_mut() {
                    pr.head = head;
                    if let (Some(forge), Some(parent)) = (forge.as_deref(), parent.as_deref()) {
                        if pr.base != parent {
                            forge
                                .update_pr(
                                    pr.id,
                                    &PrUpdate {
                                        base: Some(parent.to_string()),
                                        ..Default::default()
                                    },
                                )
                                .await?;
                            pr.base = parent.to_string();
                        }
                    }
                }
            }
            println!("Pushed `{}`.", Blue.paint(branch));
        }

        ctx.store.save(&ctx.tree)?;
        Ok(())
    }
}
