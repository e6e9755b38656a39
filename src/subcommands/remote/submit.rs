//! `submit` subcommand.

use crate::{
    ctx::PkContext,
    errors::{PkError, PkResult},
    forge::{splice_stack_block, stack_block_for, CreatePr, PrUpdate},
    git::{GitOutcome, RepositoryExt},
    reconcile,
    tree::PrBinding,
};
use clap::Args;
use nu_ansi_term::Color::Blue;
use std::fs;

/// CLI arguments for the `submit` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SubmitCmd {
    /// Submit every branch in the current stack, bottom first.
    #[clap(long)]
    all: bool,
    /// Submit the named branch and its descendants.
    #[clap(long, conflicts_with = "all")]
    from: Option<String>,
    /// Open new PRs as drafts.
    #[clap(long)]
    draft: bool,
    /// Skip the title prompt; use each branch's head commit summary.
    #[clap(long = "no-edit")]
    no_edit: bool,
}

impl SubmitCmd {
    /// Run the `submit` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let current = ctx.repository.current_branch_name()?;
        let targets = self.targets(&ctx, &current)?;
        if targets.is_empty() {
            println!("Nothing to submit.");
            return Ok(());
        }

        // Refuse to publish a stack that is not internally consistent.
        if let Some(stale) = targets.iter().find(|b| ctx.needs_restack(b)) {
            return Err(PkError::InvalidInput(format!(
                "`{stale}` needs a restack; run `pk sync` first"
            )));
        }
        if !ctx.repository.is_working_tree_clean()? {
            return Err(PkError::WorkingTreeDirty);
        }

        let forge = ctx.forge()?;
        let _lock = ctx.store.lock()?;
        ctx.journal.ensure_idle()?;
        reconcile::adopt_heads(&mut ctx.tree, ctx.repository)?;

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

            let parent = ctx
                .tree
                .parent(branch)
                .ok_or(PkError::TrunkImmutable("submit"))?
                .to_string();

            match ctx.tree.get(branch).and_then(|b| b.pr.clone()) {
                None => {
                    let title = if self.no_edit {
                        head_summary(&ctx, branch)?
                    } else {
                        inquire::Text::new(
                            format!("Title for `{branch}` -> `{parent}`:").as_str(),
                        )
                        .with_initial_value(&head_summary(&ctx, branch)?)
                        .prompt()?
                    };
                    let draft = self.draft || ctx.config.pr.draft_by_default;
                    let body = template_body(&ctx);
                    let created = forge
                        .create_pr(&CreatePr {
                            branch: branch.clone(),
                            base: parent.clone(),
                            title,
                            body,
                            draft,
                        })
                        .await?;
                    if let Some(node) = ctx.tree.get_mut(branch) {
                        node.pr = Some(PrBinding {
                            id: created.id,
                            url: created.url.clone(),
                            base: parent.clone(),
                            head: head.clone(),
                            draft,
                            status: None,
                            fetched_at: None,
                        });
                    }
                    let verb = if created.existing { "Updated" } else { "Opened" };
                    println!(
                        "{verb} PR #{} for `{}` -> `{}`.",
                        created.id,
                        Blue.paint(branch),
                        Blue.paint(&parent)
                    );
                }
                Some(pr) => {
                    // Heal remote base drift (R5) lazily on submit.
                    if pr.base != parent {
                        forge
                            .update_pr(
                                pr.id,
                                &PrUpdate {
                                    base: Some(parent.clone()),
                                    ..Default::default()
                                },
                            )
                            .await?;
                    }
                    if let Some(node) = ctx.tree.get_mut(branch) {
                        if let Some(binding) = node.pr.as_mut() {
                            binding.base = parent.clone();
                            binding.head = head.clone();
                        }
                    }
                    println!(
                        "Pushed `{}` and refreshed PR #{}.",
                        Blue.paint(branch),
                        pr.id
                    );
                }
            }
        }

        // Second pass: every PR on the path gets the final stack block, now
        // that all PR numbers are known.
        for branch in &targets {
            let Some(pr_id) = ctx.tree.get(branch).and_then(|b| b.pr.as_ref()).map(|p| p.id)
            else {
                continue;
            };
            let block = stack_block_for(&ctx.tree, branch);
            let body = forge.pr_body(pr_id).await?;
            forge
                .update_pr(
                    pr_id,
                    &PrUpdate {
                        body: Some(splice_stack_block(&body, &block)),
                        ..Default::default()
                    },
                )
                .await?;
        }

        ctx.store.save(&ctx.tree)?;
        Ok(())
    }

    /// The branches to submit, bottom first.
    fn targets(&self, ctx: &PkContext<'_>, current: &str) -> PkResult<Vec<String>> {
        let root = if self.all {
            if ctx.tree.get(current).is_none() || ctx.tree.is_trunk(current) {
                return Err(PkError::BranchNotTracked(current.to_string()));
            }
            ctx.tree.bottom_of(current)
        } else if let Some(from) = &self.from {
            ctx.tree.resolve(from)?
        } else {
            if ctx.tree.get(current).is_none() || ctx.tree.is_trunk(current) {
                return Err(PkError::BranchNotTracked(current.to_string()));
            }
            return Ok(vec![current.to_string()]);
        };
        let mut targets = vec![root.clone()];
        targets.extend(ctx.tree.descendants(&root));
        Ok(targets)
    }
}

fn head_summary(ctx: &PkContext<'_>, branch: &str) -> PkResult<String> {
    let head = ctx.repository.branch_head(branch)?;
    let commit = ctx.repository.find_commit(head)?;
    Ok(commit.summary().unwrap_or(branch).to_string())
}

/// The configured PR template, or an empty body.
fn template_body(ctx: &PkContext<'_>) -> String {
    let path = ctx.repo_root.join(&ctx.config.pr.template);
    fs::read_to_string(path).unwrap_or_default()
}
