//! `branch delete` subcommand.

use crate::{
    ctx::PkContext,
    engine::Engine,
    errors::PkResult,
    git::RepositoryExt,
    plan::Intent,
};
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `branch delete` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DeleteCmd {
    /// Name of the branch to delete.
    #[clap(index = 1)]
    branch_name: Option<String>,
    /// Skip the confirmation prompt and delete unmerged work.
    #[clap(long)]
    force: bool,
}

impl DeleteCmd {
    /// Run the `branch delete` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let branch_name = match self.branch_name {
            Some(name) => ctx.tree.resolve(&name)?,
            None => {
                let display_branches = ctx.display_branches()?;
                inquire::Select::new("Select a branch to delete", display_branches)
                    .with_formatter(&|f| f.value.branch_name.clone())
                    .prompt()?
                    .branch_name
            }
        };

        // Ask for confirmation to prevent accidental deletion of local refs.
        if !self.force {
            let confirm = inquire::Confirm::new(
                format!(
                    "Are you sure you want to delete branch `{}`?",
                    Color::Blue.paint(&branch_name)
                )
                .as_str(),
            )
            .with_default(false)
            .prompt()?;
            if !confirm {
                return Ok(());
            }
        }

        let needs_forge = {
            let own_pr = ctx
                .tree
                .get(&branch_name)
                .map(|b| b.pr.is_some())
                .unwrap_or(false);
            let child_pr = ctx
                .tree
                .children(&branch_name)
                .iter()
                .any(|c| ctx.tree.get(c).map(|b| b.pr.is_some()).unwrap_or(false));
            own_pr || child_pr
        };
        let forge = if needs_forge { Some(ctx.forge()?) } else { None };

        let child_count = ctx.tree.children(&branch_name).len();
        let original = ctx.repository.current_branch_name().ok();
        let mut engine = Engine::new(&mut ctx);
        if let Some(forge) = forge {
            engine = engine.with_forge(forge);
        }
        engine
            .execute(Intent::Delete {
                name: branch_name.clone(),
                force: self.force,
            })
            .await?;

        // Child rebases may have moved HEAD; return to where the user was.
        if let Some(original) = original {
            if original != branch_name && ctx.repository.branch_exists(&original) {
                ctx.repository.checkout_branch(&original)?;
            }
        }

        if child_count == 0 {
            println!(
                "Deleted branch `{}`. `pk undo` reverses this.",
                Color::Blue.paint(&branch_name)
            );
        } else {
            println!(
                "Deleted branch `{}` and restacked {} child branch(es). `pk undo` reverses this.",
                Color::Blue.paint(&branch_name),
                child_count
            );
        }
        Ok(())
    }
}
