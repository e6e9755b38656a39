//! `branch create` subcommand.

use crate::{
    ctx::PkContext,
    engine::Engine,
    errors::{PkError, PkResult},
    git::RepositoryExt,
    plan::Intent,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `branch create` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CreateCmd {
    /// Name of the new branch.
    #[clap(index = 1)]
    branch_name: Option<String>,
    /// Base the new branch on a specific tracked branch instead of the
    /// current one.
    #[clap(long, conflicts_with_all = ["insert_before", "insert_after"])]
    base: Option<String>,
    /// Insert the new branch between the named branch and its parent.
    #[clap(long = "insert-before")]
    insert_before: Option<String>,
    /// Insert the new branch between the named branch and its children.
    #[clap(long = "insert-after", conflicts_with = "insert_before")]
    insert_after: Option<String>,
}

impl CreateCmd {
    /// Run the `branch create` subcommand.
    pub async fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        let branch_name = match self.branch_name {
            Some(name) => name,
            None => inquire::Text::new("Name of new branch:").prompt()?,
        };

        let intent = if let Some(before) = self.insert_before {
            let before = ctx.tree.resolve(&before)?;
            Intent::InsertBefore {
                name: branch_name.clone(),
                before,
            }
        } else if let Some(after) = self.insert_after {
            let after = ctx.tree.resolve(&after)?;
            Intent::InsertAfter {
                name: branch_name.clone(),
                after,
            }
        } else {
            let parent = match self.base {
                Some(base) => ctx.tree.resolve(&base)?,
                None => {
                    let current = ctx.repository.current_branch_name()?;
                    if ctx.tree.get(&current).is_none() {
                        return Err(PkError::BranchNotTracked(current));
                    }
                    current
                }
            };
            Intent::Create {
                name: branch_name.clone(),
                parent,
            }
        };

        let parent_desc = match &intent {
            Intent::Create { parent, .. } => parent.clone(),
            Intent::InsertBefore { before, .. } => {
                ctx.tree.parent(before).unwrap_or_default().to_string()
            }
            Intent::InsertAfter { after, .. } => after.clone(),
            _ => unreachable!(),
        };

        Engine::new(&mut ctx).execute(intent).await?;
        ctx.repository.checkout_branch(&branch_name)?;

        println!(
            "Created and tracked branch `{}` on top of `{}`.",
            Blue.paint(&branch_name),
            Blue.paint(&parent_desc)
        );
        Ok(())
    }
}
