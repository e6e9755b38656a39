//! `up`, `down`, `top`, and `bottom` subcommands.

use crate::{
    ctx::PkContext,
    errors::{PkError, PkResult},
    git::RepositoryExt,
};
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `up` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UpCmd {
    /// Number of branches to move towards the top of the stack.
    #[clap(index = 1)]
    count: Option<usize>,
}

impl UpCmd {
    /// Run the `up` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let count = self.count.unwrap_or(1);
        let mut target = tracked_current(&ctx)?;

        for moved in 0..count {
            let children = ctx.tree.children(&target);
            match children.len() {
                0 => {
                    return Err(PkError::InvalidInput(if moved == 0 {
                        format!("`{target}` has no children in the stack")
                    } else {
                        format!("cannot move up {count} branches (only moved {moved})")
                    }));
                }
                1 => target = children[0].clone(),
                _ => {
                    if count > 1 {
                        return Err(PkError::InvalidInput(format!(
                            "`{target}` has multiple children; move up one step at a time"
                        )));
                    }
                    target = inquire::Select::new(
                        &format!("`{target}` has multiple children. Pick one:"),
                        children.to_vec(),
                    )
                    .prompt()?;
                }
            }
        }

        switch(&ctx, &target)
    }
}

/// CLI arguments for the `down` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DownCmd {
    /// Number of branches to move towards the trunk.
    #[clap(index = 1)]
    count: Option<usize>,
}

impl DownCmd {
    /// Run the `down` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let count = self.count.unwrap_or(1);
        let mut target = tracked_current(&ctx)?;

        for moved in 0..count {
            match ctx.tree.parent(&target) {
                Some(parent) => target = parent.to_string(),
                None => {
                    return Err(PkError::InvalidInput(if moved == 0 {
                        format!("`{target}` has no parent in the stack")
                    } else {
                        format!("cannot move down {count} branches (only moved {moved})")
                    }));
                }
            }
        }

        switch(&ctx, &target)
    }
}

/// CLI arguments for the `top` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct TopCmd;

impl TopCmd {
    /// Run the `top` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let current = tracked_current(&ctx)?;
        let top = ctx.tree.top_of(&current);
        if top == current {
            println!("Already at the top of the stack: `{}`.", Blue.paint(&current));
            return Ok(());
        }
        switch(&ctx, &top)
    }
}

/// CLI arguments for the `bottom` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct BottomCmd;

impl BottomCmd {
    /// Run the `bottom` subcommand.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let current = tracked_current(&ctx)?;
        let bottom = ctx.tree.bottom_of(&current);
        if bottom == current {
            println!(
                "Already at the bottom of the stack: `{}`.",
                Blue.paint(&current)
            );
            return Ok(());
        }
        switch(&ctx, &bottom)
    }
}

fn tracked_current(ctx: &PkContext<'_>) -> PkResult<String> {
    let current = ctx.repository.current_branch_name()?;
    if ctx.tree.get(&current).is_none() {
        return Err(PkError::BranchNotTracked(current));
    }
    Ok(current)
}

fn switch(ctx: &PkContext<'_>, target: &str) -> PkResult<()> {
    ctx.repository.checkout_branch(target)?;
    println!("Switched to branch `{}`.", Blue.paint(target));
    Ok(())
}
