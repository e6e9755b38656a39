//! `stack` subcommand: drift diagnostics and repair.

use crate::{
    ctx::PkContext,
    errors::PkResult,
    reconcile::{self, Drift},
    store::notes,
};
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `stack` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct StackCmd {
    /// Reconcile metadata with local refs (and rebuild from git notes when
    /// the metadata file is lost).
    #[clap(long)]
    repair: bool,
}

impl StackCmd {
    /// Run the `stack` subcommand.
    pub fn run(self, mut ctx: PkContext<'_>) -> PkResult<()> {
        if self.repair {
            return run_repair(&mut ctx);
        }

        ctx.print_tree()?;
        let report = reconcile::detect(
            &ctx.tree,
            ctx.repository,
            &ctx.journal,
            &ctx.config.stack.prefix,
        )?;
        if report.is_clean() {
            println!("\nMetadata, refs, and PR bases agree.");
            return Ok(());
        }
        println!();
        for drift in &report.drifts {
            match drift {
                Drift::OrphanedBranch { branch } => println!(
                    "{} `{branch}` is tracked but its ref is gone; `pk bd {branch}` or restore the ref",
                    Color::Red.paint("orphaned:")
                ),
                Drift::DeferredMissingRef { branch } => println!(
                    "{} `{branch}` is missing but belongs to a suspended operation",
                    Color::Yellow.paint("deferred:")
                ),
                Drift::UntrackedRef { branch } => println!(
                    "{} `{branch}` matches the stack prefix but is untracked; adopt with `pk init`",
                    Color::Yellow.paint("untracked:")
                ),
                Drift::DivergentHead { branch, .. } => println!(
                    "{} `{branch}` moved outside pk; heads are adopted on the next operation",
                    Color::Yellow.paint("diverged:")
                ),
                Drift::RemoteBaseDrift { branch, submitted_base, parent } => println!(
                    "{} `{branch}` PR base is `{submitted_base}` but its parent is `{parent}`; healed on next submit",
                    Color::Yellow.paint("pr-base:")
                ),
            }
        }
        println!("\nRun `pk stack --repair` to reconcile what can be repaired.");
        Ok(())
    }
}

fn run_repair(ctx: &mut PkContext<'_>) -> PkResult<()> {
    let _lock = ctx.store.lock()?;

    // Lost or corrupt metadata file: rebuild the whole tree from the notes
    // mirror.
    let rebuilt = if !ctx.store.exists() || ctx.store.try_load_file().is_err() {
        ctx.tree =
            reconcile::rebuild_from_notes(ctx.repository, &ctx.config.repository.main_branch)?;
        true
    } else {
        false
    };

    let moved = reconcile::adopt_heads(&mut ctx.tree, ctx.repository)?;

    // Drop tracked branches whose refs are gone for good.
    let report = reconcile::detect(&ctx.tree, ctx.repository, &ctx.journal, "")?;
    let mut dropped = Vec::new();
    for drift in &report.drifts {
        if let Drift::OrphanedBranch { branch } = drift {
            ctx.tree.remove(branch)?;
            dropped.push(branch.clone());
        }
    }

    ctx.store.save(&ctx.tree)?;
    notes::sync_tree(ctx.repository, &ctx.tree)?;

    if rebuilt {
        println!("Rebuilt stack metadata from git notes.");
    }
    if !moved.is_empty() {
        println!("Adopted new heads for: {}.", moved.join(", "));
    }
    if !dropped.is_empty() {
        println!(
            "Untracked branches with missing refs: {}.",
            dropped.join(", ")
        );
    }
    if !rebuilt && moved.is_empty() && dropped.is_empty() {
        println!("Nothing to repair.");
    }
    Ok(())
}
