//! Three-way alignment of metadata, local refs, and remote PR state.
//!
//! The reconciler runs at the start of every structural operation and on
//! demand (`pk stack`, `pk log`). It never mutates on its own authority:
//! head adoption (trust local refs) is the one lazy repair applied before
//! planning, everything else is reported and left to the user or to
//! `pk stack --repair`.

use crate::{
    errors::{PkError, PkResult},
    git::RepositoryExt,
    journal::Journal,
    store::notes,
    tree::{InsertPos, StackTree, TrackedBranch},
};
use git2::Repository;

/// One detected disagreement between the three stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// Metadata tracks a branch whose local ref is gone (R1).
    OrphanedBranch { branch: String },
    /// Same, but an in-flight operation involves the branch, so judgement
    /// is deferred until the operation finishes (R1).
    DeferredMissingRef { branch: String },
    /// A local branch matches the configured prefix but is untracked (R2).
    /// Only `pk init` may adopt it.
    UntrackedRef { branch: String },
    /// The recorded head differs from the local ref (R3). Repair trusts the
    /// local ref; descendants then read as needing a restack.
    DivergentHead {
        branch: String,
        recorded: String,
        actual: String,
    },
    /// The PR's last submitted base is not the current parent (R5). The next
    /// `pk submit` rewrites it.
    RemoteBaseDrift {
        branch: String,
        submitted_base: String,
        parent: String,
    },
}

impl Drift {
    /// The branch this drift concerns.
    pub fn branch(&self) -> &str {
        match self {
            Self::OrphanedBranch { branch }
            | Self::DeferredMissingRef { branch }
            | Self::UntrackedRef { branch }
            | Self::DivergentHead { branch, .. }
            | Self::RemoteBaseDrift { branch, .. } => branch,
        }
    }

    /// Whether an operation touching this branch must refuse to proceed.
    /// Head divergence is repaired lazily and base drift is healed on
    /// submit; a missing ref cannot be planned around.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::OrphanedBranch { .. } | Self::DeferredMissingRef { .. })
    }
}

/// The full comparison result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub drifts: Vec<Drift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }

    /// Errors with [PkError::StackInconsistent] if any blocking drift
    /// touches one of the given branches or their descendants.
    pub fn gate(&self, tree: &StackTree, touched: &[&str]) -> PkResult<()> {
        let mut affected: Vec<String> = touched.iter().map(|s| s.to_string()).collect();
        for branch in touched {
            affected.extend(tree.descendants(branch));
        }
        let blocking: Vec<&Drift> = self
            .drifts
            .iter()
            .filter(|d| d.is_blocking() && affected.iter().any(|b| b == d.branch()))
            .collect();
        if blocking.is_empty() {
            return Ok(());
        }
        let details = blocking
            .iter()
            .map(|d| match d {
                Drift::OrphanedBranch { branch } => {
                    format!("`{branch}` is tracked but its local ref is gone")
                }
                Drift::DeferredMissingRef { branch } => {
                    format!("`{branch}` is missing and involved in a suspended operation")
                }
                _ => unreachable!("non-blocking drift"),
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(PkError::StackInconsistent { details })
    }
}

/// Compares metadata against local refs and recorded PR bases.
pub fn detect(
    tree: &StackTree,
    repo: &Repository,
    journal: &Journal,
    prefix: &str,
) -> PkResult<DriftReport> {
    let mut drifts = Vec::new();
    let active = journal.active()?;

    for name in tree.stack_branches() {
        let branch = tree.require(&name)?;
        match repo.branch_head(&name) {
            Ok(actual) => {
                let actual = actual.to_string();
                if !branch.head.is_empty() && branch.head != actual {
                    drifts.push(Drift::DivergentHead {
                        branch: name.clone(),
                        recorded: branch.head.clone(),
                        actual,
                    });
                }
            }
            Err(_) => {
                let involved = active
                    .as_ref()
                    .map(|entry| entry.intent.touched().iter().any(|t| *t == name))
                    .unwrap_or(false);
                if involved {
                    drifts.push(Drift::DeferredMissingRef { branch: name.clone() });
                } else {
                    drifts.push(Drift::OrphanedBranch { branch: name.clone() });
                }
            }
        }

        if let Some(pr) = &branch.pr {
            let parent = branch.parent.clone().unwrap_or_default();
            if pr.base != parent {
                drifts.push(Drift::RemoteBaseDrift {
                    branch: name.clone(),
                    submitted_base: pr.base.clone(),
                    parent,
                });
            }
        }
    }

    if !prefix.is_empty() {
        for name in repo.local_branches()? {
            if name.starts_with(prefix) && tree.get(&name).is_none() {
                drifts.push(Drift::UntrackedRef { branch: name });
            }
        }
    }

    Ok(DriftReport { drifts })
}

/// Applies the R3 policy: adopt local heads into the model. Returns the
/// branches whose recorded head moved. Anchors are left alone; they remain
/// the correct rebase boundary, and a moved parent head is what flags the
/// children as needing a restack.
pub fn adopt_heads(tree: &mut StackTree, repo: &Repository) -> PkResult<Vec<String>> {
    let mut moved = Vec::new();
    for name in tree.branch_order() {
        if let Ok(actual) = repo.branch_head(&name) {
            let actual = actual.to_string();
            let branch = tree.get_mut(&name).expect("iterating tracked branches");
            if branch.head != actual {
                if !branch.head.is_empty() {
                    moved.push(name.clone());
                }
                branch.head = actual;
            }
        }
    }
    Ok(moved)
}

/// The R4 recovery path: rebuild the tree from `refs/notes/pancake`.
///
/// A branch whose annotation is stale (the branch head moved past the
/// annotated commit) is adopted with its parent recovered but its anchor
/// reset, so the next sync rebases it from merge-base.
pub fn rebuild_from_notes(repo: &Repository, trunk_name: &str) -> PkResult<StackTree> {
    let mut tree = StackTree::new(trunk_name);
    if let Ok(head) = repo.branch_head(trunk_name) {
        tree.get_mut(trunk_name).expect("trunk exists").head = head.to_string();
    }

    // Collect the surviving annotations: the branch must still exist
    // locally. A branch can carry several notes (one per historical head);
    // the one attached to the current head wins, older ones contribute the
    // parent but lose their anchor.
    let mut by_branch: std::collections::BTreeMap<String, (Option<String>, Option<String>, bool)> =
        std::collections::BTreeMap::new();
    for (annotated, note) in notes::all_notes(repo)? {
        if !repo.branch_exists(&note.branch) {
            continue;
        }
        let current = repo.branch_head(&note.branch)? == annotated;
        let entry = (
            note.parent,
            if current { note.anchor } else { None },
            current,
        );
        let keep = match by_branch.get(&note.branch) {
            Some((_, _, true)) => false,
            Some(_) => current,
            None => true,
        };
        if keep {
            by_branch.insert(note.branch, entry);
        }
    }
    let mut recovered: Vec<(String, Option<String>, Option<String>)> = by_branch
        .into_iter()
        .map(|(name, (parent, anchor, _))| (name, parent, anchor))
        .collect();
    recovered.sort();

    // Insert parents before children; unresolvable parents fall back to
    // trunk so nothing recoverable is dropped.
    let mut pending = recovered;
    let mut made_progress = true;
    while made_progress && !pending.is_empty() {
        made_progress = false;
        let mut rest = Vec::new();
        for (name, parent, anchor) in pending {
            let parent_name = parent.clone().unwrap_or_else(|| trunk_name.to_string());
            if tree.get(&parent_name).is_some() {
                let head = repo.branch_head(&name)?.to_string();
                let node = TrackedBranch::new(&name, None, &head, anchor.as_deref());
                tree.insert(&parent_name, node, InsertPos::Last)?;
                made_progress = true;
            } else {
                rest.push((name, parent, anchor));
            }
        }
        pending = rest;
    }
    for (name, _, anchor) in pending {
        let head = repo.branch_head(&name)?.to_string();
        let node = TrackedBranch::new(&name, None, &head, anchor.as_deref());
        tree.insert(trunk_name, node, InsertPos::Last)?;
    }

    Ok(tree)
}
