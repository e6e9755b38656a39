//! Intent → Plan compilation.
//!
//! An [Intent] is a user-level structural change; a [Plan] is the ordered
//! list of atomic [Step]s that realizes it. Compilation is pure and
//! deterministic: the same intent against the same [StackTree] produces an
//! identical plan, which is what makes the journal replayable. Side effects
//! happen later, in the operation engine.

use crate::{
    errors::{PkError, PkResult},
    tree::{InsertPos, StackTree, TrackedBranch},
};
use serde::{Deserialize, Serialize};

/// A user-level structural change to the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Intent {
    /// Create `name` on top of `parent` and track it.
    Create { name: String, parent: String },
    /// Create `name` between `before` and its current parent.
    InsertBefore { name: String, before: String },
    /// Create `name` between `after` and its current children.
    InsertAfter { name: String, after: String },
    /// Delete `name`, reparenting its children to its parent.
    Delete { name: String, force: bool },
    /// Rename a tracked branch.
    Rename { old: String, new: String },
    /// Rebase `root` and every descendant onto their (updated) parents.
    Restack { root: String },
    /// Move `branch` (and its descendants) onto a new parent.
    Move { branch: String, onto: String },
    /// Merge `name`'s PR, delete the branch, reparent its children.
    Land { name: String, method: MergeMethod },
}

impl Intent {
    /// The branches this intent touches, for drift gating.
    pub fn touched(&self) -> Vec<&str> {
        match self {
            Self::Create { name, parent } => vec![name, parent],
            Self::InsertBefore { name, before } => vec![name, before],
            Self::InsertAfter { name, after } => vec![name, after],
            Self::Delete { name, .. } => vec![name],
            Self::Rename { old, new } => vec![old, new],
            Self::Restack { root } => vec![root],
            Self::Move { branch, onto } => vec![branch, onto],
            Self::Land { name, .. } => vec![name],
        }
    }

    /// The command the user re-runs with `--continue` / `--abort`.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Create { .. } | Self::InsertBefore { .. } | Self::InsertAfter { .. } => "branch create",
            Self::Delete { .. } => "branch delete",
            Self::Rename { .. } => "branch rename",
            Self::Restack { .. } => "restack",
            Self::Move { .. } => "move",
            Self::Land { .. } => "land",
        }
    }
}

/// How a landed PR is merged on the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMethod {
    Squash,
    Merge,
    Rebase,
}

/// One atomic step of a [Plan].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    /// Create the local ref `name` at commit `at`.
    CreateRef { name: String, at: String },
    /// Delete the local ref (and, for landed branches, the remote ref).
    DeleteRef { name: String, remote: bool },
    /// Rename the local ref.
    RenameRef { old: String, new: String },
    /// Rebase `branch` onto the current head of `onto`. `boundary` is the
    /// anchor commit: commits strictly above it are replayed. [None] falls
    /// back to merge-base semantics.
    Rebase {
        branch: String,
        onto: String,
        boundary: Option<String>,
    },
    /// Record `parent` as `branch`'s parent, creating the tree node if this
    /// is a new branch. `position` indexes into the parent's child list.
    SetParent {
        branch: String,
        parent: String,
        position: Option<usize>,
    },
    /// Record a new base branch in the PR binding.
    UpdatePrBase { branch: String, base: String },
    /// Push `branch` to the remote with a lease.
    Push { branch: String },
    /// Create a PR for `branch` (idempotent: reuses an existing one).
    ForgeCreatePr { branch: String },
    /// Update `branch`'s PR on the forge: rewrite the base and/or merge.
    ForgeUpdatePr {
        branch: String,
        base: Option<String>,
        merge: Option<MergeMethod>,
    },
    /// Close `branch`'s PR on the forge.
    ForgeClosePr { branch: String },
    /// Persist the metadata store. Always the final step of a plan.
    CommitMetadata,
}

/// The deterministic, ordered realization of an [Intent].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    fn push(&mut self, step: Step) {
        self.steps.push(step);
    }
}

/// Compiles an [Intent] into a [Plan] against the given model.
///
/// The model must already reflect local reality (the reconciler runs before
/// planning); heads and anchors are read from it, never from the repository.
pub fn compile(tree: &StackTree, intent: &Intent) -> PkResult<Plan> {
    let mut plan = Plan::default();
    match intent {
        Intent::Create { name, parent } => {
            ensure_new(tree, name)?;
            let parent_branch = tree.require(parent)?;
            plan.push(Step::CreateRef {
                name: name.clone(),
                at: parent_branch.head.clone(),
            });
            plan.push(Step::SetParent {
                branch: name.clone(),
                parent: parent.clone(),
                position: None,
            });
        }
        Intent::InsertBefore { name, before } => {
            ensure_new(tree, name)?;
            let existing = tree.require(before)?;
            let parent = existing
                .parent
                .clone()
                .ok_or(PkError::TrunkImmutable("insert before"))?;
            let position = tree
                .children(&parent)
                .iter()
                .position(|c| c == before);
            plan.push(Step::CreateRef {
                name: name.clone(),
                at: tree.require(&parent)?.head.clone(),
            });
            plan.push(Step::SetParent {
                branch: name.clone(),
                parent: parent.clone(),
                position,
            });
            plan.push(Step::SetParent {
                branch: before.clone(),
                parent: name.clone(),
                position: None,
            });
            push_rebase_cascade(tree, &mut plan, before, name, existing.anchor.clone());
        }
        Intent::InsertAfter { name, after } => {
            ensure_new(tree, name)?;
            let existing = tree.require(after)?;
            plan.push(Step::CreateRef {
                name: name.clone(),
                at: existing.head.clone(),
            });
            plan.push(Step::SetParent {
                branch: name.clone(),
                parent: after.clone(),
                position: Some(0),
            });
            // The prior children of `after` slide up onto the new branch.
            for child in tree.children(after).iter().filter(|c| *c != name) {
                let anchor = tree.require(child)?.anchor.clone();
                plan.push(Step::SetParent {
                    branch: child.clone(),
                    parent: name.clone(),
                    position: None,
                });
                push_rebase_cascade(tree, &mut plan, child, name, anchor);
            }
        }
        Intent::Delete { name, .. } => {
            let branch = tree.require(name)?;
            let parent = branch
                .parent
                .clone()
                .ok_or(PkError::TrunkImmutable("delete"))?;
            let base_position = tree.children(&parent).iter().position(|c| c == name);
            for (offset, child) in branch.children.iter().enumerate() {
                let child_branch = tree.require(child)?;
                plan.push(Step::SetParent {
                    branch: child.clone(),
                    parent: parent.clone(),
                    position: base_position.map(|p| p + offset),
                });
                if child_branch.pr.is_some() {
                    plan.push(Step::UpdatePrBase {
                        branch: child.clone(),
                        base: parent.clone(),
                    });
                    plan.push(Step::ForgeUpdatePr {
                        branch: child.clone(),
                        base: Some(parent.clone()),
                        merge: None,
                    });
                }
                push_rebase_cascade(tree, &mut plan, child, &parent, child_branch.anchor.clone());
            }
            if branch.pr.is_some() {
                plan.push(Step::ForgeClosePr { branch: name.clone() });
            }
            plan.push(Step::DeleteRef {
                name: name.clone(),
                remote: false,
            });
        }
        Intent::Rename { old, new } => {
            ensure_new(tree, new)?;
            let branch = tree.require(old)?;
            if branch.parent.is_none() {
                return Err(PkError::TrunkImmutable("rename"));
            }
            plan.push(Step::RenameRef {
                old: old.clone(),
                new: new.clone(),
            });
            // Children's PRs point at the old name as their base.
            for child in &branch.children {
                if tree.require(child)?.pr.is_some() {
                    plan.push(Step::UpdatePrBase {
                        branch: child.clone(),
                        base: new.clone(),
                    });
                    plan.push(Step::ForgeUpdatePr {
                        branch: child.clone(),
                        base: Some(new.clone()),
                        merge: None,
                    });
                }
            }
        }
        Intent::Restack { root } => {
            let branch = tree.require(root)?;
            if let Some(parent) = branch.parent.clone() {
                push_rebase_cascade(tree, &mut plan, root, &parent, branch.anchor.clone());
            } else {
                // Restacking from trunk rebases every stack on top of it.
                for child in tree.children(root) {
                    let anchor = tree.require(child)?.anchor.clone();
                    push_rebase_cascade(tree, &mut plan, child, root, anchor);
                }
            }
        }
        Intent::Move { branch, onto } => {
            let moved = tree.require(branch)?;
            if moved.parent.is_none() {
                return Err(PkError::TrunkImmutable("move"));
            }
            tree.require(onto)?;
            if branch == onto || tree.descendants(branch).iter().any(|d| d == onto) {
                return Err(PkError::InvalidInput(format!(
                    "cannot move `{branch}` onto its own descendant `{onto}`"
                )));
            }
            plan.push(Step::SetParent {
                branch: branch.clone(),
                parent: onto.clone(),
                position: None,
            });
            push_rebase_cascade(tree, &mut plan, branch, onto, moved.anchor.clone());
        }
        Intent::Land { name, method } => {
            let branch = tree.require(name)?;
            let parent = branch
                .parent
                .clone()
                .ok_or(PkError::TrunkImmutable("land"))?;
            if parent != tree.trunk_name {
                return Err(PkError::InvalidInput(format!(
                    "`{name}` is stacked on `{parent}`; land the stack bottom-up"
                )));
            }
            plan.push(Step::Push { branch: name.clone() });
            plan.push(Step::ForgeUpdatePr {
                branch: name.clone(),
                base: None,
                merge: Some(*method),
            });
            let base_position = tree.children(&parent).iter().position(|c| c == name);
            for (offset, child) in branch.children.iter().enumerate() {
                let child_branch = tree.require(child)?;
                plan.push(Step::SetParent {
                    branch: child.clone(),
                    parent: parent.clone(),
                    position: base_position.map(|p| p + offset),
                });
                if child_branch.pr.is_some() {
                    plan.push(Step::UpdatePrBase {
                        branch: child.clone(),
                        base: parent.clone(),
                    });
                    plan.push(Step::ForgeUpdatePr {
                        branch: child.clone(),
                        base: Some(parent.clone()),
                        merge: None,
                    });
                }
                push_rebase_cascade(tree, &mut plan, child, &parent, child_branch.anchor.clone());
            }
            plan.push(Step::DeleteRef {
                name: name.clone(),
                remote: true,
            });
        }
    }
    plan.push(Step::CommitMetadata);
    Ok(plan)
}

/// Emits the rebase for `branch` onto `new_parent`, then the rebases for
/// every descendant onto its own parent, parents before children, siblings
/// in stored order (the pre-operation tree's order, so conflict prompts
/// appear in the order the user sees in `pk log`).
fn push_rebase_cascade(
    tree: &StackTree,
    plan: &mut Plan,
    branch: &str,
    new_parent: &str,
    boundary: Option<String>,
) {
    plan.push(Step::Rebase {
        branch: branch.to_string(),
        onto: new_parent.to_string(),
        boundary,
    });
    for descendant in tree.descendants(branch) {
        let parent = tree
            .parent(&descendant)
            .expect("descendants always have parents")
            .to_string();
        let boundary = tree
            .get(&descendant)
            .and_then(|b| b.anchor.clone());
        plan.push(Step::Rebase {
            branch: descendant,
            onto: parent,
            boundary,
        });
    }
}

fn ensure_new(tree: &StackTree, name: &str) -> PkResult<()> {
    if tree.get(name).is_some() {
        return Err(PkError::BranchExists(name.to_string()));
    }
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(PkError::InvalidInput(format!("invalid branch name `{name}`")));
    }
    Ok(())
}

/// Applies a step's *structural* effect to the in-memory model.
///
/// Used twice: to validate invariants on the post-state before execution,
/// and during execution to keep the model in lockstep with the repository.
/// Ref-only and forge-only steps are structural no-ops here.
pub fn apply_structural(tree: &mut StackTree, step: &Step) -> PkResult<()> {
    match step {
        Step::SetParent {
            branch,
            parent,
            position,
        } => {
            let pos = position.map_or(InsertPos::Last, InsertPos::At);
            if tree.get(branch).is_some() {
                tree.set_parent(branch, parent, pos)?;
            } else {
                let head = tree.require(parent)?.head.clone();
                let node = TrackedBranch::new(branch, None, &head, Some(&head));
                tree.insert(parent, node, pos)?;
            }
        }
        Step::DeleteRef { name, .. } => {
            // Children were already reparented by earlier SetParent steps.
            tree.remove(name)?;
        }
        Step::RenameRef { old, new } => {
            tree.rename(old, new)?;
        }
        Step::UpdatePrBase { branch, base } => {
            if let Some(pr) = tree
                .get_mut(branch)
                .and_then(|b| b.pr.as_mut())
            {
                pr.base = base.clone();
            }
        }
        Step::CreateRef { .. }
        | Step::Rebase { .. }
        | Step::Push { .. }
        | Step::ForgeCreatePr { .. }
        | Step::ForgeUpdatePr { .. }
        | Step::ForgeClosePr { .. }
        | Step::CommitMetadata => {}
    }
    Ok(())
}

/// Validates invariants I1–I4 on the post-state of a plan without touching
/// the repository.
pub fn validate_post_state(tree: &StackTree, plan: &Plan, max_depth: usize) -> PkResult<()> {
    let mut shadow = tree.clone();
    for step in &plan.steps {
        apply_structural(&mut shadow, step)?;
    }
    shadow.check(max_depth)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::{InsertPos, PrBinding};

    fn tree() -> StackTree {
        // main ← a ← b; main ← c
        let mut t = StackTree::new("main");
        t.get_mut("main").unwrap().head = "m1".into();
        t.insert("main", TrackedBranch::new("a", None, "a1", Some("m1")), InsertPos::Last)
            .unwrap();
        t.insert("a", TrackedBranch::new("b", None, "b1", Some("a1")), InsertPos::Last)
            .unwrap();
        t.insert("main", TrackedBranch::new("c", None, "c1", Some("m1")), InsertPos::Last)
            .unwrap();
        t
    }

    fn with_pr(mut t: StackTree, branch: &str, id: u64, base: &str) -> StackTree {
        t.get_mut(branch).unwrap().pr = Some(PrBinding {
            id,
            url: None,
            base: base.to_string(),
            head: String::new(),
            draft: false,
            status: None,
            fetched_at: None,
        });
        t
    }

    #[test]
    fn create_plan_shape() {
        let plan = compile(
            &tree(),
            &Intent::Create {
                name: "d".into(),
                parent: "a".into(),
            },
        )
        .unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::CreateRef { name: "d".into(), at: "a1".into() },
                Step::SetParent { branch: "d".into(), parent: "a".into(), position: None },
                Step::CommitMetadata,
            ]
        );
    }

    #[test]
    fn create_rejects_collision() {
        let err = compile(
            &tree(),
            &Intent::Create { name: "a".into(), parent: "main".into() },
        )
        .unwrap_err();
        assert!(matches!(err, PkError::BranchExists(_)));
    }

    #[test]
    fn delete_reparents_then_deletes_then_commits() {
        let plan = compile(&tree(), &Intent::Delete { name: "a".into(), force: true }).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::SetParent { branch: "b".into(), parent: "main".into(), position: Some(0) },
                Step::Rebase { branch: "b".into(), onto: "main".into(), boundary: Some("a1".into()) },
                Step::DeleteRef { name: "a".into(), remote: false },
                Step::CommitMetadata,
            ]
        );
    }

    #[test]
    fn delete_updates_child_pr_base_before_closing_own_pr() {
        let t = with_pr(with_pr(tree(), "a", 10, "main"), "b", 11, "a");
        let plan = compile(&t, &Intent::Delete { name: "a".into(), force: true }).unwrap();
        let close_pos = plan
            .steps
            .iter()
            .position(|s| matches!(s, Step::ForgeClosePr { .. }))
            .unwrap();
        let update_pos = plan
            .steps
            .iter()
            .position(|s| matches!(s, Step::ForgeUpdatePr { branch, .. } if branch == "b"))
            .unwrap();
        assert!(update_pos < close_pos);
    }

    #[test]
    fn insert_before_takes_parent_and_position() {
        let plan = compile(
            &tree(),
            &Intent::InsertBefore { name: "mid".into(), before: "b".into() },
        )
        .unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::CreateRef { name: "mid".into(), at: "a1".into() },
                Step::SetParent { branch: "mid".into(), parent: "a".into(), position: Some(0) },
                Step::SetParent { branch: "b".into(), parent: "mid".into(), position: None },
                Step::Rebase { branch: "b".into(), onto: "mid".into(), boundary: Some("a1".into()) },
                Step::CommitMetadata,
            ]
        );
    }

    #[test]
    fn restack_covers_descendants_in_order() {
        let plan = compile(&tree(), &Intent::Restack { root: "a".into() }).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::Rebase { branch: "a".into(), onto: "main".into(), boundary: Some("m1".into()) },
                Step::Rebase { branch: "b".into(), onto: "a".into(), boundary: Some("a1".into()) },
                Step::CommitMetadata,
            ]
        );
    }

    #[test]
    fn land_requires_bottom_of_stack() {
        let err = compile(
            &tree(),
            &Intent::Land { name: "b".into(), method: MergeMethod::Squash },
        )
        .unwrap_err();
        assert!(matches!(err, PkError::InvalidInput(_)));
    }

    #[test]
    fn land_plan_merges_then_reparents_then_deletes() {
        let t = with_pr(with_pr(tree(), "a", 10, "main"), "b", 11, "a");
        let plan = compile(
            &t,
            &Intent::Land { name: "a".into(), method: MergeMethod::Squash },
        )
        .unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::Push { branch: "a".into() },
                Step::ForgeUpdatePr { branch: "a".into(), base: None, merge: Some(MergeMethod::Squash) },
                Step::SetParent { branch: "b".into(), parent: "main".into(), position: Some(0) },
                Step::UpdatePrBase { branch: "b".into(), base: "main".into() },
                Step::ForgeUpdatePr { branch: "b".into(), base: Some("main".into()), merge: None },
                Step::Rebase { branch: "b".into(), onto: "main".into(), boundary: Some("a1".into()) },
                Step::DeleteRef { name: "a".into(), remote: true },
                Step::CommitMetadata,
            ]
        );
    }

    #[test]
    fn move_rejects_descendant_target() {
        let err = compile(
            &tree(),
            &Intent::Move { branch: "a".into(), onto: "b".into() },
        )
        .unwrap_err();
        assert!(matches!(err, PkError::InvalidInput(_)));
    }

    #[test]
    fn plans_are_deterministic() {
        let intent = Intent::Delete { name: "a".into(), force: false };
        let t = tree();
        let one = serde_json::to_string(&compile(&t, &intent).unwrap()).unwrap();
        let two = serde_json::to_string(&compile(&t, &intent).unwrap()).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn post_state_validation_accepts_good_plans() {
        let t = tree();
        let plan = compile(&t, &Intent::Delete { name: "a".into(), force: true }).unwrap();
        validate_post_state(&t, &plan, 10).unwrap();
    }

    #[test]
    fn post_state_validation_rejects_depth_overflow() {
        let t = tree();
        let plan = compile(
            &t,
            &Intent::Create { name: "deep".into(), parent: "b".into() },
        )
        .unwrap();
        assert!(matches!(
            validate_post_state(&t, &plan, 2),
            Err(PkError::DepthExceeded { .. })
        ));
    }
}
