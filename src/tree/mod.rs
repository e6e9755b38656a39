//! Structured, [Serialize] + [Deserialize] representation of the stack tree.
//!
//! The tree is a flat arena keyed by branch name: parent and children are
//! stored as names, not references, which matches the persisted JSON form
//! exactly and keeps the in-memory graph acyclic. The trunk branch is held as
//! the root node (the only node with a null parent) and is never itself a
//! stack entry for the purposes of restacks or PRs.

use crate::errors::{PkError, PkResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

mod find;
pub use find::Match;

#[cfg(test)]
mod property_tests;

/// An n-ary tree of branches, represented as a flat data structure.
///
/// By itself, [StackTree] has no knowledge of the local repository. The
/// [PkContext] pairs it with the [Repository] and the metadata store.
///
/// [PkContext]: crate::ctx::PkContext
/// [Repository]: git2::Repository
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackTree {
    /// The name of the trunk branch.
    pub trunk_name: String,
    /// A map of branch names to [TrackedBranch]es, including the trunk node.
    pub branches: BTreeMap<String, TrackedBranch>,
    /// File-level fields written by newer versions of `pk`, carried through
    /// load/save untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A branch tracked by `pk`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedBranch {
    /// The branch name.
    pub name: String,
    /// The parent branch name. [None] iff this is the trunk node.
    #[serde(default)]
    pub parent: Option<String>,
    /// Child branch names in user-visible stacking order.
    #[serde(default)]
    pub children: Vec<String>,
    /// Last-known head commit id, in hex form. Empty until first observed.
    #[serde(default)]
    pub head: String,
    /// The parent head this branch was last restacked onto (the upstream
    /// boundary for the next rebase). [None] until first observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    /// When the branch was first tracked.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// The PR binding, if a pull request has been submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrBinding>,
    /// Fields written by newer versions of `pk`, preserved round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrackedBranch {
    /// Creates a new [TrackedBranch] under the given parent.
    pub fn new(name: &str, parent: Option<&str>, head: &str, anchor: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(ToOwned::to_owned),
            head: head.to_string(),
            anchor: anchor.map(ToOwned::to_owned),
            created_at: Utc::now(),
            ..Default::default()
        }
    }
}

/// The record binding a branch to its pull request on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrBinding {
    /// The PR number on the forge.
    pub id: u64,
    /// The PR URL, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The base branch name last submitted to the forge.
    pub base: String,
    /// The head commit last submitted to the forge.
    pub head: String,
    /// Whether the PR is a draft.
    #[serde(default)]
    pub draft: bool,
    /// Last-seen review/CI summary, preformatted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// When `status` was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Where a new child lands in its parent's child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPos {
    /// Append after the existing children.
    Last,
    /// Insert at a specific index.
    At(usize),
}

impl StackTree {
    /// Creates a new [StackTree] containing only the trunk node.
    pub fn new(trunk_name: &str) -> Self {
        let branches = BTreeMap::from([(
            trunk_name.to_string(),
            TrackedBranch::new(trunk_name, None, "", None),
        )]);
        Self {
            trunk_name: trunk_name.to_string(),
            branches,
            extra: serde_json::Map::new(),
        }
    }

    /// Gets a branch by name.
    pub fn get(&self, name: &str) -> Option<&TrackedBranch> {
        self.branches.get(name)
    }

    /// Gets a mutable branch by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut TrackedBranch> {
        self.branches.get_mut(name)
    }

    /// Gets a branch by name, erroring if it is untracked.
    pub fn require(&self, name: &str) -> PkResult<&TrackedBranch> {
        self.get(name)
            .ok_or_else(|| PkError::BranchNotTracked(name.to_string()))
    }

    /// Whether `name` is the trunk node.
    pub fn is_trunk(&self, name: &str) -> bool {
        name == self.trunk_name
    }

    /// The parent branch name of `name`, if any.
    pub fn parent(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|b| b.parent.as_deref())
    }

    /// The ordered children of `name`.
    pub fn children(&self, name: &str) -> &[String] {
        self.get(name).map(|b| b.children.as_slice()).unwrap_or(&[])
    }

    /// The siblings of `name` (children of its parent, excluding itself).
    pub fn siblings(&self, name: &str) -> Vec<String> {
        let Some(parent) = self.parent(name) else {
            return Vec::new();
        };
        self.children(parent)
            .iter()
            .filter(|c| c.as_str() != name)
            .cloned()
            .collect()
    }

    /// The ancestors of `name`, nearest first, ending at the trunk.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = self.parent(name);
        while let Some(p) = current {
            out.push(p.to_string());
            current = self.parent(p);
        }
        out
    }

    /// All descendants of `name` in depth-first order, parents before
    /// children, siblings in stored order. This is the order restacks
    /// propagate in: every rebase sees an already-updated parent.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.fill_descendants(name, &mut out);
        out
    }

    fn fill_descendants(&self, name: &str, out: &mut Vec<String>) {
        for child in self.children(name) {
            out.push(child.clone());
            self.fill_descendants(child, out);
        }
    }

    /// The deepest descendant along the current path: at each fork, descend
    /// into the child whose subtree reaches furthest. Equal depths fall back
    /// to stored sibling order, then name.
    pub fn top_of(&self, name: &str) -> String {
        let mut current = name.to_string();
        loop {
            let children = self.children(&current);
            let mut best: Option<(&String, usize)> = None;
            for child in children {
                let depth = self.subtree_depth(child);
                // Strictly deeper wins; equal depth keeps the earlier
                // sibling, which is the stored-order tiebreak.
                if best.map(|(_, lead)| depth > lead).unwrap_or(true) {
                    best = Some((child, depth));
                }
            }
            match best {
                Some((child, _)) => current = child.clone(),
                None => return current,
            }
        }
    }

    /// Longest chain length below and including `name`.
    fn subtree_depth(&self, name: &str) -> usize {
        1 + self
            .children(name)
            .iter()
            .map(|child| self.subtree_depth(child))
            .max()
            .unwrap_or(0)
    }

    /// The bottom of the stack containing `name`: the ancestor whose parent
    /// is the trunk (or `name` itself if it sits directly on trunk).
    pub fn bottom_of(&self, name: &str) -> String {
        let mut current = name.to_string();
        while let Some(parent) = self.parent(&current) {
            if parent == self.trunk_name {
                return current;
            }
            current = parent.to_string();
        }
        current
    }

    /// Depth of `name` above the trunk (trunk itself is 0).
    pub fn depth(&self, name: &str) -> usize {
        self.ancestors(name).len()
    }

    /// Returns all branch names reachable from trunk, parents before
    /// children. This is the render order for `pk log`.
    pub fn branch_order(&self) -> Vec<String> {
        let mut out = vec![self.trunk_name.clone()];
        self.fill_descendants(&self.trunk_name, &mut out);
        out
    }

    /// All tracked branch names except the trunk, in traversal order.
    pub fn stack_branches(&self) -> Vec<String> {
        self.descendants(&self.trunk_name)
    }

    /// Adds a new branch under `parent` at the given position.
    ///
    /// ## Takes
    /// - `parent` - The name of the parent branch; must be tracked.
    /// - `branch` - The new branch node; its `parent` field is overwritten.
    /// - `pos` - Where the branch lands in the parent's child list.
    pub fn insert(&mut self, parent: &str, mut branch: TrackedBranch, pos: InsertPos) -> PkResult<()> {
        if self.branches.contains_key(&branch.name) {
            return Err(PkError::BranchExists(branch.name));
        }
        let parent_branch = self
            .branches
            .get_mut(parent)
            .ok_or_else(|| PkError::BranchNotTracked(parent.to_string()))?;
        let name = branch.name.clone();
        match pos {
            InsertPos::Last => parent_branch.children.push(name.clone()),
            InsertPos::At(idx) => {
                let idx = idx.min(parent_branch.children.len());
                parent_branch.children.insert(idx, name.clone());
            }
        }
        branch.parent = Some(parent.to_string());
        self.branches.insert(name, branch);
        Ok(())
    }

    /// Deletes a branch, reparenting its children to the deleted branch's
    /// parent. The children keep their relative order and are spliced into
    /// the parent's child list at the deleted branch's position.
    ///
    /// ## Returns
    /// - `Ok(branch)` - The removed node.
    pub fn remove(&mut self, name: &str) -> PkResult<TrackedBranch> {
        if self.is_trunk(name) {
            return Err(PkError::TrunkImmutable("delete"));
        }
        let branch = self
            .branches
            .remove(name)
            .ok_or_else(|| PkError::BranchNotTracked(name.to_string()))?;

        let parent_name = branch
            .parent
            .clone()
            .ok_or_else(|| PkError::Fatal(format!("non-trunk branch `{name}` has no parent")))?;

        // Splice the orphaned children into the parent's list where the
        // deleted branch sat.
        let parent = self
            .branches
            .get_mut(&parent_name)
            .ok_or_else(|| PkError::BranchNotTracked(parent_name.clone()))?;
        let pos = match parent.children.iter().position(|c| c == name) {
            Some(pos) => {
                parent.children.remove(pos);
                pos
            }
            None => parent.children.len(),
        };
        for (offset, child) in branch.children.iter().enumerate() {
            parent.children.insert(pos + offset, child.clone());
        }

        for child_name in &branch.children {
            if let Some(child) = self.branches.get_mut(child_name) {
                child.parent = Some(parent_name.clone());
                // The old anchor pointed into the deleted branch's history.
                child.anchor = None;
            }
        }

        Ok(branch)
    }

    /// Renames a branch, fixing up the parent's child list and the children's
    /// parent pointers.
    pub fn rename(&mut self, old: &str, new: &str) -> PkResult<()> {
        if self.is_trunk(old) {
            return Err(PkError::TrunkImmutable("rename"));
        }
        if self.branches.contains_key(new) {
            return Err(PkError::BranchExists(new.to_string()));
        }
        let mut branch = self
            .branches
            .remove(old)
            .ok_or_else(|| PkError::BranchNotTracked(old.to_string()))?;
        branch.name = new.to_string();

        if let Some(parent_name) = branch.parent.clone() {
            if let Some(parent) = self.branches.get_mut(&parent_name) {
                for child in &mut parent.children {
                    if child == old {
                        *child = new.to_string();
                    }
                }
            }
        }
        for child_name in branch.children.clone() {
            if let Some(child) = self.branches.get_mut(&child_name) {
                child.parent = Some(new.to_string());
            }
        }
        self.branches.insert(new.to_string(), branch);
        Ok(())
    }

    /// Moves `name` under `new_parent` at the given position, detaching it
    /// from its current parent. Descendants follow implicitly.
    pub fn set_parent(&mut self, name: &str, new_parent: &str, pos: InsertPos) -> PkResult<()> {
        if self.is_trunk(name) {
            return Err(PkError::TrunkImmutable("reparent"));
        }
        if !self.branches.contains_key(new_parent) {
            return Err(PkError::BranchNotTracked(new_parent.to_string()));
        }
        let old_parent = self
            .require(name)?
            .parent
            .clone()
            .ok_or_else(|| PkError::Fatal(format!("non-trunk branch `{name}` has no parent")))?;

        if let Some(parent) = self.branches.get_mut(&old_parent) {
            parent.children.retain(|c| c != name);
        }
        let parent = self.branches.get_mut(new_parent).expect("checked above");
        match pos {
            InsertPos::Last => parent.children.push(name.to_string()),
            InsertPos::At(idx) => {
                let idx = idx.min(parent.children.len());
                parent.children.insert(idx, name.to_string());
            }
        }
        let branch = self.branches.get_mut(name).expect("required above");
        branch.parent = Some(new_parent.to_string());
        branch.anchor = None;
        Ok(())
    }

    /// Validates the structural invariants: acyclicity, rooting at trunk,
    /// parent/child bijection, and the depth limit.
    pub fn check(&self, max_depth: usize) -> PkResult<()> {
        let trunk = self
            .get(&self.trunk_name)
            .ok_or_else(|| PkError::StackInconsistent {
                details: format!("trunk `{}` is not in the tree", self.trunk_name),
            })?;
        if trunk.parent.is_some() {
            return Err(PkError::StackInconsistent {
                details: format!("trunk `{}` has a parent", self.trunk_name),
            });
        }

        let mut seen = HashSet::new();
        for (name, branch) in &self.branches {
            if name != &branch.name {
                return Err(PkError::StackInconsistent {
                    details: format!("branch keyed `{name}` names itself `{}`", branch.name),
                });
            }
            if name != &self.trunk_name && branch.parent.is_none() {
                return Err(PkError::StackInconsistent {
                    details: format!("branch `{name}` has no parent and is not trunk"),
                });
            }

            // Walk to the root; a cycle revisits a node before reaching it.
            let mut slow = name.as_str();
            let mut hops = 0usize;
            loop {
                match self.parent(slow) {
                    Some(p) => {
                        hops += 1;
                        if hops > self.branches.len() {
                            return Err(PkError::StackInconsistent {
                                details: format!("cycle detected through `{name}`"),
                            });
                        }
                        slow = p;
                    }
                    None => break,
                }
            }
            if slow != self.trunk_name {
                return Err(PkError::StackInconsistent {
                    details: format!("branch `{name}` is not rooted at `{}`", self.trunk_name),
                });
            }
            if hops > max_depth {
                return Err(PkError::DepthExceeded { max: max_depth });
            }

            // Child lists must reference tracked branches that point back.
            for child in &branch.children {
                if !seen.insert((name.clone(), child.clone())) {
                    return Err(PkError::StackInconsistent {
                        details: format!("duplicate child `{child}` under `{name}`"),
                    });
                }
                match self.get(child) {
                    Some(c) if c.parent.as_deref() == Some(name.as_str()) => {}
                    Some(_) => {
                        return Err(PkError::StackInconsistent {
                            details: format!(
                                "`{child}` is listed under `{name}` but claims a different parent"
                            ),
                        });
                    }
                    None => {
                        return Err(PkError::StackInconsistent {
                            details: format!("`{name}` lists unknown child `{child}`"),
                        });
                    }
                }
            }
        }

        // Every parent pointer must be mirrored by a child-list entry.
        for (name, branch) in &self.branches {
            if let Some(parent) = &branch.parent {
                let listed = self
                    .get(parent)
                    .map(|p| p.children.iter().any(|c| c == name))
                    .unwrap_or(false);
                if !listed {
                    return Err(PkError::StackInconsistent {
                        details: format!("`{name}` claims parent `{parent}` but is not in its child list"),
                    });
                }
            }
        }

        Ok(())
    }
}
