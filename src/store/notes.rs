//! Mirror of the stack tree into git notes.
//!
//! Every tracked branch's `{branch, parent, anchor}` triple is attached to
//! its head commit under `refs/notes/pancake`. A clone that lost `.pancake/`
//! can rebuild the tree by scanning these annotations (`pk stack --repair`).

use crate::{
    constants::NOTES_REF,
    errors::PkResult,
    tree::StackTree,
};
use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};

/// The payload attached to each annotated head commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchNote {
    pub branch: String,
    pub parent: Option<String>,
    pub anchor: Option<String>,
}

/// Writes (or overwrites) the note for a branch head.
pub fn write_note(repo: &Repository, head: Oid, note: &BranchNote) -> PkResult<()> {
    let signature = repo.signature()?;
    let payload = serde_json::to_string(note)?;
    repo.note(&signature, &signature, Some(NOTES_REF), head, &payload, true)?;
    Ok(())
}

/// Reads the note attached to a commit, if any.
pub fn read_note(repo: &Repository, head: Oid) -> PkResult<Option<BranchNote>> {
    let note = match repo.find_note(Some(NOTES_REF), head) {
        Ok(note) => note,
        Err(_) => return Ok(None),
    };
    let Some(message) = note.message() else {
        return Ok(None);
    };
    // Notes hand-edited into a non-pancake shape are ignored, not fatal.
    Ok(serde_json::from_str(message).ok())
}

/// Removes the note attached to a commit, if any.
pub fn remove_note(repo: &Repository, head: Oid) -> PkResult<()> {
    let signature = repo.signature()?;
    if repo.find_note(Some(NOTES_REF), head).is_ok() {
        repo.note_delete(head, Some(NOTES_REF), &signature, &signature)?;
    }
    Ok(())
}

/// All `(annotated commit, note)` pairs under the pancake namespace.
pub fn all_notes(repo: &Repository) -> PkResult<Vec<(Oid, BranchNote)>> {
    let mut out = Vec::new();
    let iter = match repo.notes(Some(NOTES_REF)) {
        Ok(iter) => iter,
        // Namespace not created yet.
        Err(_) => return Ok(out),
    };
    for entry in iter {
        let (_, annotated) = entry?;
        if let Some(note) = read_note(repo, annotated)? {
            out.push((annotated, note));
        }
    }
    Ok(out)
}

/// Rewrites the notes for every non-trunk branch in the tree whose head is
/// known. Called after each committed operation.
pub fn sync_tree(repo: &Repository, tree: &StackTree) -> PkResult<()> {
    for name in tree.stack_branches() {
        let Some(branch) = tree.get(&name) else {
            continue;
        };
        let Ok(head) = Oid::from_str(&branch.head) else {
            continue;
        };
        let note = BranchNote {
            branch: branch.name.clone(),
            parent: branch.parent.clone(),
            anchor: branch.anchor.clone(),
        };
        write_note(repo, head, &note)?;
    }
    Ok(())
}
