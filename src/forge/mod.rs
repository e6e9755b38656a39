//! Narrow interface to the forge (GitHub, GitLab, ...).
//!
//! The operation engine only ever talks to [Forge]; a concrete client is
//! injected at process start. Create and update are idempotent on retry:
//! creating a PR for a branch that already has one returns the existing id.

use crate::{errors::PkResult, plan::MergeMethod};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod github;

/// Request to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePr {
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// The result of [Forge::create_pr].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPr {
    pub id: u64,
    pub url: Option<String>,
    /// True when an open PR for the branch already existed and was reused.
    pub existing: bool,
}

/// Partial update applied to an existing PR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrUpdate {
    pub base: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub draft: Option<bool>,
}

/// Terminal state of a PR as seen on the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

/// Review/CI snapshot for `pk pr status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrStatus {
    pub state: PrState,
    pub review: String,
    pub ci: String,
}

impl PrStatus {
    /// One-line form stored in the PR binding.
    pub fn summary(&self) -> String {
        format!("review:{} ci:{}", self.review, self.ci)
    }
}

/// One row of [Forge::list_prs].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrSummary {
    pub branch: String,
    pub id: u64,
    pub state: PrState,
}

/// The capability set the operation engine needs from a forge.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Opens a PR, or returns the existing open PR for the branch.
    async fn create_pr(&self, req: &CreatePr) -> PkResult<CreatedPr>;

    /// Applies a partial update to a PR.
    async fn update_pr(&self, id: u64, update: &PrUpdate) -> PkResult<()>;

    /// Closes a PR without merging.
    async fn close_pr(&self, id: u64) -> PkResult<()>;

    /// Merges a PR with the given method.
    async fn merge_pr(&self, id: u64, method: MergeMethod) -> PkResult<()>;

    /// The current body text of a PR, for stack-block splicing.
    async fn pr_body(&self, id: u64) -> PkResult<String>;

    /// Review/CI/merge state of a PR.
    async fn pr_status(&self, id: u64) -> PkResult<PrStatus>;

    /// All open PRs in the repository.
    async fn list_prs(&self) -> PkResult<Vec<PrSummary>>;
}

const STACK_BLOCK_BEGIN: &str = "<!-- pancake-stack-begin -->";
const STACK_BLOCK_END: &str = "<!-- pancake-stack-end -->";

/// One line of the stack block: a branch on the current path and its PR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackBlockEntry {
    pub branch: String,
    pub pr_id: Option<u64>,
}

/// Renders the machine-readable stack block for a PR description. Entries
/// are ordered top of stack first, trunk last; `current` marks the PR the
/// block is written into.
pub fn render_stack_block(entries: &[StackBlockEntry], current: &str) -> String {
    let mut out = String::new();
    out.push_str(STACK_BLOCK_BEGIN);
    out.push_str("\n**Stack**:\n");
    for entry in entries {
        let marker = if entry.branch == current { "➤" } else { "·" };
        match entry.pr_id {
            Some(id) => {
                out.push_str(&format!("- {} `{}` #{}\n", marker, entry.branch, id));
            }
            None => {
                out.push_str(&format!("- {} `{}`\n", marker, entry.branch));
            }
        }
    }
    out.push_str(STACK_BLOCK_END);
    out
}

/// Renders the stack block for `branch` from the tree: the sibling path
/// through the branch, top of stack first, trunk last.
pub fn stack_block_for(tree: &crate::tree::StackTree, branch: &str) -> String {
    let mut path = vec![tree.top_of(branch)];
    while let Some(last) = path.last() {
        match tree.parent(last) {
            Some(parent) => path.push(parent.to_string()),
            None => break,
        }
    }
    let entries: Vec<StackBlockEntry> = path
        .iter()
        .map(|name| StackBlockEntry {
            branch: name.clone(),
            pr_id: tree.get(name).and_then(|b| b.pr.as_ref()).map(|pr| pr.id),
        })
        .collect();
    render_stack_block(&entries, branch)
}

/// Rewrites the stack block inside `body` without touching anything outside
/// the markers. A body with no block gets one appended.
pub fn splice_stack_block(body: &str, block: &str) -> String {
    match (body.find(STACK_BLOCK_BEGIN), body.find(STACK_BLOCK_END)) {
        (Some(begin), Some(end)) if end >= begin => {
            let after = end + STACK_BLOCK_END.len();
            format!("{}{}{}", &body[..begin], block, &body[after..])
        }
        _ => {
            if body.trim().is_empty() {
                block.to_string()
            } else {
                format!("{}\n\n{}", body.trim_end(), block)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entries() -> Vec<StackBlockEntry> {
        vec![
            StackBlockEntry { branch: "feat-b".into(), pr_id: Some(12) },
            StackBlockEntry { branch: "feat-a".into(), pr_id: Some(11) },
            StackBlockEntry { branch: "main".into(), pr_id: None },
        ]
    }

    #[test]
    fn block_marks_current_position() {
        let block = render_stack_block(&entries(), "feat-a");
        assert!(block.contains("➤ `feat-a` #11"));
        assert!(block.contains("· `feat-b` #12"));
        assert!(block.contains("· `main`"));
    }

    #[test]
    fn splice_preserves_human_edits() {
        let block_v1 = render_stack_block(&entries(), "feat-a");
        let body = format!("My carefully written summary.\n\n{block_v1}\n\nFooter notes.");

        let block_v2 = render_stack_block(&entries(), "feat-b");
        let spliced = splice_stack_block(&body, &block_v2);

        assert!(spliced.starts_with("My carefully written summary."));
        assert!(spliced.ends_with("Footer notes."));
        assert!(spliced.contains("➤ `feat-b` #12"));
        assert!(!spliced.contains("➤ `feat-a`"));
    }

    #[test]
    fn splice_appends_when_block_missing() {
        let block = render_stack_block(&entries(), "feat-a");
        let spliced = splice_stack_block("Just a description.", &block);
        assert!(spliced.starts_with("Just a description."));
        assert!(spliced.contains(STACK_BLOCK_BEGIN));
    }

    #[test]
    fn splice_into_empty_body_is_just_the_block() {
        let block = render_stack_block(&entries(), "feat-a");
        assert_eq!(splice_stack_block("", &block), block);
    }

    #[test]
    fn splicing_twice_is_idempotent() {
        let block = render_stack_block(&entries(), "feat-a");
        let once = splice_stack_block("Summary.", &block);
        let twice = splice_stack_block(&once, &block);
        assert_eq!(once, twice);
    }
}
