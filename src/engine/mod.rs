//! The transactional executor for structural stack operations.
//!
//! Every operation follows the same shape: take the metadata lock, reconcile,
//! compile the intent into a plan, validate the post-state, open a journal
//! entry with pre-images, then execute steps in order. Steps are idempotent
//! on repeat, so `--continue` after a conflict or a crash simply re-runs the
//! plan from the top; completed work is detected and skipped. Metadata is
//! committed only as the final step, so no failure mode leaves the store
//! half-written.

use crate::{
    ctx::PkContext,
    errors::{PkError, PkResult},
    forge::{CreatePr, Forge, PrState, PrUpdate},
    git::{GitOutcome, RebaseState, RepositoryExt},
    journal::{EntryState, JournalEntry, PreImage},
    plan::{self, Intent, Plan, Step},
    reconcile,
    store::{notes, StacksFile},
    tree::InsertPos,
};
use chrono::Utc;
use git2::Oid;
use std::collections::BTreeSet;

/// Result of a single step execution.
enum StepOutcome {
    Done,
    Conflict { paths: Vec<String> },
}

/// Which way a journaled plan's ref effects are applied when reversing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Re-apply the plan's ref effects (redo).
    Forward,
    /// Invert them (undo).
    Reverse,
}

/// The operation engine, bound to a loaded [PkContext] and an optional
/// forge client for plans that touch PRs.
pub struct Engine<'a, 'ctx> {
    ctx: &'ctx mut PkContext<'a>,
    forge: Option<Box<dyn Forge>>,
}

impl<'a, 'ctx> Engine<'a, 'ctx> {
    pub fn new(ctx: &'ctx mut PkContext<'a>) -> Self {
        Self { ctx, forge: None }
    }

    pub fn with_forge(mut self, forge: Box<dyn Forge>) -> Self {
        self.forge = Some(forge);
        self
    }

    fn forge(&self) -> PkResult<&dyn Forge> {
        self.forge.as_deref().ok_or(PkError::ForgeAuth)
    }

    /// Re-reads the metadata snapshot. Call only while holding the lock.
    fn reload(&mut self) -> PkResult<()> {
        self.ctx.tree = self
            .ctx
            .store
            .load(&self.ctx.config.repository.main_branch)?;
        Ok(())
    }

    /// Runs a structural operation from intent to committed metadata.
    pub async fn execute(&mut self, intent: Intent) -> PkResult<()> {
        let _lock = self.ctx.store.lock()?;
        // The context loaded its snapshot lock-free; re-read under the lock
        // so a concurrently committed operation is not overwritten.
        self.reload()?;
        self.ctx.journal.ensure_idle()?;
        if self.ctx.git.rebase_state() == RebaseState::InProgress {
            return Err(PkError::WorkingTreeDirty);
        }

        let report = reconcile::detect(
            &self.ctx.tree,
            self.ctx.repository,
            &self.ctx.journal,
            &self.ctx.config.stack.prefix,
        )?;
        report.gate(&self.ctx.tree, &intent.touched())?;
        reconcile::adopt_heads(&mut self.ctx.tree, self.ctx.repository)?;

        let plan = plan::compile(&self.ctx.tree, &intent)?;
        plan::validate_post_state(&self.ctx.tree, &plan, self.ctx.config.stack.max_depth)?;

        // Rebases need a clean tree; refuse before any side effect.
        let will_rebase = plan.steps.iter().any(|s| matches!(s, Step::Rebase { .. }));
        if will_rebase && !self.ctx.repository.is_working_tree_clean()? {
            return Err(PkError::WorkingTreeDirty);
        }

        let pre_image = self.capture_pre_image(&plan)?;
        let mut entry = JournalEntry {
            op_id: self.ctx.journal.next_op_id()?,
            intent,
            plan,
            pre_image,
            state: EntryState::Open,
            started_at: Utc::now(),
            finished_at: None,
            reverses: None,
        };
        self.ctx.journal.append(&entry)?;

        self.run_from(&mut entry, 0).await
    }

    /// Resumes the active operation after the user resolved conflicts.
    pub async fn resume(&mut self) -> PkResult<()> {
        let _lock = self.ctx.store.lock()?;
        self.reload()?;
        let mut entry = self
            .ctx
            .journal
            .active()?
            .ok_or_else(|| PkError::InvalidInput("no operation in progress".to_string()))?;

        if self.ctx.git.rebase_state() == RebaseState::InProgress {
            match self.ctx.git.rebase_continue()? {
                GitOutcome::Ok => {}
                GitOutcome::Conflict { paths } => {
                    let at_step = suspended_step(&entry);
                    return self.suspend(&mut entry, at_step, paths);
                }
                GitOutcome::Diverged { branch } => return Err(PkError::RemoteDiverged(branch)),
                GitOutcome::Fatal { detail } => return Err(PkError::Fatal(detail)),
            }
        }

        // Idempotent steps: re-run the whole plan; completed work is skipped
        // and the in-memory model is rebuilt along the way.
        self.run_from(&mut entry, 0).await
    }

    /// Aborts the active operation, rewinding refs from pre-images.
    pub fn abort(&mut self) -> PkResult<()> {
        let _lock = self.ctx.store.lock()?;
        let mut entry = self
            .ctx
            .journal
            .active()?
            .ok_or_else(|| PkError::InvalidInput("no operation in progress".to_string()))?;

        self.ctx.git.rebase_abort()?;
        self.restore(&entry, Direction::Reverse)?;

        entry.state = EntryState::Aborted;
        entry.finished_at = Some(Utc::now());
        self.ctx.journal.append(&entry)?;
        Ok(())
    }

    /// Reverses the most recent committed operation.
    pub fn undo(&mut self, force: bool) -> PkResult<()> {
        let _lock = self.ctx.store.lock()?;
        self.ctx.journal.ensure_idle()?;
        let entry = self
            .ctx
            .journal
            .last_committed()?
            .ok_or_else(|| PkError::InvalidInput("nothing to undo".to_string()))?;
        self.reverse_committed(entry, force)
    }

    /// Re-applies the most recent `undo`. Refused when anything else was
    /// committed since.
    pub fn redo(&mut self) -> PkResult<()> {
        let _lock = self.ctx.store.lock()?;
        self.ctx.journal.ensure_idle()?;
        let entry = self
            .ctx
            .journal
            .last_committed()?
            .ok_or_else(|| PkError::InvalidInput("nothing to redo".to_string()))?;
        if entry.reverses.is_none() {
            return Err(PkError::InvalidInput(
                "the last operation was not an undo; nothing to redo".to_string(),
            ));
        }
        self.reverse_committed(entry, false)
    }

    fn reverse_committed(&mut self, entry: JournalEntry, force: bool) -> PkResult<()> {
        if !force {
            self.guard_remote_heads(&entry)?;
        }

        // Direction flips with each reversal in the chain: undoing an undo
        // re-applies the original plan's ref effects.
        let direction = if self.reversal_depth(&entry)? % 2 == 0 {
            Direction::Reverse
        } else {
            Direction::Forward
        };

        // The new entry's pre-image is the state being replaced, which is
        // exactly what the next undo/redo restores.
        let names = self.names_for_snapshot(&entry);
        let post_image = self.capture_snapshot(&names)?;

        self.restore(&entry, direction)?;

        let record = JournalEntry {
            op_id: self.ctx.journal.next_op_id()?,
            intent: entry.intent.clone(),
            plan: entry.plan.clone(),
            pre_image: post_image,
            state: EntryState::Committed,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            reverses: Some(entry.op_id),
        };
        self.ctx.journal.append(&record)?;
        Ok(())
    }

    /// How many reversal links sit below this entry (0 for a plain op).
    fn reversal_depth(&self, entry: &JournalEntry) -> PkResult<usize> {
        let entries = self.ctx.journal.entries()?;
        let mut depth = 0;
        let mut cursor = entry.reverses;
        while let Some(id) = cursor {
            depth += 1;
            cursor = entries
                .iter()
                .find(|e| e.op_id == id)
                .and_then(|e| e.reverses);
        }
        Ok(depth)
    }

    /// Refuses the reversal when a touched branch was pushed with a newer
    /// head since the operation committed.
    fn guard_remote_heads(&self, entry: &JournalEntry) -> PkResult<()> {
        let remote = &self.ctx.config.repository.remote;
        for (branch, pre_head) in &entry.pre_image.branch_heads {
            let remote_ref = format!("{remote}/{branch}");
            let Ok(remote_branch) = self
                .ctx
                .repository
                .find_branch(&remote_ref, git2::BranchType::Remote)
            else {
                continue;
            };
            let Some(remote_head) = remote_branch.get().target() else {
                continue;
            };
            let local_head = self.ctx.repository.branch_head(branch).ok();
            if remote_head.to_string() != *pre_head && Some(remote_head) == local_head {
                return Err(PkError::InvalidInput(format!(
                    "`{branch}` was pushed since; rerun with --force to reverse anyway"
                )));
            }
        }
        Ok(())
    }

    async fn run_from(&mut self, entry: &mut JournalEntry, from: usize) -> PkResult<()> {
        let steps = entry.plan.steps.clone();
        for (idx, step) in steps.iter().enumerate().skip(from) {
            match self.run_step(step).await {
                Ok(StepOutcome::Done) => {}
                Ok(StepOutcome::Conflict { paths }) => {
                    return self.suspend(entry, idx, paths);
                }
                Err(err) => {
                    // Roll back everything applied so far; only a conflict
                    // may leave state partially applied.
                    self.ctx.git.rebase_abort()?;
                    self.restore(entry, Direction::Reverse)?;
                    entry.state = EntryState::Aborted;
                    entry.finished_at = Some(Utc::now());
                    self.ctx.journal.append(entry)?;
                    return Err(err);
                }
            }
        }

        entry.state = EntryState::Committed;
        entry.finished_at = Some(Utc::now());
        self.ctx.journal.append(entry)?;
        Ok(())
    }

    fn suspend(
        &mut self,
        entry: &mut JournalEntry,
        at_step: usize,
        paths: Vec<String>,
    ) -> PkResult<()> {
        let branch = match entry.plan.steps.get(at_step) {
            Some(Step::Rebase { branch, .. }) => branch.clone(),
            _ => String::new(),
        };
        let command = entry.intent.command_name().to_string();
        let hint = format!(
            "conflicts in [{}]; resolve and run `pk {} --continue`, or `pk {} --abort`",
            paths.join(", "),
            command,
            command
        );
        entry.state = EntryState::Suspended { at_step, hint };
        self.ctx.journal.append(entry)?;
        Err(PkError::NeedsResolution { branch, command })
    }

    async fn run_step(&mut self, step: &Step) -> PkResult<StepOutcome> {
        match step {
            Step::CreateRef { name, at } => {
                if !self.ctx.repository.branch_exists(name) {
                    let oid = Oid::from_str(at)
                        .map_err(|_| PkError::Fatal(format!("invalid commit id `{at}`")))?;
                    self.ctx.repository.create_branch(name, oid)?;
                }
                Ok(StepOutcome::Done)
            }
            Step::DeleteRef { name, remote } => {
                if self.ctx.repository.branch_exists(name) {
                    // Never delete the ref under our feet.
                    if self.ctx.repository.current_branch_name().ok().as_deref() == Some(name) {
                        let trunk = self.ctx.tree.trunk_name.clone();
                        self.ctx.repository.checkout_branch(&trunk)?;
                    }
                    if let Ok(head) = self.ctx.repository.branch_head(name) {
                        notes::remove_note(self.ctx.repository, head)?;
                    }
                    self.ctx.repository.delete_branch(name)?;
                }
                if *remote {
                    let remote_name = self.ctx.config.repository.remote.clone();
                    self.ctx.git.push_delete(&remote_name, name)?;
                }
                if self.ctx.tree.get(name).is_some() {
                    self.ctx.tree.remove(name)?;
                }
                Ok(StepOutcome::Done)
            }
            Step::RenameRef { old, new } => {
                if self.ctx.repository.branch_exists(old) {
                    self.ctx.repository.rename_branch(old, new)?;
                }
                if self.ctx.tree.get(old).is_some() {
                    self.ctx.tree.rename(old, new)?;
                }
                Ok(StepOutcome::Done)
            }
            Step::Rebase {
                branch,
                onto,
                boundary,
            } => {
                let onto_head = self.ctx.repository.branch_head(onto)?;
                let branch_head = self.ctx.repository.branch_head(branch)?;

                // Already stacked on the target head: nothing to replay.
                if !self.ctx.repository.is_ancestor(onto_head, branch_head)? {
                    match self
                        .ctx
                        .git
                        .rebase_onto(branch, onto, boundary.as_deref())?
                    {
                        GitOutcome::Ok => {}
                        GitOutcome::Conflict { paths } => {
                            return Ok(StepOutcome::Conflict { paths });
                        }
                        GitOutcome::Diverged { branch } => {
                            return Err(PkError::RemoteDiverged(branch));
                        }
                        GitOutcome::Fatal { detail } => return Err(PkError::Fatal(detail)),
                    }
                }

                let new_head = self.ctx.repository.branch_head(branch)?;
                if let Some(node) = self.ctx.tree.get_mut(branch) {
                    node.head = new_head.to_string();
                    node.anchor = Some(onto_head.to_string());
                }
                Ok(StepOutcome::Done)
            }
            Step::SetParent {
                branch,
                parent,
                position,
            } => {
                let pos = position.map_or(InsertPos::Last, InsertPos::At);
                if self.ctx.tree.get(branch).is_some() {
                    if self.ctx.tree.parent(branch) != Some(parent.as_str())
                        || position.is_some()
                    {
                        self.ctx.tree.set_parent(branch, parent, pos)?;
                    }
                } else {
                    let head = self
                        .ctx
                        .repository
                        .branch_head(branch)
                        .map(|oid| oid.to_string())
                        .unwrap_or_default();
                    let anchor = self.ctx.tree.require(parent)?.head.clone();
                    let node = crate::tree::TrackedBranch::new(
                        branch,
                        None,
                        &head,
                        (!anchor.is_empty()).then_some(anchor.as_str()),
                    );
                    self.ctx.tree.insert(parent, node, pos)?;
                }
                Ok(StepOutcome::Done)
            }
            Step::UpdatePrBase { branch, base } => {
                if let Some(pr) = self.ctx.tree.get_mut(branch).and_then(|b| b.pr.as_mut()) {
                    pr.base = base.clone();
                }
                Ok(StepOutcome::Done)
            }
            Step::Push { branch } => {
                let expected = self
                    .ctx
                    .tree
                    .get(branch)
                    .and_then(|b| b.pr.as_ref())
                    .map(|pr| pr.head.clone());
                let remote = self.ctx.config.repository.remote.clone();
                match self
                    .ctx
                    .git
                    .push_with_lease(&remote, branch, expected.as_deref())?
                {
                    GitOutcome::Ok => {
                        let head = self.ctx.repository.branch_head(branch)?.to_string();
                        if let Some(pr) =
                            self.ctx.tree.get_mut(branch).and_then(|b| b.pr.as_mut())
                        {
                            pr.head = head;
                        }
                        Ok(StepOutcome::Done)
                    }
                    GitOutcome::Diverged { branch } => Err(PkError::RemoteDiverged(branch)),
                    GitOutcome::Conflict { .. } => {
                        Err(PkError::Fatal("push reported conflicts".to_string()))
                    }
                    GitOutcome::Fatal { detail } => Err(PkError::Fatal(detail)),
                }
            }
            Step::ForgeCreatePr { branch } => {
                if self
                    .ctx
                    .tree
                    .get(branch)
                    .map(|b| b.pr.is_some())
                    .unwrap_or(false)
                {
                    return Ok(StepOutcome::Done);
                }
                let node = self.ctx.tree.require(branch)?;
                let base = node
                    .parent
                    .clone()
                    .ok_or(PkError::TrunkImmutable("submit"))?;
                let title = self.head_commit_summary(branch)?;
                let body = crate::forge::stack_block_for(&self.ctx.tree, branch);
                let draft = self.ctx.config.pr.draft_by_default;
                let created = self
                    .forge()?
                    .create_pr(&CreatePr {
                        branch: branch.clone(),
                        base: base.clone(),
                        title,
                        body,
                        draft,
                    })
                    .await?;
                let head = node.head.clone();
                if let Some(node) = self.ctx.tree.get_mut(branch) {
                    node.pr = Some(crate::tree::PrBinding {
                        id: created.id,
                        url: created.url,
                        base,
                        head,
                        draft,
                        status: None,
                        fetched_at: None,
                    });
                }
                Ok(StepOutcome::Done)
            }
            Step::ForgeUpdatePr {
                branch,
                base,
                merge,
            } => {
                let Some(id) = self
                    .ctx
                    .tree
                    .get(branch)
                    .and_then(|b| b.pr.as_ref())
                    .map(|pr| pr.id)
                else {
                    return Ok(StepOutcome::Done);
                };
                if let Some(base) = base {
                    self.forge()?
                        .update_pr(
                            id,
                            &PrUpdate {
                                base: Some(base.clone()),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                if let Some(method) = merge {
                    // Idempotent on retry: a PR merged by a previous attempt
                    // is left alone.
                    let status = self.forge()?.pr_status(id).await?;
                    if status.state != PrState::Merged {
                        self.forge()?.merge_pr(id, *method).await?;
                    }
                }
                Ok(StepOutcome::Done)
            }
            Step::ForgeClosePr { branch } => {
                let Some(id) = self
                    .ctx
                    .tree
                    .get(branch)
                    .and_then(|b| b.pr.as_ref())
                    .map(|pr| pr.id)
                else {
                    return Ok(StepOutcome::Done);
                };
                let status = self.forge()?.pr_status(id).await?;
                if status.state == PrState::Open {
                    self.forge()?.close_pr(id).await?;
                }
                Ok(StepOutcome::Done)
            }
            Step::CommitMetadata => {
                self.ctx.store.save(&self.ctx.tree)?;
                notes::sync_tree(self.ctx.repository, &self.ctx.tree)?;
                Ok(StepOutcome::Done)
            }
        }
    }

    fn head_commit_summary(&self, branch: &str) -> PkResult<String> {
        let head = self.ctx.repository.branch_head(branch)?;
        let commit = self.ctx.repository.find_commit(head)?;
        Ok(commit.summary().unwrap_or(branch).to_string())
    }

    /// Pre-images for every branch the plan can touch.
    fn capture_pre_image(&self, plan: &Plan) -> PkResult<PreImage> {
        let names = plan_ref_names(plan);
        self.capture_snapshot(&names)
    }

    fn capture_snapshot(&self, names: &BTreeSet<String>) -> PkResult<PreImage> {
        let mut branch_heads = std::collections::BTreeMap::new();
        for name in names {
            if let Ok(head) = self.ctx.repository.branch_head(name) {
                branch_heads.insert(name.clone(), head.to_string());
            }
        }
        Ok(PreImage {
            metadata: StacksFile::from_tree(&self.ctx.tree),
            branch_heads,
        })
    }

    fn names_for_snapshot(&self, entry: &JournalEntry) -> BTreeSet<String> {
        let mut names = plan_ref_names(&entry.plan);
        names.extend(entry.pre_image.branch_heads.keys().cloned());
        names
    }

    /// Restores refs and metadata from a journal entry's pre-image.
    ///
    /// `Reverse` unwinds the plan (deletes created refs, un-renames);
    /// `Forward` re-applies it (deletes landed refs again). Both then reset
    /// every pre-imaged branch head and rewrite the metadata file.
    fn restore(&mut self, entry: &JournalEntry, direction: Direction) -> PkResult<()> {
        let trunk = self.ctx.tree.trunk_name.clone();
        for step in &entry.plan.steps {
            match (direction, step) {
                (Direction::Reverse, Step::CreateRef { name, .. }) => {
                    let created_by_plan = !entry.pre_image.branch_heads.contains_key(name);
                    if created_by_plan && self.ctx.repository.branch_exists(name) {
                        if self.ctx.repository.current_branch_name().ok().as_deref()
                            == Some(name.as_str())
                        {
                            self.ctx.repository.checkout_branch(&trunk)?;
                        }
                        self.ctx.repository.delete_branch(name)?;
                    }
                }
                (Direction::Reverse, Step::RenameRef { old, new }) => {
                    if self.ctx.repository.branch_exists(new)
                        && !self.ctx.repository.branch_exists(old)
                    {
                        self.ctx.repository.rename_branch(new, old)?;
                    }
                }
                (Direction::Forward, Step::DeleteRef { name, .. }) => {
                    if self.ctx.repository.branch_exists(name) {
                        if self.ctx.repository.current_branch_name().ok().as_deref()
                            == Some(name.as_str())
                        {
                            self.ctx.repository.checkout_branch(&trunk)?;
                        }
                        self.ctx.repository.delete_branch(name)?;
                    }
                }
                (Direction::Forward, Step::RenameRef { old, new }) => {
                    if self.ctx.repository.branch_exists(old)
                        && !self.ctx.repository.branch_exists(new)
                    {
                        self.ctx.repository.rename_branch(old, new)?;
                    }
                }
                _ => {}
            }
        }

        for (branch, head) in &entry.pre_image.branch_heads {
            let oid = Oid::from_str(head)
                .map_err(|_| PkError::Fatal(format!("invalid pre-image head `{head}`")))?;
            if self.ctx.repository.branch_exists(branch) {
                self.ctx.repository.reset_branch(branch, oid)?;
            } else {
                self.ctx.repository.create_branch(branch, oid)?;
            }
        }

        let tree = entry
            .pre_image
            .metadata
            .clone()
            .into_tree(&self.ctx.tree.trunk_name)?;
        self.ctx.store.save(&tree)?;
        self.ctx.tree = tree;
        Ok(())
    }
}

/// The index the active entry is suspended at, or 0 for a crashed Open entry.
fn suspended_step(entry: &JournalEntry) -> usize {
    match entry.state {
        EntryState::Suspended { at_step, .. } => at_step,
        _ => 0,
    }
}

/// Every local ref name a plan can move.
fn plan_ref_names(plan: &Plan) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for step in &plan.steps {
        match step {
            Step::CreateRef { name, .. } | Step::DeleteRef { name, .. } => {
                names.insert(name.clone());
            }
            Step::RenameRef { old, new } => {
                names.insert(old.clone());
                names.insert(new.clone());
            }
            Step::Rebase { branch, .. }
            | Step::SetParent { branch, .. }
            | Step::Push { branch } => {
                names.insert(branch.clone());
            }
            _ => {}
        }
    }
    names
}
