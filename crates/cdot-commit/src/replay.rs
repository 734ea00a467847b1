//! Replaying edit sets as commits
//!
//! Every edit set is committed on a scratch branch and then cherry-picked
//! onto the target branch, so that sets written against the starting tree
//! still land one after the other. Conflicts from the pick go through a
//! [`ConflictResolver`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cdot_blocks::BlockEdit;
use git2::build::{CheckoutBuilder, TreeUpdateBuilder};
use git2::{BranchType, CherrypickOptions, Commit, FileMode, Oid, Repository, Signature, StatusOptions};
use tracing::{debug, info, warn};

use crate::conflict::{ConflictResolver, CONFLICT_MARKER};
use crate::error::{CommitError, Result};

/// Branch holding the edit set being replayed
pub const SCRATCH_BRANCH: &str = "cdot-scratch";

/// Branch and identity used for the replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitConfig {
    /// Branch receiving one commit per edit set
    pub branch: String,
    /// Branch checked out again by [`reset_repo`]; `main` when unset
    pub reset_branch: Option<String>,
    pub author_name: String,
    pub author_email: String,
}

impl CommitConfig {
    #[must_use]
    pub fn new(branch: impl Into<String>, author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            reset_branch: None,
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }

    #[must_use]
    pub fn with_reset_branch(mut self, branch: impl Into<String>) -> Self {
        self.reset_branch = Some(branch.into());
        self
    }

    /// Branch [`reset_repo`] returns to
    #[inline]
    #[must_use]
    pub fn reset_branch(&self) -> &str {
        self.reset_branch.as_deref().unwrap_or("main")
    }

    fn signature(&self) -> Result<Signature<'static>> {
        Ok(Signature::now(&self.author_name, &self.author_email)?)
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Commits created on the target branch, in order
    pub commits: Vec<Oid>,
    /// Edit sets that changed nothing once picked
    pub skipped: usize,
}

/// Commit each edit set on `config.branch`, created at the current HEAD
///
/// The working tree must be clean. On return the target branch is checked
/// out; the scratch branch is deleted whether or not the replay succeeded.
///
/// # Errors
/// Returns a [`CommitError`] when the target branch exists, an edit applies
/// neither to the starting tree nor to the target, a conflict cannot be
/// resolved, or git fails
pub fn commit_edits(
    repo: &Repository,
    edit_sets: &[Vec<BlockEdit>],
    config: &CommitConfig,
    resolver: &mut dyn ConflictResolver,
) -> Result<ReplaySummary> {
    let workdir = repo.workdir().ok_or(CommitError::BareRepository)?.to_path_buf();
    ensure_clean(repo)?;

    let initial = repo.head()?.peel_to_commit()?;
    if repo.find_branch(&config.branch, BranchType::Local).is_ok() {
        return Err(CommitError::BranchExists(config.branch.clone()));
    }
    repo.branch(&config.branch, &initial, false)?;
    checkout_branch(repo, &config.branch)?;
    info!(branch = %config.branch, base = %initial.id(), sets = edit_sets.len(), "replaying edit sets");

    let signature = config.signature()?;
    let mut summary = ReplaySummary::default();
    for (index, edits) in edit_sets.iter().enumerate() {
        let picked = replay_set(repo, &workdir, &initial, edits, index, &signature, resolver);
        let cleanup = delete_branch(repo, SCRATCH_BRANCH);
        match picked? {
            Some(oid) => summary.commits.push(oid),
            None => summary.skipped += 1,
        }
        cleanup?;
    }
    info!(commits = summary.commits.len(), skipped = summary.skipped, "replay finished");
    Ok(summary)
}

/// Return to the reset branch and drop the replay branches
///
/// Uncommitted changes are discarded. Missing branches are not an error.
///
/// # Errors
/// Returns a [`CommitError`] when the reset branch cannot be checked out
pub fn reset_repo(repo: &Repository, config: &CommitConfig) -> Result<()> {
    let reset = config.reset_branch();
    let branch = repo.find_branch(reset, BranchType::Local)?;
    let target = branch.get().peel_to_commit()?;
    repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().force()))?;
    repo.set_head(&format!("refs/heads/{reset}"))?;
    info!(branch = reset, "checked out reset branch");

    for name in [config.branch.as_str(), SCRATCH_BRANCH] {
        if let Err(e) = delete_branch(repo, name) {
            warn!(branch = name, error = %e, "could not delete branch");
        }
    }
    Ok(())
}

fn ensure_clean(repo: &Repository) -> Result<()> {
    let mut options = StatusOptions::new();
    options.include_untracked(false).include_ignored(false);
    let count = repo.statuses(Some(&mut options))?.len();
    if count > 0 {
        return Err(CommitError::DirtyWorkingTree { count });
    }
    Ok(())
}

fn checkout_branch(repo: &Repository, name: &str) -> Result<()> {
    let branch = repo.find_branch(name, BranchType::Local)?;
    let commit = branch.get().peel_to_commit()?;
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    Ok(())
}

fn delete_branch(repo: &Repository, name: &str) -> Result<()> {
    match repo.find_branch(name, BranchType::Local) {
        Ok(mut branch) => {
            branch.delete()?;
            debug!(branch = name, "deleted branch");
            Ok(())
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Commit one edit set on the scratch branch and pick it onto HEAD
fn replay_set(
    repo: &Repository,
    workdir: &Path,
    initial: &Commit<'_>,
    edits: &[BlockEdit],
    index: usize,
    signature: &Signature<'_>,
    resolver: &mut dyn ConflictResolver,
) -> Result<Option<Oid>> {
    let tip = repo.head()?.peel_to_commit()?;
    let by_file = group_by_file(workdir, edits)?;
    if by_file.is_empty() {
        debug!(set = index, "edit set has no effective edit");
        return Ok(None);
    }

    let (base, contents) = match apply_on(repo, initial, &by_file) {
        Ok(contents) => (initial.clone(), contents),
        Err(CommitError::EditDoesNotApply { .. }) => (tip.clone(), apply_on(repo, &tip, &by_file)?),
        Err(e) => return Err(e),
    };
    debug!(set = index, base = %base.id(), files = contents.len(), "applying edit set on scratch branch");

    let mut update = TreeUpdateBuilder::new();
    for (path, content) in &contents {
        update.upsert(path.as_path(), repo.blob(content.as_bytes())?, FileMode::Blob);
    }
    let tree = repo.find_tree(update.create_updated(repo, &base.tree()?)?)?;
    repo.branch(SCRATCH_BRANCH, &base, true)?;
    let message = format!("Apply edit set {}", index + 1);
    let scratch = repo.commit(
        Some(&format!("refs/heads/{SCRATCH_BRANCH}")),
        signature,
        signature,
        &message,
        &tree,
        &[&base],
    )?;
    let scratch = repo.find_commit(scratch)?;

    info!(commit = %scratch.id(), "cherry-picking onto target branch");
    let mut checkout = CheckoutBuilder::new();
    checkout.safe().allow_conflicts(true).conflict_style_merge(true);
    let mut options = CherrypickOptions::new();
    options.checkout_builder(checkout);
    repo.cherrypick(&scratch, Some(&mut options))?;

    let result = finish_pick(repo, workdir, &tip, &by_file, &message, signature, resolver);
    repo.cleanup_state()?;
    result
}

fn finish_pick(
    repo: &Repository,
    workdir: &Path,
    tip: &Commit<'_>,
    by_file: &BTreeMap<PathBuf, Vec<&BlockEdit>>,
    message: &str,
    signature: &Signature<'_>,
    resolver: &mut dyn ConflictResolver,
) -> Result<Option<Oid>> {
    let mut index = repo.index()?;
    if index.has_conflicts() {
        warn!("merge conflict while picking edit set");
        for path in by_file.keys() {
            let full = workdir.join(path);
            let content = fs::read_to_string(&full).map_err(|e| CommitError::io(&full, e))?;
            if !content.contains(CONFLICT_MARKER) {
                continue;
            }
            let resolved = resolver.resolve(&content).map_err(|source| CommitError::Resolver {
                path: path.clone(),
                source,
            })?;
            fs::write(&full, resolved).map_err(|e| CommitError::io(&full, e))?;
            index.add_path(path)?;
            debug!(path = %path.display(), "conflict resolved");
        }
        index.write()?;
        if index.has_conflicts() {
            let paths = index
                .conflicts()?
                .filter_map(std::result::Result::ok)
                .filter_map(|c| c.our.or(c.their).or(c.ancestor))
                .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
                .collect();
            return Err(CommitError::UnresolvedConflict { paths });
        }
    }

    let tree_id = index.write_tree()?;
    if tree_id == tip.tree_id() {
        info!("skipping commit because it is empty");
        return Ok(None);
    }
    let tree = repo.find_tree(tree_id)?;
    let oid = repo.commit(Some("HEAD"), signature, signature, message, &tree, &[tip])?;
    Ok(Some(oid))
}

/// Non-empty edits keyed by path relative to the working directory
fn group_by_file<'e>(workdir: &Path, edits: &'e [BlockEdit]) -> Result<BTreeMap<PathBuf, Vec<&'e BlockEdit>>> {
    let mut by_file: BTreeMap<PathBuf, Vec<&BlockEdit>> = BTreeMap::new();
    for edit in edits.iter().filter(|e| !e.is_empty()) {
        by_file.entry(relative_path(workdir, &edit.file)?).or_default().push(edit);
    }
    Ok(by_file)
}

fn relative_path(workdir: &Path, file: &Path) -> Result<PathBuf> {
    if file.is_relative() {
        return Ok(file.to_path_buf());
    }
    if let Ok(rel) = file.strip_prefix(workdir) {
        return Ok(rel.to_path_buf());
    }
    let canonical_root = workdir.canonicalize().map_err(|e| CommitError::io(workdir, e))?;
    let canonical_file = file.canonicalize().map_err(|e| CommitError::io(file, e))?;
    canonical_file
        .strip_prefix(&canonical_root)
        .map(Path::to_path_buf)
        .map_err(|_| CommitError::OutsideRepository(file.to_path_buf()))
}

fn file_at(repo: &Repository, commit: &Commit<'_>, path: &Path) -> Result<Option<String>> {
    let tree = commit.tree()?;
    let entry = match tree.get_path(path) {
        Ok(entry) => entry,
        Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let blob = entry.to_object(repo)?.peel_to_blob()?;
    Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
}

/// Replace the first occurrence of the edit's original text
fn apply_text(content: &str, edit: &BlockEdit) -> Option<String> {
    content.contains(&edit.before).then(|| content.replacen(&edit.before, &edit.after, 1))
}

/// New contents of every touched file at `commit`
fn apply_on(
    repo: &Repository,
    commit: &Commit<'_>,
    by_file: &BTreeMap<PathBuf, Vec<&BlockEdit>>,
) -> Result<Vec<(PathBuf, String)>> {
    let mut contents = Vec::with_capacity(by_file.len());
    for (path, edits) in by_file {
        let mut content = file_at(repo, commit, path)?.ok_or_else(|| unapplicable(path, edits[0]))?;
        for edit in edits {
            content = apply_text(&content, edit).ok_or_else(|| unapplicable(path, edit))?;
        }
        contents.push((path.clone(), content));
    }
    Ok(contents)
}

fn unapplicable(path: &Path, edit: &BlockEdit) -> CommitError {
    CommitError::EditDoesNotApply {
        file: path.to_path_buf(),
        block: edit.block_id,
    }
}
