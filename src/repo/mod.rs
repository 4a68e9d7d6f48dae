//! Repository access used by the post-receive hook.
//!
//! The hook only needs a handful of primitives: resolve a revision, walk a
//! commit range, read a commit, and list the paths it changed. They are
//! expressed by [`Repository`]; [`GitRepository`] implements them on top of
//! the `git` command line.

mod git;

pub use git::GitRepository;

use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::error::Result;
use crate::event::Author;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub parents: Vec<String>,
    pub author: Author,
    pub message: String,
    /// Only filled for commits that are emitted individually.
    pub changed_paths: Vec<String>,
}

impl Commit {
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }
}

/// Commits reachable from `new` but not from `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRange {
    pub new: String,
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Children before parents.
    Topological,
    /// Parents before children, oldest first.
    Reverse,
}

/// Similarity thresholds (percent) for rename and copy detection. `None`
/// disables the detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub rename_threshold: Option<u8>,
    pub copy_threshold: Option<u8>,
}

pub type CommitIds<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

pub trait Repository {
    fn path(&self) -> &Path;

    fn is_bare(&self) -> bool;

    /// Value of a repository configuration key, `None` when unset.
    fn config_value(&self, key: &str) -> Option<String>;

    /// Full id of the commit `rev` points at, peeling annotated tags.
    fn resolve_commit(&self, rev: &str) -> Result<String>;

    fn rev_walk(&self, range: &CommitRange, order: WalkOrder) -> Result<CommitIds<'_>>;

    fn commit(&self, id: &str) -> Result<Commit>;

    /// Paths changed by `commit` relative to its first parent, or its whole
    /// tree for a root commit. Renames and copies use [`crate::paths::rename_display`].
    fn changed_paths(&self, commit: &Commit, options: &DiffOptions) -> Result<Vec<String>>;

    /// Tag names indexed by the commit they point at.
    fn tag_targets(&self) -> Result<HashMap<String, Vec<String>>>;
}

/// Walks one pushed range in the two passes the hook needs.
pub struct RangeWalker<'a> {
    repo: &'a dyn Repository,
    range: CommitRange,
}

impl<'a> RangeWalker<'a> {
    pub fn new(repo: &'a dyn Repository, range: CommitRange) -> Self {
        Self { repo, range }
    }

    /// Number of commits in the range. A traversal error ends the count
    /// early; only failing to start the walk is an error.
    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for id in self.repo.rev_walk(&self.range, WalkOrder::Topological)? {
            match id {
                Ok(_) => count += 1,
                Err(e) => {
                    warn!("Commit walk stopped after {} commits: {}", count, e);
                    break;
                }
            }
        }
        Ok(count)
    }

    /// Commits of the range, oldest first, with their changed paths loaded.
    /// Iteration stops at the first commit that can't be read.
    pub fn commits(&self, options: DiffOptions) -> Result<impl Iterator<Item = Commit> + 'a> {
        let repo = self.repo;
        let ids = repo.rev_walk(&self.range, WalkOrder::Reverse)?;

        let commits = ids
            .map(move |id| id.and_then(|id| repo.commit(&id)))
            .map_while(|commit| match commit {
                Ok(commit) => Some(commit),
                Err(e) => {
                    warn!("Commit walk stopped: {}", e);
                    None
                }
            })
            .map(move |mut commit| {
                match repo.changed_paths(&commit, &options) {
                    Ok(paths) => commit.changed_paths = paths,
                    Err(e) => warn!("Couldn't list files of {}: {}", commit.id, e),
                }
                commit
            });

        Ok(commits)
    }
}

/// Nearest tag among the ancestors of `commit_id`, excluding `tag` itself.
///
/// Best effort: any failure is logged and yields `None`.
pub fn previous_tag(repo: &dyn Repository, tag: &str, commit_id: &str) -> Option<String> {
    let lookup = || -> Result<Option<String>> {
        let commit = repo.commit(commit_id)?;
        let Some(parent) = commit.parents.first() else {
            return Ok(None);
        };
        let targets = repo.tag_targets()?;
        let range = CommitRange {
            new: parent.clone(),
            exclude: None,
        };
        for id in repo.rev_walk(&range, WalkOrder::Topological)? {
            let id = id?;
            if let Some(found) = targets
                .get(&id)
                .and_then(|tags| tags.iter().find(|t| t.as_str() != tag))
            {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    };

    lookup().unwrap_or_else(|e| {
        warn!("Couldn't find the tag preceding {}: {}", tag, e);
        None
    })
}
