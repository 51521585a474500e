//! Commit creation, commit spec resolution and history traversal
//!
//! A commit's git tree holds a single blob entry, `root`, whose object id is
//! the hash of the root value the commit snapshots. Commits are immutable;
//! the only mutable part of history is where branch refs point.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use git2::{FileMode, Oid, Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::types::{BranchName, CommitId, GitSignature, Hash};

/// name of the tree entry carrying the root value hash
pub const ROOT_ENTRY: &str = "root";

/// a commit and the root value it references
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: CommitId,
    pub root: Hash,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> StorageResult<Self> {
        let id = CommitId::new(commit.id());
        let tree = commit.tree()?;
        let root = tree
            .get_name(ROOT_ENTRY)
            .map(|entry| Hash::from_oid(entry.id()))
            .ok_or_else(|| StorageError::CorruptedData {
                hash: id.to_hash(),
                reason: format!("commit tree has no '{}' entry", ROOT_ENTRY),
            })?;

        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(Self {
            id,
            root,
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        })
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// first line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    root: Option<Hash>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            root: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::verdb(),
            update_ref: None,
        }
    }

    /// the root value this commit snapshots; it must already be stored
    pub fn root(mut self, root: Hash) -> Self {
        self.root = Some(root);
        self
    }

    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set multiple parents (for merge commits)
    pub fn parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref (branch) to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<CommitId> {
        let root = self
            .root
            .ok_or_else(|| StorageError::Internal("commit requires a root value".to_string()))?;

        let tree_id = root_tree(self.repo, root)?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &sig,
            &sig,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

/// write the single-entry tree pointing at a root value blob
fn root_tree(repo: &Repository, root: Hash) -> StorageResult<Oid> {
    let mut builder = repo.treebuilder(None)?;
    builder.insert(ROOT_ENTRY, root.to_oid()?, i32::from(FileMode::Blob))?;
    Ok(builder.write()?)
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<Commit> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::RefNotFound(id.to_string()))?;

    Commit::from_git2(&commit)
}

/// where a commit spec starts walking from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitBase {
    /// the head of the current working branch
    Head,
    Hash(Hash),
    Branch(BranchName),
}

/// one ancestry step applied after the base is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    /// `~N`: follow first parents N times
    FirstParents(usize),
    /// `^N`: the N-th parent, `^0` being the commit itself
    Parent(usize),
}

/// A parsed commit spec: `HEAD`, a commit hash or a branch name, followed by
/// any number of `~N` / `^N` steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSpec {
    text: String,
    base: CommitBase,
    ancestry: Vec<Ancestry>,
}

impl CommitSpec {
    /// `HEAD`: the current branch tip
    pub fn head() -> Self {
        Self {
            text: "HEAD".to_string(),
            base: CommitBase::Head,
            ancestry: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> StorageResult<Self> {
        let text = text.trim();
        let invalid = || StorageError::InvalidSpec(text.to_string());

        if text.is_empty() {
            return Err(invalid());
        }

        let split = text.find(|c: char| c == '~' || c == '^').unwrap_or(text.len());
        let (base_text, mut rest) = text.split_at(split);

        let base = if base_text.eq_ignore_ascii_case("head") {
            CommitBase::Head
        } else if Hash::is_valid(base_text) {
            CommitBase::Hash(Hash::from_hex(base_text)?)
        } else {
            CommitBase::Branch(BranchName::new(base_text).map_err(|_| invalid())?)
        };

        let mut ancestry = Vec::new();
        while let Some(op) = rest.chars().next() {
            if op != '~' && op != '^' {
                return Err(invalid());
            }
            rest = &rest[op.len_utf8()..];

            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let count = if digits == 0 {
                1
            } else {
                rest[..digits].parse::<usize>().map_err(|_| invalid())?
            };
            rest = &rest[digits..];

            ancestry.push(match op {
                '~' => Ancestry::FirstParents(count),
                _ => Ancestry::Parent(count),
            });
        }

        Ok(Self {
            text: text.to_string(),
            base,
            ancestry,
        })
    }

    pub fn base(&self) -> &CommitBase {
        &self.base
    }

    pub fn ancestry(&self) -> &[Ancestry] {
        &self.ancestry
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for CommitSpec {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CommitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Resolve `spec` to a commit. `HEAD` is read through `current_branch`.
///
/// Unknown branches, unknown hashes and ancestry steps that walk off the
/// history all fail with `RefNotFound`.
pub fn resolve_commit(
    repo: &Repository,
    spec: &CommitSpec,
    current_branch: &BranchName,
) -> StorageResult<Commit> {
    let not_found = || StorageError::RefNotFound(spec.to_string());

    let start = match spec.base() {
        CommitBase::Head => RefManager::resolve_branch(repo, current_branch)?.raw(),
        CommitBase::Branch(branch) => RefManager::resolve_branch(repo, branch)?.raw(),
        CommitBase::Hash(hash) => hash.to_oid()?,
    };

    let mut commit = repo.find_commit(start).map_err(|_| not_found())?;
    for step in spec.ancestry() {
        commit = match *step {
            Ancestry::FirstParents(n) => {
                let mut current = commit;
                for _ in 0..n {
                    current = current.parent(0).map_err(|_| not_found())?;
                }
                current
            }
            Ancestry::Parent(0) => commit,
            Ancestry::Parent(n) => commit.parent(n - 1).map_err(|_| not_found())?,
        };
    }

    Commit::from_git2(&commit)
}

/// iterate over commit history starting from a commit, newest first
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Commit::from_git2(&commit)),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}
