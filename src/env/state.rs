//! The mutable pointers of a repository: current branch, staged root and
//! working root, persisted as `repo_state.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::env::error::{EnvError, EnvResult};
use crate::storage::{BranchName, Hash};

/// file name of the persisted state, relative to the repository root
pub const REPO_STATE_FILE: &str = "repo_state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    /// full ref of the current branch, e.g. `refs/heads/main`
    pub head: String,
    pub staged: Hash,
    pub working: Hash,
}

impl RepoState {
    pub fn new(branch: &BranchName, root: Hash) -> Self {
        Self {
            head: branch.as_ref_path(),
            staged: root,
            working: root,
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(REPO_STATE_FILE)
    }

    pub fn load(dir: &Path) -> EnvResult<Self> {
        let path = Self::path(dir);
        let invalid = |reason: String| EnvError::InvalidState {
            path: path.clone(),
            reason,
        };

        let bytes = fs::read(&path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))
    }

    /// Replace the state file atomically: write a sibling temp file, then
    /// rename it over the old one.
    pub fn save(&self, dir: &Path) -> EnvResult<()> {
        let path = Self::path(dir);
        let state_io = |reason: String| EnvError::StateIo {
            path: path.clone(),
            reason,
        };

        let mut file = NamedTempFile::new_in(dir).map_err(|e| state_io(e.to_string()))?;
        serde_json::to_writer_pretty(&mut file, self).map_err(|e| state_io(e.to_string()))?;
        file.write_all(b"\n").map_err(|e| state_io(e.to_string()))?;
        file.as_file().sync_all().map_err(|e| state_io(e.to_string()))?;
        file.persist(&path).map_err(|e| state_io(e.error.to_string()))?;
        Ok(())
    }

    /// the branch `head` names
    pub fn head_branch(&self) -> EnvResult<BranchName> {
        BranchName::from_ref_path(&self.head).map_err(|e| EnvError::InvalidState {
            path: PathBuf::from(REPO_STATE_FILE),
            reason: e.to_string(),
        })
    }
}
