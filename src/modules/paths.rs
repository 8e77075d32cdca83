use std::env;
use std::path::{Path, PathBuf};

use crate::error::{CxError, CxResult};

/// Nearest ancestor of `cwd` (itself included) holding a `.git` entry.
pub fn repo_root_from(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

pub fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogScope {
    Repo,
    Global,
}

impl LogScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repo => "repo",
            Self::Global => "global",
        }
    }
}

/// Where the harness keeps its files for one working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    pub cwd: PathBuf,
    pub scope: LogScope,
    pub repo_root: Option<PathBuf>,
    pub base: PathBuf,
}

impl LogLayout {
    /// Pure in `cwd`, `home` and the filesystem under `cwd`.
    pub fn resolve(cwd: &Path, home: Option<&Path>) -> CxResult<Self> {
        if let Some(root) = repo_root_from(cwd) {
            return Ok(Self {
                cwd: cwd.to_path_buf(),
                scope: LogScope::Repo,
                base: root.join(".codex"),
                repo_root: Some(root),
            });
        }
        let Some(home) = home else {
            return Err(CxError::invalid(
                "no enclosing repository and HOME is unset; cannot place logs",
            ));
        };
        Ok(Self {
            cwd: cwd.to_path_buf(),
            scope: LogScope::Global,
            base: home.join(".codex"),
            repo_root: None,
        })
    }

    pub fn from_process() -> CxResult<Self> {
        let cwd = env::current_dir().map_err(|e| CxError::io("cannot read current dir", e))?;
        Self::resolve(&cwd, home_dir().as_deref())
    }

    pub fn run_log(&self) -> PathBuf {
        self.base.join("cxlogs").join("runs.jsonl")
    }

    pub fn schema_fail_log(&self) -> PathBuf {
        self.base.join("cxlogs").join("schema_failures.jsonl")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.base.join("quarantine")
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.base.join("schemas")
    }
}

pub fn ensure_parent_dir(path: &Path) -> CxResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    std::fs::create_dir_all(parent)
        .map_err(|e| CxError::io(format!("failed to create {}", parent.display()), e))
}
