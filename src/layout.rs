//! [`WorkingLayout`] — the per-build scratch directory.

use std::path::{Path, PathBuf};

use stacked_errors::{Result, StackableErr};

/// A per-build scratch directory. Only the [`crate::orchestrator::Orchestrator`]
/// mutates this directly; other components receive the already-resolved
/// subpaths they need.
#[derive(Debug, Clone)]
pub struct WorkingLayout {
    root: PathBuf,
}

impl WorkingLayout {
    /// Creates a fresh scratch directory under `base` (a system temp dir by
    /// default), named with a random id so concurrent builds never collide.
    pub async fn create(base: &Path) -> Result<Self> {
        let root = base.join(format!("s2i-build-{}", uuid::Uuid::new_v4()));
        for sub in [
            "upload/src",
            "upload/scripts",
            "upload/artifacts",
            "downloads/scripts",
            "downloads/defaultScripts",
            "downloads/sourceScripts",
            "runtimeArtifacts",
        ] {
            tokio::fs::create_dir_all(root.join(sub))
                .await
                .stack_err(|| format!("WorkingLayout::create -> could not create {sub}"))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upload_src(&self) -> PathBuf {
        self.root.join("upload/src")
    }

    pub fn upload_scripts(&self) -> PathBuf {
        self.root.join("upload/scripts")
    }

    pub fn upload_artifacts(&self) -> PathBuf {
        self.root.join("upload/artifacts")
    }

    pub fn downloads_caller_scripts(&self) -> PathBuf {
        self.root.join("downloads/scripts")
    }

    pub fn downloads_default_scripts(&self) -> PathBuf {
        self.root.join("downloads/defaultScripts")
    }

    pub fn downloads_source_scripts(&self) -> PathBuf {
        self.root.join("downloads/sourceScripts")
    }

    pub fn runtime_artifacts(&self) -> PathBuf {
        self.root.join("runtimeArtifacts")
    }

    /// Removes the entire scratch directory. Called on every exit path from
    /// the orchestrator unless the caller asked to preserve it for debugging.
    pub async fn remove(self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).stack_err(|| {
                format!("WorkingLayout::remove -> could not remove {:?}", self.root)
            }),
        }
    }
}
