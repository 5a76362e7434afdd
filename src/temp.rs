//! Scoped temporary-artifact handling for print jobs.

use std::path::{Path, PathBuf};

use crate::Result;

/// Handle to the process-wide temporary directory. Created once at
/// startup and passed explicitly into the pipeline; every job derives
/// its artifact paths from it. Creation is tolerant of the directory
/// already existing, so concurrent startup is safe.
#[derive(Debug, Clone)]
pub struct TempDir {
    root: PathBuf,
}

impl TempDir {
    /// Create (or reuse) the temporary directory at `root`.
    pub async fn new(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    /// Path of the directory itself.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// A fresh path inside the directory. Jobs are isolated from each
    /// other only by these names being collision-resistant: a second
    /// resolution timestamp plus a random suffix.
    pub fn fresh_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
        let name = format!("{}_{}", stamp, unique_name(prefix));
        if extension.is_empty() {
            self.root.join(name)
        } else {
            self.root.join(format!("{}.{}", name, extension))
        }
    }
}

/// `{prefix}_{random}`. Also used for printer-side destination names so
/// repeated prints of the same file do not overwrite each other.
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, nanoid::nanoid!(4))
}

/// Best-effort removal used by every cleanup path. Failures are logged
/// and swallowed so one stuck artifact never masks the job's own error
/// or blocks the removal of the others.
pub async fn remove_quietly(path: &Path) {
    if !path.exists() {
        return;
    }
    let result = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    if let Err(error) = result {
        tracing::warn!(
            path = %path.display(),
            error = %error,
            "failed to remove temporary artifact"
        );
    }
}
