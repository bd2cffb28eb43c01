use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

/// An exclusive, throwaway workspace for one compile/run cycle
///
/// Callers finish with `cleanup`, which removes the directory off the async
/// worker threads. A session dropped without it (cancellation by the broker's
/// deadline) is removed synchronously in `Drop`. Removal failures are logged
/// and never propagated.
#[derive(Debug)]
pub struct SandboxSession {
    id: Uuid,
    workspace_dir: PathBuf,
    source_path: PathBuf,
    artifact_path: PathBuf,
    cleaned_up: bool,
}

impl SandboxSession {
    /// Creates `<root>/kotlin_<uuid>`; fails rather than reuse an existing directory
    pub async fn create(root: &Path, source_file: &str, artifact_file: &str) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create workspace root {}", root.display()))?;

        let id = Uuid::new_v4();
        let workspace_dir = root.join(format!("kotlin_{id}"));
        tokio::fs::create_dir(&workspace_dir)
            .await
            .with_context(|| format!("Failed to create workspace {}", workspace_dir.display()))?;

        log::debug!("Sandbox session {id} created at {}", workspace_dir.display());
        Ok(Self {
            id,
            source_path: workspace_dir.join(source_file),
            artifact_path: workspace_dir.join(artifact_file),
            workspace_dir,
            cleaned_up: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Writes the submission verbatim to the source file
    pub async fn write_source(&self, source_code: &str) -> Result<()> {
        tokio::fs::write(&self.source_path, source_code)
            .await
            .with_context(|| format!("Failed to write {}", self.source_path.display()))
    }

    /// Removes the workspace without blocking the runtime
    pub async fn cleanup(mut self) {
        let removed = tokio::fs::remove_dir_all(&self.workspace_dir).await;
        self.log_removal(removed);
        self.cleaned_up = true;
    }

    fn log_removal(&self, removed: std::io::Result<()>) {
        match removed {
            Ok(()) => log::debug!("Sandbox session {} cleaned up", self.id),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::error!(
                "Error cleaning up sandbox session {} at {}: {e}",
                self.id,
                self.workspace_dir.display()
            ),
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if !self.cleaned_up {
            self.log_removal(std::fs::remove_dir_all(&self.workspace_dir));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let session = SandboxSession::create(root.path(), "Main.kt", "program.jar")
            .await
            .unwrap();
        session.write_source("fun main() {}").await.unwrap();

        let workspace = session.workspace_dir().to_path_buf();
        assert!(session.source_path().exists());
        assert_eq!(session.artifact_path(), workspace.join("program.jar"));
        assert!(workspace.starts_with(root.path()));

        drop(session);
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_cleanup_removes_nested_files() {
        let root = tempfile::tempdir().unwrap();
        let session = SandboxSession::create(root.path(), "Main.kt", "program.jar")
            .await
            .unwrap();
        let nested = session.workspace_dir().join("out/classes");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("MainKt.class"), [0xca, 0xfe]).unwrap();

        let workspace = session.workspace_dir().to_path_buf();
        session.cleanup().await;
        assert!(!workspace.exists());
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let a = SandboxSession::create(root.path(), "Main.kt", "program.jar")
            .await
            .unwrap();
        let b = SandboxSession::create(root.path(), "Main.kt", "program.jar")
            .await
            .unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.workspace_dir(), b.workspace_dir());
    }

    #[tokio::test]
    async fn test_drop_tolerates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let session = SandboxSession::create(root.path(), "Main.kt", "program.jar")
            .await
            .unwrap();
        std::fs::remove_dir_all(session.workspace_dir()).unwrap();
        drop(session);
    }
}
