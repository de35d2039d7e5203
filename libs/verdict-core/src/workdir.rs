use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GraderError;

/// Exclusively-owned, ephemeral filesystem scope for one evaluation run.
///
/// Provisioned before any submitted code runs, used as the execution cwd,
/// and removed unconditionally when the run ends. Release is a scoped
/// contract: the explicit `release()` on the normal path, the `Drop`
/// fallback on every other exit path (errors, timeouts). Never shared
/// between concurrent runs.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    released: bool,
}

impl WorkingDirectory {
    /// Create a fresh run directory under `base` and stage the given support
    /// files into it, each under its basename. A `true` staging flag marks
    /// the copy read-only.
    pub fn provision(
        base: &Path,
        files: &[(PathBuf, bool)],
    ) -> Result<WorkingDirectory, GraderError> {
        let dir = Self::create(base).map_err(GraderError::Provisioning)?;
        // The directory exists from here on; `?` drops `dir` and cleans up.
        for (source, read_only) in files {
            dir.stage_file(source, *read_only)
                .map_err(GraderError::Provisioning)?;
        }
        debug!(path = %dir.path.display(), files = files.len(), "Provisioned working directory");
        Ok(dir)
    }

    fn create(base: &Path) -> anyhow::Result<WorkingDirectory> {
        fs::create_dir_all(base)
            .with_context(|| format!("failed to create base directory {}", base.display()))?;
        let path = base.join(format!("run-{}", Uuid::new_v4()));
        fs::create_dir(&path)
            .with_context(|| format!("failed to create run directory {}", path.display()))?;
        Ok(WorkingDirectory { path, released: false })
    }

    fn stage_file(&self, source: &Path, read_only: bool) -> anyhow::Result<()> {
        let name = source
            .file_name()
            .with_context(|| format!("support file {} has no basename", source.display()))?;
        let target = self.path.join(name);
        fs::copy(source, &target)
            .with_context(|| format!("failed to stage support file {}", source.display()))?;
        if read_only {
            let mut perms = fs::metadata(&target)?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(&target, perms)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the directory. Removal failures are logged, not
    /// propagated: by this point the verdict is already decided.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Staged files may have been marked read-only; lift that first so
        // removal succeeds on platforms where it matters.
        if let Ok(entries) = fs::read_dir(&self.path) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    let mut perms = metadata.permissions();
                    if perms.readonly() {
                        #[allow(clippy::permissions_set_readonly_false)]
                        perms.set_readonly(false);
                        let _ = fs::set_permissions(entry.path(), perms);
                    }
                }
            }
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released working directory"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove working directory"),
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn support_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn provision_stages_files_under_basename() {
        let base = tempfile::tempdir().unwrap();
        let src = support_file(base.path(), "test.txt", "2");

        let dir = WorkingDirectory::provision(base.path(), &[(src, false)]).unwrap();

        let staged = dir.path().join("test.txt");
        assert_eq!(fs::read_to_string(&staged).unwrap(), "2");
        dir.release();
    }

    #[test]
    fn read_only_flag_is_honored() {
        let base = tempfile::tempdir().unwrap();
        let src = support_file(base.path(), "data.txt", "immutable");

        let dir = WorkingDirectory::provision(base.path(), &[(src, true)]).unwrap();

        let staged = dir.path().join("data.txt");
        assert!(fs::metadata(&staged).unwrap().permissions().readonly());
        dir.release();
    }

    #[test]
    fn unreadable_source_is_a_provisioning_error() {
        let base = tempfile::tempdir().unwrap();
        let missing = base.path().join("does-not-exist.txt");

        let err = WorkingDirectory::provision(base.path(), &[(missing, false)]).unwrap_err();

        assert!(matches!(err, GraderError::Provisioning(_)));
        // The partially staged run directory must not leak.
        let leftovers: Vec<_> = fs::read_dir(base.path()).unwrap().collect();
        assert!(leftovers.iter().all(|e| {
            !e.as_ref().unwrap().file_name().to_string_lossy().starts_with("run-")
        }));
    }

    #[test]
    fn release_removes_the_directory() {
        let base = tempfile::tempdir().unwrap();
        let dir = WorkingDirectory::provision(base.path(), &[]).unwrap();
        let path = dir.path().to_path_buf();

        assert!(path.is_dir());
        dir.release();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_the_directory() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let dir = WorkingDirectory::provision(base.path(), &[]).unwrap();
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_runs_get_distinct_directories() {
        let base = tempfile::tempdir().unwrap();
        let a = WorkingDirectory::provision(base.path(), &[]).unwrap();
        let b = WorkingDirectory::provision(base.path(), &[]).unwrap();

        assert_ne!(a.path(), b.path());
        a.release();
        assert!(b.path().is_dir());
        b.release();
    }

    #[test]
    fn release_lifts_read_only_before_removal() {
        let base = tempfile::tempdir().unwrap();
        let src = support_file(base.path(), "locked.txt", "x");
        let dir = WorkingDirectory::provision(base.path(), &[(src, true)]).unwrap();
        let path = dir.path().to_path_buf();

        dir.release();
        assert!(!path.exists());
    }
}
