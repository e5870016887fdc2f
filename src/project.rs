//! Project file bookkeeping.
//!
//! Supplies the stable integer-keyed file index the refactoring loop walks,
//! reconciles single-file renames performed by external tooling, and owns the
//! atomic write primitive every on-disk rewrite goes through.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("unknown file index {index}")]
    UnknownIndex { index: usize },

    #[error("multiple files went missing; cannot reconcile a single rename")]
    MultipleMissing,

    #[error("a file went missing but no replacement appeared")]
    NoReplacement,

    #[error("path is outside the project root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable integer-indexed map of the project's Java files.
///
/// Indices survive renames: when exactly one tracked file disappears and
/// exactly one untracked file appears, [`ProjectFiles::update`] rebinds the
/// missing index to the new path.
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: PathBuf,
    files: BTreeMap<usize, PathBuf>,
}

impl ProjectFiles {
    /// Discover every `.java` file under `root`, in deterministic path
    /// order.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().canonicalize()?;
        let mut paths = discover_java_files(&root);
        paths.sort();
        let files = paths.into_iter().enumerate().collect();
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn path(&self, index: usize) -> Result<&Path, ProjectError> {
        self.files
            .get(&index)
            .map(PathBuf::as_path)
            .ok_or(ProjectError::UnknownIndex { index })
    }

    /// Snapshot of the current index-to-path mapping, for before/after
    /// session reporting.
    pub fn snapshot(&self) -> BTreeMap<usize, PathBuf> {
        self.files.clone()
    }

    /// Re-scan the file system and rebind the index of a renamed file.
    ///
    /// Returns the rebound `(index, new_path)` if a rename was detected, or
    /// `None` when nothing changed. More than one missing file cannot be
    /// reconciled and is an error.
    pub fn update(&mut self) -> Result<Option<(usize, PathBuf)>, ProjectError> {
        let current: std::collections::BTreeSet<PathBuf> =
            discover_java_files(&self.root).into_iter().collect();

        let mut missing = None;
        for (&index, path) in &self.files {
            if !current.contains(path) {
                if missing.is_some() {
                    return Err(ProjectError::MultipleMissing);
                }
                missing = Some(index);
            }
        }
        let Some(missing) = missing else {
            return Ok(None);
        };

        let tracked: std::collections::BTreeSet<&PathBuf> = self.files.values().collect();
        let replacement = current
            .iter()
            .find(|path| !tracked.contains(path))
            .cloned()
            .ok_or(ProjectError::NoReplacement)?;

        tracing::info!(
            index = missing,
            path = %replacement.display(),
            "file index rebound after rename"
        );
        self.files.insert(missing, replacement.clone());
        Ok(Some((missing, replacement)))
    }

    /// Reject paths that resolve outside the project root.
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf, ProjectError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let canonical = absolute.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(ProjectError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }
        Ok(canonical)
    }
}

fn discover_java_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("java")
        })
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

/// Atomic file rewrite: tempfile in the target's directory, fsync, rename.
///
/// Either the full new content lands or the old file is untouched; a crash
/// mid-write can never leave a partially-markered file behind. The mtime bump
/// keeps an IDE watching the tree reloading from disk.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), ProjectError> {
    let parent = path.parent().ok_or_else(|| {
        ProjectError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    filetime::set_file_mtime(path, filetime::FileTime::now())?;
    Ok(())
}

/// Load naming-convention standards from a text file, one per line. Lines
/// starting with `#` are comments.
pub fn load_standards(path: impl AsRef<Path>) -> Result<Vec<String>, ProjectError> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"class A {}\n").unwrap();
    }

    #[test]
    fn discovery_indexes_java_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/First.java"));
        touch(&dir.path().join("b/Second.java"));
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let files = ProjectFiles::discover(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.path(0).unwrap().ends_with("a/First.java"));
        assert!(files.path(1).unwrap().ends_with("b/Second.java"));
        assert!(matches!(
            files.path(7),
            Err(ProjectError::UnknownIndex { index: 7 })
        ));
    }

    #[test]
    fn update_rebinds_a_single_rename() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("src/Old.java");
        touch(&old);
        touch(&dir.path().join("src/Keep.java"));

        let mut files = ProjectFiles::discover(dir.path()).unwrap();
        let keep_index = (0..files.len())
            .find(|&i| files.path(i).unwrap().ends_with("Keep.java"))
            .unwrap();
        let old_index = 1 - keep_index;

        let new = dir.path().join("src/New.java");
        fs::rename(&old, &new).unwrap();

        let rebound = files.update().unwrap().unwrap();
        assert_eq!(rebound.0, old_index);
        assert!(files.path(old_index).unwrap().ends_with("New.java"));
        assert!(files.path(keep_index).unwrap().ends_with("Keep.java"));

        // A second update sees a stable file system.
        assert!(files.update().unwrap().is_none());
    }

    #[test]
    fn validate_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        touch(&root.join("A.java"));
        let outside = dir.path().join("Outside.java");
        touch(&outside);

        let files = ProjectFiles::discover(&root).unwrap();
        assert!(files.validate(root.join("A.java")).is_ok());
        assert!(matches!(
            files.validate(&outside),
            Err(ProjectError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.java");
        fs::write(&path, b"old").unwrap();
        atomic_write(&path, "new content").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new content");
    }

    #[test]
    fn standards_skip_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standards.txt");
        fs::write(&path, "# heading\nUse camelCase\n\nAvoid abbreviations\n").unwrap();
        let standards = load_standards(&path).unwrap();
        assert_eq!(standards, vec!["Use camelCase", "Avoid abbreviations"]);
    }
}
