use crate::Result;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub const DEFAULT_EXTENSION: &str = "tif";

/// Recursively enumerates files under a root that carry one extension.
///
/// Traversal order is sorted by file name at every level, so two runs over
/// the same tree visit files in the same order. The extension match ignores
/// ASCII case and a leading dot.
#[derive(Debug, Clone)]
pub struct FileExplorer {
    root: PathBuf,
    extension: String,
}

impl FileExplorer {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns every matching file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`](crate::Error::Discovery) if the root or
    /// any directory below it cannot be read.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        self.explore(Path::to_path_buf)
    }

    /// Calls `visit` on each matching file and collects the results.
    ///
    /// # Errors
    ///
    /// Same as [`files`](Self::files). Nothing is returned on error, even
    /// for files visited before it.
    pub fn explore<T>(&self, mut visit: impl FnMut(&Path) -> T) -> Result<Vec<T>> {
        let mut visited = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && self.matches(entry.path()) {
                visited.push(visit(entry.path()));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            root = %self.root.display(),
            extension = %self.extension,
            count = visited.len(),
            "Discovered files"
        );

        Ok(visited)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}
