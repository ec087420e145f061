//! Source files a note is generated from.
//!
//! The pipeline consumes a flat `filename → content` mapping. Filenames are
//! base names only, because the model cites them verbatim in `[cite:…]` tokens.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Filename → file content, ordered by filename.
pub type SourceFiles = BTreeMap<String, String>;

/// Errors from loading source files.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("Cannot read source directory {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Anything that can produce the source mapping for a generation.
pub trait SourceProvider: Send + Sync {
    fn load(&self) -> Result<SourceFiles, SourceError>;
}

/// Reads every regular file directly inside one directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SourceProvider for DirectorySource {
    fn load(&self) -> Result<SourceFiles, SourceError> {
        read_source_files(&self.dir)
    }
}

/// Fixed in-memory mapping. Handy for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSources(pub SourceFiles);

impl SourceProvider for StaticSources {
    fn load(&self) -> Result<SourceFiles, SourceError> {
        Ok(self.0.clone())
    }
}

/// Read all regular files in `dir` (non-recursive).
///
/// A file that cannot be read as UTF-8 text is kept with empty content so the
/// model still sees its name; only a missing or unlistable directory fails.
pub fn read_source_files(dir: &Path) -> Result<SourceFiles, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| SourceError::Unreadable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut files = SourceFiles::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Cannot read source file, using empty content");
                String::new()
            }
        };
        files.insert(name.to_string(), content);
    }

    tracing::info!(dir = %dir.display(), count = files.len(), "Source files loaded");
    Ok(files)
}
