//! Drop / processed / error directory handling
//!
//! Files are moved, never rewritten. A name already taken at the destination
//! gets the current timestamp appended to its stem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileMoveError {
    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid file name '{0}'")]
    InvalidName(String),
}

/// The three directories an export passes through
#[derive(Debug, Clone)]
pub struct FileLifecycle {
    drop_dir: PathBuf,
    processed_dir: PathBuf,
    error_dir: PathBuf,
}

impl FileLifecycle {
    pub fn new(
        drop_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            drop_dir: drop_dir.into(),
            processed_dir: processed_dir.into(),
            error_dir: error_dir.into(),
        }
    }

    pub fn drop_dir(&self) -> &Path {
        &self.drop_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn error_dir(&self) -> &Path {
        &self.error_dir
    }

    /// Resolve a bare file name inside the drop directory.
    ///
    /// Anything with a path component (`../x.csv`, `a/b.csv`) is refused.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, FileMoveError> {
        let name = Path::new(file_name);
        match name.file_name() {
            Some(base) if base == name.as_os_str() && !file_name.is_empty() => {
                Ok(self.drop_dir.join(name))
            }
            _ => Err(FileMoveError::InvalidName(file_name.to_string())),
        }
    }

    /// `*.csv` files waiting in the drop directory, sorted by name
    pub fn pending(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.drop_dir.exists() {
            return Ok(files);
        }

        for entry in fs::read_dir(&self.drop_dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if path.is_file() && is_csv {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn mark_processed(&self, path: &Path) -> Result<PathBuf, FileMoveError> {
        move_file(path, &self.processed_dir)
    }

    pub fn mark_failed(&self, path: &Path) -> Result<PathBuf, FileMoveError> {
        move_file(path, &self.error_dir)
    }
}

/// Move `path` into `dest_dir`, creating the directory if needed.
///
/// Returns the final location.
pub fn move_file(path: &Path, dest_dir: &Path) -> Result<PathBuf, FileMoveError> {
    if !path.is_file() {
        return Err(FileMoveError::SourceMissing(path.to_path_buf()));
    }

    fs::create_dir_all(dest_dir).map_err(|source| FileMoveError::CreateDir {
        path: dest_dir.to_path_buf(),
        source,
    })?;

    let target = free_destination(path, dest_dir);

    fs::rename(path, &target)
        .or_else(|_| {
            // cross-device: copy + delete
            fs::copy(path, &target).and_then(|_| fs::remove_file(path))
        })
        .map_err(|source| FileMoveError::Move {
            from: path.to_path_buf(),
            to: target.clone(),
            source,
        })?;

    tracing::info!("Moved {} -> {}", path.display(), target.display());
    Ok(target)
}

fn free_destination(path: &Path, dest_dir: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    let direct = dest_dir.join(&file_name);
    if !direct.exists() {
        return direct;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let ext = path
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");

    let stamped = dest_dir.join(format!("{}_{}{}", stem, stamp, ext));
    if !stamped.exists() {
        return stamped;
    }

    // same millisecond
    (1..)
        .map(|n| dest_dir.join(format!("{}_{}_{}{}", stem, stamp, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(stamped)
}
