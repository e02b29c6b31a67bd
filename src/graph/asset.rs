//! Handler code assets
//!
//! A compute unit's code is a directory (or single file) on disk. The content
//! is fingerprinted with SHA-256 so the rendered template references a
//! deterministic object key, which only changes when the code does.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Located and fingerprinted handler code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCode {
    /// Directory or file the code was read from
    pub path: PathBuf,
    /// Lowercase hex SHA-256 over relative paths and file contents
    pub hash: String,
}

impl HandlerCode {
    /// Locate the asset at `path` and compute its content hash
    pub fn from_asset(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }

        let mut files = Vec::new();
        if path.is_dir() {
            collect_files(path, path, &mut files)?;
        } else {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push((name, path.to_path_buf()));
        }

        if files.is_empty() {
            return Err(AssetError::Empty(path.to_path_buf()));
        }

        // Directory iteration order is platform dependent
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        for (relative, full) in &files {
            let data = fs::read(full).map_err(|source| AssetError::Io {
                path: full.clone(),
                source,
            })?;
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update((data.len() as u64).to_le_bytes());
            hasher.update(&data);
        }

        let hash = hex::encode(hasher.finalize());
        tracing::debug!(path = %path.display(), files = files.len(), %hash, "Hashed handler asset");

        Ok(Self {
            path: path.to_path_buf(),
            hash,
        })
    }

    /// Object key the packaged asset is uploaded under
    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), AssetError> {
    let entries = fs::read_dir(dir).map_err(|source| AssetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| AssetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((relative, path));
        }
    }

    Ok(())
}

/// Asset errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Handler asset not found: {0}")]
    NotFound(PathBuf),

    #[error("Handler asset is empty: {0}")]
    Empty(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
