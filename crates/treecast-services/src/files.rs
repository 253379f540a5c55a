//! The shared file tree: path resolution, request checks, and search.
//!
//! Every remote path is interpreted relative to the configured root. A path
//! that contains `..` anywhere is refused outright.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use treecast_core::wire::SearchType;

/// Why a file request was refused.
#[derive(Debug, thiserror::Error)]
pub enum Denied {
    #[error("path escapes the shared root: {0}")]
    Traversal(String),
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("not a regular file: {0}")]
    NotAFile(String),
    #[error("file is read-only: {0}")]
    ReadOnly(String),
    #[error("cannot create {0}: expected name.ext in an existing directory")]
    BadName(String),
    #[error("filesystem error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io(path: &str) -> impl FnOnce(std::io::Error) -> Denied + '_ {
    move |source| Denied::Io {
        path: path.to_string(),
        source,
    }
}

/// Map a remote path onto the local tree.
pub fn resolve(root: &Path, path: &str) -> Result<PathBuf, Denied> {
    if path.contains("..") {
        return Err(Denied::Traversal(path.to_string()));
    }
    Ok(root.join(path.trim_start_matches('/')))
}

/// A path that may be served to a downloader.
pub fn check_download(root: &Path, path: &str) -> Result<PathBuf, Denied> {
    regular_file(root, path)
}

/// A path whose file may be deleted.
pub fn check_delete(root: &Path, path: &str) -> Result<PathBuf, Denied> {
    regular_file(root, path)
}

/// Remove a file after `check_delete` accepted it.
pub fn delete(root: &Path, path: &str) -> Result<(), Denied> {
    let local = check_delete(root, path)?;
    fs::remove_file(&local).map_err(io(path))
}

fn regular_file(root: &Path, path: &str) -> Result<PathBuf, Denied> {
    let local = resolve(root, path)?;
    let meta = fs::metadata(&local).map_err(|_| Denied::NotFound(path.to_string()))?;
    if !meta.is_file() {
        return Err(Denied::NotAFile(path.to_string()));
    }
    Ok(local)
}

/// Decide whether an upload to `path` is acceptable, creating the file if
/// it does not exist yet.
///
/// An existing regular file is accepted if writable. A new file needs an
/// existing parent directory and a name of the form `stem.ext`, both parts
/// non-empty.
pub fn prepare_upload(root: &Path, path: &str) -> Result<PathBuf, Denied> {
    let local = resolve(root, path)?;

    match fs::metadata(&local) {
        Ok(meta) if !meta.is_file() => Err(Denied::NotAFile(path.to_string())),
        // Effective access of the daemon's user, not just the mode bits.
        Ok(_) if access(&local, AccessFlags::W_OK).is_err() => {
            Err(Denied::ReadOnly(path.to_string()))
        }
        Ok(_) => Ok(local),
        Err(_) => {
            if path.ends_with('/') || !is_plain_file_name(&local) {
                return Err(Denied::BadName(path.to_string()));
            }
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&local)
                .map_err(io(path))?;
            Ok(local)
        }
    }
}

fn is_plain_file_name(local: &Path) -> bool {
    let Some(name) = local.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 2 && parts.iter().all(|p| !p.is_empty())
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Run a search over the tree. Returns root-relative paths starting with `/`.
pub fn search(root: &Path, search_type: SearchType, query: &str) -> Vec<String> {
    match search_type {
        SearchType::Path => path_search(root, query).into_iter().collect(),
        SearchType::Filename => {
            let mut results = Vec::new();
            walk(root, root, &mut results, &|name| name == query);
            results
        }
        SearchType::Substring => {
            let mut results = Vec::new();
            walk(root, root, &mut results, &|name| name.contains(query));
            results
        }
    }
}

/// The query names one path. Directories come back with a trailing `/`.
fn path_search(root: &Path, query: &str) -> Option<String> {
    let local = resolve(root, query).ok()?;
    let meta = fs::metadata(&local).ok()?;
    let mut relative = relative_to(root, &local)?;
    if meta.is_dir() && !relative.ends_with('/') {
        relative.push('/');
    }
    Some(relative)
}

/// Depth-first, entries visited in name order. Symlinked directories are
/// not descended into.
fn walk(root: &Path, dir: &Path, results: &mut Vec<String>, matches: &dyn Fn(&str) -> bool) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            walk(root, &path, results, matches);
        }
        let name = entry.file_name();
        if matches(&name.to_string_lossy()) {
            if let Some(relative) = relative_to(root, &path) {
                results.push(relative);
            }
        }
    }
}

fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(format!("/{}", parts.join("/")))
}
