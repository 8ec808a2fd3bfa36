//! Local filesystem side of transfers

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::filter::Filter;

/// A regular file found by [`scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Full path on disk
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated
    pub rel_path: String,
    pub size: u64,
    /// Epoch seconds
    pub mtime: i64,
}

impl LocalFile {
    fn from_metadata(path: PathBuf, rel_path: String, meta: &fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            path,
            rel_path,
            size: meta.len(),
            mtime,
        }
    }
}

/// Recursively collect the regular files under `root` that pass `filter`
///
/// A `root` naming a single file yields that file, with its file name as
/// the relative path. Symlinks are followed; entries below the root that
/// cannot be read (dangling links, link loops) are skipped with a warning.
/// Results are sorted by relative path.
pub async fn scan(root: impl Into<PathBuf>, filter: Filter) -> Result<Vec<LocalFile>> {
    let root = root.into();
    tokio::task::spawn_blocking(move || scan_blocking(&root, &filter))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

fn scan_blocking(root: &Path, filter: &Filter) -> Result<Vec<LocalFile>> {
    let meta = fs::metadata(root).map_err(|e| Error::local_fs(root, e))?;
    let mut files = Vec::new();

    if meta.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(LocalFile::from_metadata(root.to_path_buf(), name, &meta));
    } else {
        walk_dir(root, &mut files)?;
    }

    files.retain(|f| filter.matches_file(f));
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn walk_dir(root: &Path, files: &mut Vec<LocalFile>) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(Error::local_fs(path, e.into()));
            }
            Err(e) => {
                skip_entry(e.path().unwrap_or(root), &e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                skip_entry(entry.path(), &e);
                continue;
            }
        };

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(LocalFile::from_metadata(entry.into_path(), rel_path, &meta));
    }
    Ok(())
}

fn skip_entry(path: &Path, error: &walkdir::Error) {
    tracing::warn!(path = %path.display(), error = %error, "skipping unreadable entry");
}

/// Create the parent directory of `path` if needed
pub async fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::local_fs(parent, e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_scan_recursive_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.txt", b"bb");
        write(dir.path(), "a/x.json", b"{}");
        write(dir.path(), "a/deep/y.bin", b"12345");

        let files = scan(dir.path(), Filter::all()).await.unwrap();
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["a/deep/y.bin", "a/x.json", "b.txt"]);
        assert_eq!(files[0].size, 5);
        assert!(files[0].mtime > 0);
    }

    #[tokio::test]
    async fn test_scan_applies_filter() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.json", b"{}");
        write(dir.path(), "skip.txt", b"text");

        let filter = Filter::builder().filespec(r"\.json$").build().unwrap();
        let files = scan(dir.path(), filter).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "keep.json");
    }

    #[tokio::test]
    async fn test_scan_single_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "only.txt", b"x");
        let files = scan(dir.path().join("only.txt"), Filter::all()).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "only.txt");
    }

    #[tokio::test]
    async fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan(dir.path().join("nope"), Filter::all()).await.unwrap_err();
        assert!(matches!(err, Error::LocalFs { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_skips_broken_links() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"a");
        write(dir.path(), "sub/b.txt", b"b");
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("sub"), dir.path().join("sub/loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("alias.txt")).unwrap();

        let files = scan(dir.path(), Filter::all()).await.unwrap();
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["a.txt", "alias.txt", "sub/b.txt"]);
    }

    #[tokio::test]
    async fn test_ensure_parent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x/y/z.txt");
        ensure_parent(&target).await.unwrap();
        assert!(dir.path().join("x/y").is_dir());
    }
}
