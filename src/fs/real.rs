//! `std::fs`-backed implementation of [`super::FileSystem`].

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use super::{EntryKind, FileSystem, Metadata, WalkEntry};

/// Talks to the real operating-system filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl RealFileSystem {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn to_metadata(meta: &fs::Metadata) -> Metadata {
    let kind = if meta.file_type().is_symlink() {
        EntryKind::Symlink
    } else if meta.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    Metadata {
        kind,
        len: meta.len(),
    }
}

impl FileSystem for RealFileSystem {
    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        fs::metadata(path).map(|m| to_metadata(&m))
    }

    fn lstat(&self, path: &Path) -> io::Result<Metadata> {
        fs::symlink_metadata(path).map(|m| to_metadata(&m))
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        fs::write(path, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
        }
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::create_dir_all(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(original, link)
        }
        #[cfg(not(unix))]
        {
            let _ = (original, link);
            Err(io::Error::other("symlinks are not supported on this platform"))
        }
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<WalkEntry>> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            for entry in entries {
                let entry = entry?;
                let absolute = entry.path();
                let meta = fs::symlink_metadata(&absolute)?;
                let kind = if meta.file_type().is_symlink() {
                    EntryKind::Symlink
                } else if meta.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                };
                let relative = absolute
                    .strip_prefix(root)
                    .unwrap_or(&absolute)
                    .to_path_buf();
                if kind == EntryKind::Dir {
                    stack.push(absolute.clone());
                }
                out.push(WalkEntry {
                    absolute,
                    relative,
                    kind,
                });
            }
        }
        out.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let fsys = RealFileSystem::new();
        let path = dir.path().join("a.txt");
        fsys.write_file(&path, b"hello", 0o644).unwrap();
        assert_eq!(fsys.read_file(&path).unwrap(), b"hello");
        assert!(fsys.stat(&path).unwrap().is_file());
    }

    #[test]
    fn symlink_lstat_vs_stat() {
        let dir = tempdir().unwrap();
        let fsys = RealFileSystem::new();
        let target = dir.path().join("target.txt");
        fsys.write_file(&target, b"x", 0o644).unwrap();
        let link = dir.path().join("link");
        fsys.symlink(&target, &link).unwrap();
        assert!(fsys.lstat(&link).unwrap().is_symlink());
        assert!(fsys.stat(&link).unwrap().is_file());
        assert_eq!(fsys.readlink(&link).unwrap(), target);
    }

    #[test]
    fn walk_lists_nested_entries_sorted() {
        let dir = tempdir().unwrap();
        let fsys = RealFileSystem::new();
        fsys.mkdir_all(&dir.path().join("b/sub"), 0o755).unwrap();
        fsys.write_file(&dir.path().join("a.txt"), b"1", 0o644).unwrap();
        fsys.write_file(&dir.path().join("b/sub/c.txt"), b"2", 0o644).unwrap();
        let entries = fsys.walk(dir.path()).unwrap();
        let relatives: Vec<_> = entries.iter().map(|e| e.relative.clone()).collect();
        assert!(relatives.contains(&PathBuf::from("a.txt")));
        assert!(relatives.contains(&PathBuf::from("b")));
        assert!(relatives.contains(&PathBuf::from("b/sub/c.txt")));
    }

    #[test]
    fn remove_all_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let fsys = RealFileSystem::new();
        fsys.remove_all(&dir.path().join("missing")).unwrap();
    }
}
