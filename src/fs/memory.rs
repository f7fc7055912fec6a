//! In-memory implementation of [`super::FileSystem`] for tests.
//!
//! Every component in this crate is generic over `&dyn FileSystem`, so
//! tests exercise the exact same config/pack/rule/datastore/handler logic
//! against this in-memory tree instead of touching the real disk.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use super::{EntryKind, FileSystem, Metadata, WalkEntry};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
    Symlink { target: PathBuf },
}

/// A `BTreeMap`-backed filesystem tree. Paths are stored and compared as
/// given; callers are expected to pass already-absolute paths (as every
/// real component does, via [`crate::core::paths::resolve_absolute_path`]).
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    nodes: RefCell<BTreeMap<PathBuf, Node>>,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("no such path: {}", path.display()))
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        let nodes = BTreeMap::from([(PathBuf::from("/"), Node::Dir { mode: 0o755 })]);
        Self {
            nodes: RefCell::new(nodes),
        }
    }

    fn require_parent(&self, path: &Path) -> io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        match self.nodes.borrow().get(parent) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(_) => Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("parent is not a directory: {}", parent.display()),
            )),
            None => Err(not_found(parent)),
        }
    }

    /// Test convenience: seed a file directly, creating ancestor directories.
    pub fn seed_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.seed_dir(parent);
        }
        self.nodes.borrow_mut().insert(
            path,
            Node::File {
                data: contents.into(),
                mode: 0o644,
            },
        );
    }

    /// Test convenience: seed a directory, creating ancestors.
    pub fn seed_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut ancestors: Vec<PathBuf> = path.ancestors().map(Path::to_path_buf).collect();
        ancestors.reverse();
        let mut nodes = self.nodes.borrow_mut();
        for ancestor in ancestors {
            nodes
                .entry(ancestor)
                .or_insert(Node::Dir { mode: 0o755 });
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let mut current = path.to_path_buf();
        for _ in 0..32 {
            let nodes = self.nodes.borrow();
            match nodes.get(&current) {
                Some(Node::File { data, .. }) => {
                    return Ok(Metadata {
                        kind: EntryKind::File,
                        len: data.len() as u64,
                    })
                }
                Some(Node::Dir { .. }) => {
                    return Ok(Metadata {
                        kind: EntryKind::Dir,
                        len: 0,
                    })
                }
                Some(Node::Symlink { target }) => {
                    let target = target.clone();
                    drop(nodes);
                    current = target;
                }
                None => return Err(not_found(&current)),
            }
        }
        Err(io::Error::new(ErrorKind::Other, "too many levels of symbolic links"))
    }

    fn lstat(&self, path: &Path) -> io::Result<Metadata> {
        let nodes = self.nodes.borrow();
        match nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(Metadata {
                kind: EntryKind::File,
                len: data.len() as u64,
            }),
            Some(Node::Dir { .. }) => Ok(Metadata {
                kind: EntryKind::Dir,
                len: 0,
            }),
            Some(Node::Symlink { .. }) => Ok(Metadata {
                kind: EntryKind::Symlink,
                len: 0,
            }),
            None => Err(not_found(path)),
        }
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        match self.nodes.borrow().get(path) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(ErrorKind::InvalidInput, "not a symlink")),
            None => Err(not_found(path)),
        }
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.nodes.borrow().get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(_) => Err(io::Error::new(ErrorKind::InvalidInput, "not a file")),
            None => Err(not_found(path)),
        }
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        self.require_parent(path)?;
        if matches!(self.nodes.borrow().get(path), Some(Node::Dir { .. })) {
            return Err(io::Error::new(ErrorKind::InvalidInput, "is a directory"));
        }
        self.nodes.borrow_mut().insert(
            path.to_path_buf(),
            Node::File {
                data: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut ancestors: Vec<PathBuf> = path.ancestors().map(Path::to_path_buf).collect();
        ancestors.reverse();
        let mut nodes = self.nodes.borrow_mut();
        for ancestor in ancestors {
            match nodes.get(&ancestor) {
                Some(Node::Dir { .. }) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("{} exists and is not a directory", ancestor.display()),
                    ))
                }
                None => {
                    nodes.insert(ancestor, Node::Dir { mode });
                }
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => {
                let has_children = nodes.keys().any(|k| k != path && k.starts_with(path));
                if has_children {
                    return Err(io::Error::new(ErrorKind::Other, "directory not empty"));
                }
                nodes.remove(path);
                Ok(())
            }
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
            None => Err(not_found(path)),
        }
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.borrow_mut();
        let to_remove: Vec<PathBuf> = nodes
            .keys()
            .filter(|k| *k == path || k.starts_with(path))
            .cloned()
            .collect();
        for key in to_remove {
            nodes.remove(&key);
        }
        Ok(())
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.require_parent(link)?;
        self.nodes.borrow_mut().insert(
            link.to_path_buf(),
            Node::Symlink {
                target: original.to_path_buf(),
            },
        );
        Ok(())
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<WalkEntry>> {
        let nodes = self.nodes.borrow();
        let mut out = Vec::new();
        for (path, node) in nodes.iter() {
            if path == root || !path.starts_with(root) {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            let kind = match node {
                Node::File { .. } => EntryKind::File,
                Node::Dir { .. } => EntryKind::Dir,
                Node::Symlink { .. } => EntryKind::Symlink,
            };
            out.push(WalkEntry {
                absolute: path.clone(),
                relative,
                kind,
            });
        }
        out.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_and_read_file() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/home/user/.bashrc", "export FOO=1");
        assert_eq!(fsys.read_file(Path::new("/home/user/.bashrc")).unwrap(), b"export FOO=1");
    }

    #[test]
    fn seed_dir_creates_ancestors() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_dir("/a/b/c");
        assert!(fsys.stat(Path::new("/a/b/c")).unwrap().is_dir());
        assert!(fsys.stat(Path::new("/a/b")).unwrap().is_dir());
    }

    #[test]
    fn symlink_resolves_through_stat() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/data/real", "hi");
        fsys.symlink(Path::new("/data/real"), Path::new("/home/link")).unwrap();
        assert!(fsys.lstat(Path::new("/home/link")).unwrap().is_symlink());
        assert!(fsys.stat(Path::new("/home/link")).unwrap().is_file());
    }

    #[test]
    fn write_requires_existing_parent() {
        let fsys = MemoryFileSystem::new();
        let result = fsys.write_file(Path::new("/missing/file.txt"), b"x", 0o644);
        assert!(result.is_err());
    }

    #[test]
    fn remove_all_removes_subtree() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/a/b/c.txt", "x");
        fsys.seed_file("/a/b/d.txt", "y");
        fsys.remove_all(Path::new("/a/b")).unwrap();
        assert!(fsys.stat(Path::new("/a/b/c.txt")).is_err());
        assert!(fsys.stat(Path::new("/a")).is_ok());
    }

    #[test]
    fn walk_returns_sorted_relative_entries() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/root/z.txt", "1");
        fsys.seed_file("/root/a.txt", "2");
        fsys.seed_dir("/root/sub");
        let entries = fsys.walk(Path::new("/root")).unwrap();
        let relatives: Vec<_> = entries.iter().map(|e| e.relative.clone()).collect();
        assert_eq!(
            relatives,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("sub"),
                PathBuf::from("z.txt"),
            ]
        );
    }
}
