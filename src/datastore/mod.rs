//! The DataStore (C3): the only component that mutates the data directory.
//!
//! Five primitives — [`DataStore::create_data_link`],
//! [`DataStore::create_user_link`], [`DataStore::run_and_record`],
//! [`DataStore::has_sentinel`], [`DataStore::remove_state`] — plus
//! non-mutating introspection. Every method takes the same `&dyn
//! FileSystem` the rest of the crate uses, so a full provisioning run can
//! be exercised against an in-memory tree.
//!
//! `create_user_link` records every `(pack, handler, link_relpath) ->
//! user_path` pair it creates under `<data>/packs/<pack>/<handler>/links/`,
//! so `remove_state` can look the manifest up and remove the user-visible
//! symlinks before dropping the handler subtree they point into.

pub mod command;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::errors::{DotkError, Result};
use crate::fs::{EntryKind, FileSystem};

pub use command::{CommandOutcome, CommandRunner, RealCommandRunner};

/// Owns the `<data>/packs/...` and `<data>/backups/...` subtrees.
pub struct DataStore<'a> {
    fsys: &'a dyn FileSystem,
    data_dir: PathBuf,
}

impl<'a> DataStore<'a> {
    #[must_use]
    pub fn new(fsys: &'a dyn FileSystem, data_dir: PathBuf) -> Self {
        Self { fsys, data_dir }
    }

    fn handler_dir(&self, pack: &str, handler: &str) -> PathBuf {
        self.data_dir.join("packs").join(pack).join(handler)
    }

    fn sentinels_dir(&self, pack: &str, handler: &str) -> PathBuf {
        self.handler_dir(pack, handler).join("sentinels")
    }

    fn links_dir(&self, pack: &str, handler: &str) -> PathBuf {
        self.handler_dir(pack, handler).join("links")
    }

    /// Manifest path recording the user-visible path a given data link was
    /// placed at, so it can be found again from `pack`/`handler` alone.
    fn link_manifest_path(&self, pack: &str, handler: &str, link_relpath: &Path) -> PathBuf {
        self.links_dir(pack, handler).join(link_relpath)
    }

    /// Datastore-internal path for a file tracked at `link_relpath` within
    /// `pack`/`handler`.
    #[must_use]
    pub fn data_link_path(&self, pack: &str, handler: &str, link_relpath: &Path) -> PathBuf {
        self.handler_dir(pack, handler).join(link_relpath)
    }

    /// Primitive 1: symlink `source` into the data directory. Idempotent
    /// when the link already points at `source`; a conflicting existing
    /// link is an error.
    pub fn create_data_link(
        &self,
        pack: &str,
        handler: &str,
        link_relpath: &Path,
        source: &Path,
    ) -> Result<PathBuf> {
        let link_path = self.data_link_path(pack, handler, link_relpath);
        if let Some(parent) = link_path.parent() {
            self.fsys
                .mkdir_all(parent, 0o755)
                .map_err(|err| DotkError::io(parent, err))?;
        }
        match self.fsys.lstat(&link_path) {
            Ok(meta) if meta.is_symlink() => {
                let existing = self
                    .fsys
                    .readlink(&link_path)
                    .map_err(|err| DotkError::io(&link_path, err))?;
                if existing == source {
                    return Ok(link_path);
                }
                Err(DotkError::FilesystemConflict {
                    path: link_path,
                    details: format!(
                        "data link already points at {} (requested {})",
                        existing.display(),
                        source.display()
                    ),
                })
            }
            Ok(_) => Err(DotkError::FilesystemConflict {
                path: link_path,
                details: "non-symlink entry occupies this data-link slot".to_string(),
            }),
            Err(_) => {
                self.fsys
                    .symlink(source, &link_path)
                    .map_err(|err| DotkError::io(&link_path, err))?;
                Ok(link_path)
            }
        }
    }

    /// Primitive 2: point `user_path` at the data-link for
    /// `pack`/`handler`/`link_relpath`. Refuses to clobber a foreign file
    /// unless `allow_overwrite`, in which case the original is backed up
    /// under `<data>/backups/<unix-timestamp>/<basename>`.
    pub fn create_user_link(
        &self,
        pack: &str,
        handler: &str,
        link_relpath: &Path,
        user_path: &Path,
        allow_overwrite: bool,
    ) -> Result<()> {
        let data_link_path = self.data_link_path(pack, handler, link_relpath);
        if let Some(parent) = user_path.parent() {
            self.fsys
                .mkdir_all(parent, 0o755)
                .map_err(|err| DotkError::io(parent, err))?;
        }

        match self.fsys.lstat(user_path) {
            Err(_) => {}
            Ok(meta) if meta.is_symlink() => {
                let existing = self
                    .fsys
                    .readlink(user_path)
                    .map_err(|err| DotkError::io(user_path, err))?;
                if existing.starts_with(&self.data_dir) {
                    self.fsys
                        .remove(user_path)
                        .map_err(|err| DotkError::io(user_path, err))?;
                } else if allow_overwrite {
                    self.backup(user_path)?;
                } else {
                    return Err(DotkError::FilesystemConflict {
                        path: user_path.to_path_buf(),
                        details: format!(
                            "existing symlink points outside the data directory at {}",
                            existing.display()
                        ),
                    });
                }
            }
            Ok(_) if allow_overwrite => self.backup(user_path)?,
            Ok(_) => {
                return Err(DotkError::FilesystemConflict {
                    path: user_path.to_path_buf(),
                    details: "refusing to replace a regular file without force".to_string(),
                })
            }
        }

        self.fsys
            .symlink(&data_link_path, user_path)
            .map_err(|err| DotkError::io(user_path, err))?;

        let manifest_path = self.link_manifest_path(pack, handler, link_relpath);
        if let Some(parent) = manifest_path.parent() {
            self.fsys
                .mkdir_all(parent, 0o755)
                .map_err(|err| DotkError::io(parent, err))?;
        }
        self.fsys
            .write_file(&manifest_path, user_path.to_string_lossy().as_bytes(), 0o644)
            .map_err(|err| DotkError::io(&manifest_path, err))
    }

    fn backup(&self, path: &Path) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let basename = path
            .file_name()
            .ok_or_else(|| DotkError::InvalidInput {
                details: format!("{} has no file name component", path.display()),
            })?;
        let backup_dir = self.data_dir.join("backups").join(timestamp.to_string());
        self.fsys
            .mkdir_all(&backup_dir, 0o755)
            .map_err(|err| DotkError::io(&backup_dir, err))?;
        let backup_path = backup_dir.join(basename);
        let contents = self
            .fsys
            .read_file(path)
            .map_err(|err| DotkError::io(path, err))?;
        self.fsys
            .write_file(&backup_path, &contents, 0o644)
            .map_err(|err| DotkError::io(&backup_path, err))?;
        self.fsys
            .remove(path)
            .map_err(|err| DotkError::io(path, err))
    }

    /// Primitive 3: run `command` unless `sentinel` is already recorded (or
    /// `force_rerun` bypasses that short-circuit), recording it on success.
    pub fn run_and_record(
        &self,
        pack: &str,
        handler: &str,
        command: &str,
        sentinel: &str,
        cwd: &Path,
        force_rerun: bool,
        runner: &dyn CommandRunner,
    ) -> Result<CommandOutcome> {
        if !force_rerun && self.has_sentinel(pack, handler, sentinel) {
            return Ok(CommandOutcome {
                status: Some(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }
        let outcome = runner
            .run(command, cwd)
            .map_err(|err| DotkError::io(cwd, err))?;
        if outcome.status != Some(0) {
            return Err(DotkError::CommandFailed {
                command: command.to_string(),
                status: outcome.status,
            });
        }
        let sentinels_dir = self.sentinels_dir(pack, handler);
        self.fsys
            .mkdir_all(&sentinels_dir, 0o755)
            .map_err(|err| DotkError::io(&sentinels_dir, err))?;
        self.fsys
            .write_file(&sentinels_dir.join(sentinel), b"", 0o644)
            .map_err(|err| DotkError::io(&sentinels_dir, err))?;
        Ok(outcome)
    }

    /// Primitive 4.
    #[must_use]
    pub fn has_sentinel(&self, pack: &str, handler: &str, sentinel: &str) -> bool {
        self.fsys.exists(&self.sentinels_dir(pack, handler).join(sentinel))
    }

    /// Primitive 5: remove every user-visible symlink this `pack`/`handler`
    /// recorded (skipping any a user has since repointed elsewhere), then
    /// drop the whole subtree.
    pub fn remove_state(&self, pack: &str, handler: &str) -> Result<()> {
        for user_path in self.list_user_links(pack, handler) {
            if let Ok(meta) = self.fsys.lstat(&user_path) {
                if meta.is_symlink() {
                    if let Ok(target) = self.fsys.readlink(&user_path) {
                        if target.starts_with(&self.data_dir) {
                            let _ = self.fsys.remove(&user_path);
                        }
                    }
                }
            }
        }
        let dir = self.handler_dir(pack, handler);
        self.fsys.remove_all(&dir).map_err(|err| DotkError::io(&dir, err))
    }

    /// The user-visible paths recorded by `create_user_link` for this
    /// `pack`/`handler`, read back from the link manifest.
    #[must_use]
    pub fn list_user_links(&self, pack: &str, handler: &str) -> Vec<PathBuf> {
        let Ok(entries) = self.fsys.walk(&self.links_dir(pack, handler)) else {
            return Vec::new();
        };
        entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .filter_map(|e| self.fsys.read_file(&e.absolute).ok())
            .map(|contents| PathBuf::from(String::from_utf8_lossy(&contents).into_owned()))
            .collect()
    }

    #[must_use]
    pub fn has_data_link(&self, pack: &str, handler: &str, link_relpath: &Path) -> bool {
        self.fsys.exists(&self.data_link_path(pack, handler, link_relpath))
    }

    #[must_use]
    pub fn list_pack_handlers(&self, pack: &str) -> Vec<String> {
        let pack_dir = self.data_dir.join("packs").join(pack);
        let Ok(entries) = self.fsys.walk(&pack_dir) else {
            return Vec::new();
        };
        let mut handlers: Vec<String> = entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Dir && e.relative.components().count() == 1)
            .map(|e| e.relative.to_string_lossy().into_owned())
            .collect();
        handlers.sort();
        handlers.dedup();
        handlers
    }

    #[must_use]
    pub fn list_handler_sentinels(&self, pack: &str, handler: &str) -> Vec<String> {
        let Ok(entries) = self.fsys.walk(&self.sentinels_dir(pack, handler)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.relative.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
