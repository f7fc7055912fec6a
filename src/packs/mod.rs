//! Pack discovery (C4).
//!
//! A pack is a directory immediately under the source root. Discovery never
//! touches the operating system filesystem directly — it walks through a
//! `&dyn FileSystem` so the same logic runs against the real tree and
//! against [`crate::fs::MemoryFileSystem`] in tests.

use std::path::PathBuf;

use crate::core::config::Config;
use crate::core::errors::{DotkError, Result};
use crate::fs::{EntryKind, FileSystem};

/// The ignore-marker filename: a pack directory containing this file is
/// skipped entirely by discovery.
pub const IGNORE_MARKER: &str = ".dodotignore";

/// Candidate pack-config filenames, checked in order.
pub const PACK_CONFIG_CANDIDATES: &[&str] = &["dotkeeper.toml", ".dotkeeper.toml"];

/// A directory under the source root, with its own optional config.
#[derive(Debug, Clone)]
pub struct Pack {
    pub name: String,
    pub path: PathBuf,
    pub config: Option<Config>,
}

impl Pack {
    /// Path to this pack's config file, if it provided one.
    #[must_use]
    pub fn config_path(&self, fsys: &dyn FileSystem) -> Option<PathBuf> {
        PACK_CONFIG_CANDIDATES
            .iter()
            .map(|name| self.path.join(name))
            .find(|candidate| fsys.exists(candidate))
    }
}

fn is_ignored(fsys: &dyn FileSystem, dir: &std::path::Path) -> bool {
    fsys.exists(&dir.join(IGNORE_MARKER))
}

/// List every pack under `source_root`, sorted by name, optionally filtered
/// to `requested_names`. Hidden directories (name starting with `.`),
/// non-directory entries, and ignored packs are excluded.
pub fn discover(
    fsys: &dyn FileSystem,
    source_root: &std::path::Path,
    requested_names: &[String],
) -> Result<Vec<Pack>> {
    let entries = fsys
        .walk(source_root)
        .map_err(|source| DotkError::io(source_root, source))?;

    let mut packs: Vec<Pack> = entries
        .into_iter()
        .filter(|entry| entry.kind == EntryKind::Dir)
        .filter(|entry| entry.relative.components().count() == 1)
        .filter_map(|entry| {
            let name = entry.relative.to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            if is_ignored(fsys, &entry.absolute) {
                return None;
            }
            let config = Config::load_first_match(fsys, &entry.absolute, PACK_CONFIG_CANDIDATES)
                .ok()
                .flatten();
            Some(Pack {
                name,
                path: entry.absolute,
                config,
            })
        })
        .collect();

    packs.sort_by(|a, b| a.name.cmp(&b.name));

    if requested_names.is_empty() {
        return Ok(packs);
    }

    let available: Vec<String> = packs.iter().map(|p| p.name.clone()).collect();
    let missing: Vec<String> = requested_names
        .iter()
        .filter(|name| !available.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(DotkError::PackNotFound {
            requested: missing,
            available,
        });
    }

    packs.retain(|pack| requested_names.contains(&pack.name));
    Ok(packs)
}
