//! Source root and data directory resolution (C1).
//!
//! Resolution order for the source root: `DOTFILES_ROOT` env var, then the
//! nearest ancestor directory that looks like a git working tree, then the
//! current directory (flagged as a fallback so the CLI can warn). The data
//! directory is resolved independently: a direct test-hook override, then
//! `XDG_DATA_HOME`, then `$HOME/.local/share/<app>`.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::core::errors::{DotkError, Result};

/// Application name used for the default data directory and config file
/// names throughout the crate.
pub const APP_NAME: &str = "dotkeeper";

/// The two directories every pipeline command needs: where packs live, and
/// where dotkeeper's own persistent state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub source_root: PathBuf,
    /// True when the source root could not be determined from the
    /// environment or a git working tree and the current directory was used
    /// instead. Front ends should surface a warning in this case.
    pub source_root_is_fallback: bool,
    pub data_dir: PathBuf,
}

impl ResolvedPaths {
    /// Resolve both paths from the process environment and current directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir()
            .map_err(|source| DotkError::io(Path::new("."), source))?;
        let (source_root, source_root_is_fallback) = resolve_source_root(&cwd);
        let data_dir = resolve_data_dir()?;
        Ok(Self {
            source_root,
            source_root_is_fallback,
            data_dir,
        })
    }

    /// Path to the root-level config file (`<sourceRoot>/<app>.toml`).
    #[must_use]
    pub fn root_config_path(&self) -> PathBuf {
        self.source_root.join(format!("{APP_NAME}.toml"))
    }

    /// Path to the generated shell-init script.
    #[must_use]
    pub fn shell_init_path(&self) -> PathBuf {
        self.data_dir.join("shell").join("init.sh")
    }

    /// Path to the `packs/` subtree that the `DataStore` owns.
    #[must_use]
    pub fn packs_dir(&self) -> PathBuf {
        self.data_dir.join("packs")
    }

    /// Path to the backup-on-force subtree.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

fn resolve_source_root(cwd: &Path) -> (PathBuf, bool) {
    if let Some(root) = env::var_os("DOTFILES_ROOT").filter(|v| !v.is_empty()) {
        return (resolve_absolute_path(Path::new(&root), cwd), false);
    }
    if let Some(git_root) = find_git_root(cwd) {
        return (git_root, false);
    }
    (cwd.to_path_buf(), true)
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(format!("{}_DATA_DIR", app_env_prefix())).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_NAME));
    }
    let home = env::var_os("HOME").filter(|v| !v.is_empty()).ok_or_else(|| {
        DotkError::InvalidInput {
            details: "HOME is not set and no data-directory override is present".to_string(),
        }
    })?;
    Ok(PathBuf::from(home).join(".local").join("share").join(APP_NAME))
}

pub(crate) fn app_env_prefix() -> String {
    APP_NAME.to_uppercase()
}

/// Resolve `path` (relative to `base` if not already absolute) into an
/// absolute, normalized path without requiring the path to exist.
#[must_use]
pub fn resolve_absolute_path(path: &Path, base: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }
    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

#[cfg(test)]
mod path_properties;
