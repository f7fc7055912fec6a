//! symlink handler (Configuration): the catch-all that places a two-hop
//! link from a computed home/XDG target into the data directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::errors::{DotkError, Result};
use crate::rules::FileInput;

use super::{
    Category, ClearConfirmation, Handler, HandlerMetadata, Operation, PackHandlerState,
    StatusChecker, StatusResult,
};

/// Computes user-visible link targets and guards a configurable set of
/// paths that must never be symlinked.
pub struct SymlinkHandler {
    pub force_home: Vec<String>,
    pub protected_paths: Vec<String>,
    pub home: PathBuf,
    pub xdg_config_home: PathBuf,
}

impl SymlinkHandler {
    #[must_use]
    pub fn new(
        force_home: Vec<String>,
        protected_paths: Vec<String>,
        home: PathBuf,
        xdg_config_home: PathBuf,
    ) -> Self {
        Self {
            force_home,
            protected_paths,
            home,
            xdg_config_home,
        }
    }

    /// 3-layer target resolution, highest priority first.
    #[must_use]
    pub fn compute_target(&self, relative_path: &Path) -> PathBuf {
        let relative_str = relative_path.to_string_lossy();

        if let Some(rest) = relative_str.strip_prefix("_home/") {
            return self.home.join(format!(".{rest}"));
        }
        if let Some(rest) = relative_str.strip_prefix("_xdg/") {
            return self.xdg_config_home.join(rest);
        }

        let mut components = relative_path.components();
        if let Some(first) = components.next() {
            let first_str = first.as_os_str().to_string_lossy().into_owned();
            if self.force_home.contains(&first_str) {
                let rest: PathBuf = components.collect();
                return if rest.as_os_str().is_empty() {
                    self.home.join(format!(".{first_str}"))
                } else {
                    self.home.join(format!(".{first_str}")).join(rest)
                };
            }
        }

        if relative_path.components().count() == 1 {
            return self.home.join(format!(".{relative_str}"));
        }
        if relative_str.starts_with('.') {
            return self.home.join(relative_path);
        }
        let stripped = relative_str
            .strip_prefix("config/")
            .map_or_else(|| relative_path.to_path_buf(), PathBuf::from);
        self.xdg_config_home.join(stripped)
    }

    fn is_protected(&self, target: &Path) -> bool {
        let Ok(relative_to_home) = target.strip_prefix(&self.home) else {
            return false;
        };
        self.protected_paths
            .iter()
            .any(|protected| relative_to_home == Path::new(protected) || relative_to_home.starts_with(protected))
    }
}

impl Handler for SymlinkHandler {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn category(&self) -> Category {
        Category::Configuration
    }

    fn to_operations(&self, _fsys: &dyn crate::fs::FileSystem, files: &[FileInput]) -> Result<Vec<Operation>> {
        let mut ops = Vec::with_capacity(files.len() * 2);
        let mut seen_targets: HashMap<PathBuf, PathBuf> = HashMap::new();

        for file in files {
            let target = self.compute_target(&file.relative_path);

            if self.is_protected(&target) {
                return Err(DotkError::ProtectedFile {
                    path: file.absolute_path.clone(),
                    reason: format!("{} is in the protected-paths set", target.display()),
                });
            }

            if let Some(first_source) = seen_targets.get(&target) {
                return Err(DotkError::SymlinkConflict {
                    target,
                    first: first_source.clone(),
                    second: file.absolute_path.clone(),
                });
            }
            seen_targets.insert(target.clone(), file.absolute_path.clone());

            ops.push(Operation::CreateDataLink {
                pack: file.pack.clone(),
                handler: self.name().to_string(),
                link_relpath: file.relative_path.clone(),
                source: file.absolute_path.clone(),
            });
            ops.push(Operation::CreateUserLink {
                pack: file.pack.clone(),
                handler: self.name().to_string(),
                link_relpath: file.relative_path.clone(),
                target,
                allow_overwrite: false,
            });
        }

        Ok(ops)
    }

    fn check_status(&self, file: &FileInput, checker: &StatusChecker<'_>) -> StatusResult {
        if checker
            .datastore
            .has_data_link(&file.pack, self.name(), &file.relative_path)
        {
            StatusResult::Ready(format!("{} is linked", file.relative_path.display()))
        } else {
            StatusResult::Pending(format!("{} is not yet linked", file.relative_path.display()))
        }
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "symlinks a source file to a computed home or XDG config location",
            requires_confirm: false,
            can_run_multiple: true,
            template: None,
        }
    }

    fn clear_confirmation(&self, _ctx: &PackHandlerState) -> Option<ClearConfirmation> {
        None
    }
}

/// Convenience constructor reading `HOME`/`XDG_CONFIG_HOME` from the
/// process environment, as C1 does for source-root resolution.
pub fn from_env(force_home: Vec<String>, protected_paths: Vec<String>) -> Result<SymlinkHandler> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| DotkError::InvalidInput {
            details: "HOME is not set".to_string(),
        })?;
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".config"));
    Ok(SymlinkHandler::new(force_home, protected_paths, home, xdg_config_home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    fn handler() -> SymlinkHandler {
        SymlinkHandler::new(
            Config::default_force_home(),
            Config::default_protected_paths(),
            PathBuf::from("/home/user"),
            PathBuf::from("/home/user/.config"),
        )
    }

    fn input(relpath: &str) -> FileInput {
        FileInput {
            pack: "vim".to_string(),
            absolute_path: PathBuf::from(format!("/src/vim/{relpath}")),
            relative_path: PathBuf::from(relpath),
            options: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn l1_top_level_file_maps_to_dotfile() {
        let h = handler();
        assert_eq!(h.compute_target(Path::new("vimrc")), Path::new("/home/user/.vimrc"));
    }

    #[test]
    fn l1_leading_dot_path_maps_directly_under_home() {
        let h = handler();
        assert_eq!(h.compute_target(Path::new(".config/nvim/init.vim")), Path::new("/home/user/.config/nvim/init.vim"));
    }

    #[test]
    fn l1_nested_path_maps_under_xdg_config() {
        let h = handler();
        assert_eq!(h.compute_target(Path::new("nvim/init.vim")), Path::new("/home/user/.config/nvim/init.vim"));
    }

    #[test]
    fn l1_strips_leading_config_segment() {
        let h = handler();
        assert_eq!(
            h.compute_target(Path::new("config/nvim/init.vim")),
            Path::new("/home/user/.config/nvim/init.vim")
        );
    }

    #[test]
    fn l2_force_home_set_wins_over_l1() {
        let h = handler();
        assert_eq!(h.compute_target(Path::new("ssh/config")), Path::new("/home/user/.ssh/config"));
    }

    #[test]
    fn l3_explicit_home_prefix_wins_over_everything() {
        let h = handler();
        assert_eq!(h.compute_target(Path::new("_home/custom")), Path::new("/home/user/.custom"));
    }

    #[test]
    fn l3_explicit_xdg_prefix_wins_over_force_home() {
        let h = handler();
        assert_eq!(h.compute_target(Path::new("_xdg/ssh/config")), Path::new("/home/user/.config/ssh/config"));
    }

    #[test]
    fn protected_path_is_refused() {
        let h = handler();
        let files = vec![input("ssh/id_rsa")];
        let result = h.to_operations(&crate::fs::MemoryFileSystem::new(), &files);
        assert!(matches!(result, Err(DotkError::ProtectedFile { .. })));
    }

    #[test]
    fn duplicate_targets_in_batch_are_a_conflict() {
        let h = handler();
        let files = vec![input("_home/dup"), FileInput {
            pack: "zsh".to_string(),
            absolute_path: PathBuf::from("/src/zsh/_home/dup"),
            relative_path: PathBuf::from("_home/dup"),
            options: std::collections::BTreeMap::new(),
        }];
        let result = h.to_operations(&crate::fs::MemoryFileSystem::new(), &files);
        assert!(matches!(result, Err(DotkError::SymlinkConflict { .. })));
    }

    #[test]
    fn valid_file_produces_data_link_then_user_link() {
        let h = handler();
        let files = vec![input("vimrc")];
        let ops = h.to_operations(&crate::fs::MemoryFileSystem::new(), &files).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], Operation::CreateDataLink { .. }));
        assert!(matches!(ops[1], Operation::CreateUserLink { .. }));
    }
}
