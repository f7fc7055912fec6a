//! homebrew handler (CodeExecution): runs `brew bundle` once per content
//! hash. Clearing this handler's state uninstalls packages only when the
//! caller opts in via `<APP>_HOMEBREW_UNINSTALL`.

use std::env;

use crate::core::errors::{DotkError, Result};
use crate::core::paths::app_env_prefix;
use crate::fs::FileSystem;
use crate::rules::FileInput;

use super::{
    content_sentinel, Category, ClearConfirmation, Handler, HandlerMetadata, Operation,
    PackHandlerState, StatusChecker, StatusResult,
};

/// `true` when `<APP>_HOMEBREW_UNINSTALL` is set to a non-empty value,
/// opting in to `off` actually running `brew bundle cleanup` for this
/// handler instead of only dropping recorded sentinels.
#[must_use]
pub fn uninstall_requested() -> bool {
    env::var_os(format!("{}_HOMEBREW_UNINSTALL", app_env_prefix()))
        .filter(|v| !v.is_empty())
        .is_some()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HomebrewHandler;

impl HomebrewHandler {
    fn sentinel_for(fsys: &dyn FileSystem, file: &FileInput) -> Result<String> {
        let contents = fsys
            .read_file(&file.absolute_path)
            .map_err(|source| DotkError::io(&file.absolute_path, source))?;
        let basename = file
            .relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(content_sentinel(&format!("{}_", file.pack), &basename, &contents))
    }
}

impl Handler for HomebrewHandler {
    fn name(&self) -> &'static str {
        "homebrew"
    }

    fn category(&self) -> Category {
        Category::CodeExecution
    }

    fn to_operations(&self, fsys: &dyn FileSystem, files: &[FileInput]) -> Result<Vec<Operation>> {
        files
            .iter()
            .map(|file| {
                let sentinel = Self::sentinel_for(fsys, file)?;
                Ok(Operation::RunCommand {
                    pack: file.pack.clone(),
                    handler: self.name().to_string(),
                    command: format!("brew bundle --file='{}'", file.absolute_path.display()),
                    sentinel,
                })
            })
            .collect()
    }

    fn check_status(&self, file: &FileInput, checker: &StatusChecker<'_>) -> StatusResult {
        match Self::sentinel_for(checker.fsys, file) {
            Ok(sentinel) if checker.datastore.has_sentinel(&file.pack, self.name(), &sentinel) => {
                StatusResult::Ready(format!("{} has been bundled", file.relative_path.display()))
            }
            Ok(_) => StatusResult::Pending(format!("{} has not been bundled yet", file.relative_path.display())),
            Err(err) => StatusResult::Error(err.to_string()),
        }
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "runs `brew bundle` against a Brewfile once per content hash",
            requires_confirm: true,
            can_run_multiple: false,
            template: Some(("Brewfile", "# brew bundle dump --file=Brewfile\n")),
        }
    }

    fn clear_confirmation(&self, ctx: &PackHandlerState) -> Option<ClearConfirmation> {
        let message = if uninstall_requested() {
            format!(
                "clearing homebrew state for pack '{}' will run `brew bundle cleanup --force` and uninstall packages no longer listed in its Brewfile",
                ctx.pack
            )
        } else {
            format!(
                "clearing homebrew state for pack '{}' does not uninstall any packages",
                ctx.pack
            )
        };
        Some(ClearConfirmation { message })
    }
}
