//! install handler (CodeExecution): runs a script once per content hash.

use crate::core::errors::{DotkError, Result};
use crate::fs::FileSystem;
use crate::rules::FileInput;

use super::{
    content_sentinel, Category, ClearConfirmation, Handler, HandlerMetadata, Operation,
    PackHandlerState, StatusChecker, StatusResult,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct InstallHandler;

impl InstallHandler {
    fn sentinel_for(fsys: &dyn FileSystem, file: &FileInput) -> Result<String> {
        let contents = fsys
            .read_file(&file.absolute_path)
            .map_err(|source| DotkError::io(&file.absolute_path, source))?;
        let basename = file
            .relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(content_sentinel("", &basename, &contents))
    }
}

impl Handler for InstallHandler {
    fn name(&self) -> &'static str {
        "install"
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
                    command: format!("bash '{}'", file.absolute_path.display()),
                    sentinel,
                })
            })
            .collect()
    }

    fn check_status(&self, file: &FileInput, checker: &StatusChecker<'_>) -> StatusResult {
        match Self::sentinel_for(checker.fsys, file) {
            Ok(sentinel) if checker.datastore.has_sentinel(&file.pack, self.name(), &sentinel) => {
                StatusResult::Ready(format!("{} has run", file.relative_path.display()))
            }
            Ok(_) => StatusResult::Pending(format!("{} has not run yet", file.relative_path.display())),
            Err(err) => StatusResult::Error(err.to_string()),
        }
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "runs an install script once per content hash",
            requires_confirm: true,
            can_run_multiple: false,
            template: Some(("install.sh", "#!/bin/sh\nset -e\n")),
        }
    }

    fn clear_confirmation(&self, ctx: &PackHandlerState) -> Option<ClearConfirmation> {
        Some(ClearConfirmation {
            message: format!(
                "clearing install state for pack '{}' only forgets which scripts ran; it does not undo them",
                ctx.pack
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::path::PathBuf;

    #[test]
    fn sentinel_is_derived_from_content() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/tools/install.sh", "echo hi");
        let file = FileInput {
            pack: "tools".to_string(),
            absolute_path: PathBuf::from("/src/tools/install.sh"),
            relative_path: PathBuf::from("install.sh"),
            options: std::collections::BTreeMap::new(),
        };
        let handler = InstallHandler;
        let ops = handler.to_operations(&fsys, &[file]).unwrap();
        match &ops[0] {
            Operation::RunCommand { sentinel, command, .. } => {
                assert!(sentinel.starts_with("install.sh-"));
                assert!(command.contains("bash"));
            }
            other => panic!("expected RunCommand, got {other:?}"),
        }
    }
}
