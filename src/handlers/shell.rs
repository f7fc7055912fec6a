//! shell handler (Configuration): sources matched files from the generated
//! shell-init script. No user-visible symlink is created.

use crate::core::errors::Result;
use crate::rules::FileInput;

use super::{
    Category, ClearConfirmation, Handler, HandlerMetadata, Operation, PackHandlerState,
    StatusChecker, StatusResult,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct ShellHandler;

impl Handler for ShellHandler {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn category(&self) -> Category {
        Category::Configuration
    }

    fn to_operations(&self, _fsys: &dyn crate::fs::FileSystem, files: &[FileInput]) -> Result<Vec<Operation>> {
        Ok(files
            .iter()
            .map(|file| Operation::CreateDataLink {
                pack: file.pack.clone(),
                handler: self.name().to_string(),
                link_relpath: file.relative_path.clone(),
                source: file.absolute_path.clone(),
            })
            .collect())
    }

    fn check_status(&self, file: &FileInput, checker: &StatusChecker<'_>) -> StatusResult {
        if checker
            .datastore
            .has_data_link(&file.pack, self.name(), &file.relative_path)
        {
            StatusResult::Ready(format!("{} is sourced at shell startup", file.relative_path.display()))
        } else {
            StatusResult::Pending(format!("{} is not yet registered", file.relative_path.display()))
        }
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "sources a shell snippet from the generated shell-init script",
            requires_confirm: false,
            can_run_multiple: true,
            template: Some(("profile.sh", "# sourced by dotkeeper's generated shell-init\n")),
        }
    }

    fn clear_confirmation(&self, _ctx: &PackHandlerState) -> Option<ClearConfirmation> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn emits_one_data_link_per_file() {
        let handler = ShellHandler;
        let files = vec![FileInput {
            pack: "zsh".to_string(),
            absolute_path: PathBuf::from("/src/zsh/profile.sh"),
            relative_path: PathBuf::from("profile.sh"),
            options: std::collections::BTreeMap::new(),
        }];
        let ops = handler.to_operations(&crate::fs::MemoryFileSystem::new(), &files).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::CreateDataLink { .. }));
    }
}
