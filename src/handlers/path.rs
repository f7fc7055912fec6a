//! path handler (Configuration): registers a directory to be prepended to
//! `PATH` by the generated shell-init script.

use std::collections::HashSet;

use crate::core::errors::Result;
use crate::rules::FileInput;

use super::{
    Category, ClearConfirmation, Handler, HandlerMetadata, Operation, PackHandlerState,
    StatusChecker, StatusResult,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PathHandler;

impl Handler for PathHandler {
    fn name(&self) -> &'static str {
        "path"
    }

    fn category(&self) -> Category {
        Category::Configuration
    }

    fn to_operations(&self, _fsys: &dyn crate::fs::FileSystem, files: &[FileInput]) -> Result<Vec<Operation>> {
        let mut seen: HashSet<(String, std::path::PathBuf)> = HashSet::new();
        let mut ops = Vec::new();
        for file in files {
            let key = (file.pack.clone(), file.relative_path.clone());
            if !seen.insert(key) {
                continue;
            }
            ops.push(Operation::CreateDataLink {
                pack: file.pack.clone(),
                handler: self.name().to_string(),
                link_relpath: file.relative_path.clone(),
                source: file.absolute_path.clone(),
            });
        }
        Ok(ops)
    }

    fn check_status(&self, file: &FileInput, checker: &StatusChecker<'_>) -> StatusResult {
        if checker
            .datastore
            .has_data_link(&file.pack, self.name(), &file.relative_path)
        {
            StatusResult::Ready(format!("{} is on PATH", file.relative_path.display()))
        } else {
            StatusResult::Pending(format!("{} is not yet on PATH", file.relative_path.display()))
        }
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "prepends a directory to PATH via the generated shell-init script",
            requires_confirm: false,
            can_run_multiple: true,
            template: Some(("bin/.keep", "")),
        }
    }

    fn clear_confirmation(&self, _ctx: &PackHandlerState) -> Option<ClearConfirmation> {
        None
    }
}
