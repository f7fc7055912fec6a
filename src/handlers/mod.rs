//! Handlers (C6): pure transforms from matched files to operations.
//!
//! Each handler is a small, stateless strategy object. `category()`
//! controls batch ordering in the executor: `CodeExecution` handlers run
//! before `Configuration` handlers.

pub mod homebrew;
pub mod install;
pub mod path;
pub mod shell;
pub mod symlink;

use std::path::PathBuf;

use crate::core::errors::Result;
use crate::datastore::DataStore;
use crate::fs::FileSystem;
use crate::rules::FileInput;

pub use homebrew::HomebrewHandler;
pub use install::InstallHandler;
pub use path::PathHandler;
pub use shell::ShellHandler;
pub use symlink::SymlinkHandler;

/// Build the standard five-handler registry, keyed by handler name, reading
/// `HOME`/`XDG_CONFIG_HOME` for the symlink handler's target resolution.
pub fn registry(
    force_home: Vec<String>,
    protected_paths: Vec<String>,
) -> Result<std::collections::BTreeMap<String, Box<dyn Handler>>> {
    let mut map: std::collections::BTreeMap<String, Box<dyn Handler>> =
        std::collections::BTreeMap::new();
    map.insert("symlink".to_string(), Box::new(symlink::from_env(force_home, protected_paths)?));
    map.insert("shell".to_string(), Box::new(ShellHandler));
    map.insert("path".to_string(), Box::new(PathHandler));
    map.insert("install".to_string(), Box::new(InstallHandler));
    map.insert("homebrew".to_string(), Box::new(HomebrewHandler));
    Ok(map)
}

/// Controls executor batch ordering: code-execution handlers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    CodeExecution,
    Configuration,
}

/// The unit of persistent work a handler can request from the executor.
#[derive(Debug, Clone)]
pub enum Operation {
    CreateDataLink {
        pack: String,
        handler: String,
        link_relpath: PathBuf,
        source: PathBuf,
    },
    CreateUserLink {
        pack: String,
        handler: String,
        link_relpath: PathBuf,
        target: PathBuf,
        allow_overwrite: bool,
    },
    RunCommand {
        pack: String,
        handler: String,
        command: String,
        sentinel: String,
    },
    CheckSentinel {
        pack: String,
        handler: String,
        sentinel: String,
    },
}

impl Operation {
    #[must_use]
    pub fn pack(&self) -> &str {
        match self {
            Self::CreateDataLink { pack, .. }
            | Self::CreateUserLink { pack, .. }
            | Self::RunCommand { pack, .. }
            | Self::CheckSentinel { pack, .. } => pack,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &str {
        match self {
            Self::CreateDataLink { handler, .. }
            | Self::CreateUserLink { handler, .. }
            | Self::RunCommand { handler, .. }
            | Self::CheckSentinel { handler, .. } => handler,
        }
    }
}

/// Outcome of `checkStatus` for one matched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusResult {
    Ready(String),
    Pending(String),
    Error(String),
}

/// Static description surfaced by `init`/`fill` and confirmation prompts.
#[derive(Debug, Clone, Copy)]
pub struct HandlerMetadata {
    pub description: &'static str,
    pub requires_confirm: bool,
    pub can_run_multiple: bool,
    /// `(filename, contents)` written by `init`/`fill` when this handler
    /// currently has no matching files in the pack.
    pub template: Option<(&'static str, &'static str)>,
}

/// What `ExecuteClear` should ask the user to confirm before
/// `DataStore::remove_state` runs.
#[derive(Debug, Clone)]
pub struct ClearConfirmation {
    pub message: String,
}

/// Minimal per-pack/handler context passed to `clear_confirmation`.
#[derive(Debug, Clone)]
pub struct PackHandlerState {
    pub pack: String,
    pub handler: String,
}

/// Read-only view into the `DataStore` (and filesystem, for handlers that
/// need to recompute a content-derived sentinel) used by `checkStatus`.
pub struct StatusChecker<'a> {
    pub datastore: &'a DataStore<'a>,
    pub fsys: &'a dyn FileSystem,
}

/// The handler interface every one of the five strategies implements.
pub trait Handler {
    fn name(&self) -> &'static str;
    fn category(&self) -> Category;
    fn to_operations(&self, fsys: &dyn FileSystem, files: &[FileInput]) -> Result<Vec<Operation>>;
    fn check_status(&self, file: &FileInput, checker: &StatusChecker<'_>) -> StatusResult;
    fn metadata(&self) -> HandlerMetadata;
    fn clear_confirmation(&self, ctx: &PackHandlerState) -> Option<ClearConfirmation>;
    fn format_cleared_item(&self, item: &str, dry_run: bool) -> String {
        if dry_run {
            format!("would remove {item}")
        } else {
            format!("removed {item}")
        }
    }
}

/// Content-derived sentinel shared by install/homebrew: `<prefix><basename>-<sha256>`.
#[must_use]
pub fn content_sentinel(prefix: &str, basename: &str, contents: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(contents);
    format!("{prefix}{basename}-{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_orders_code_execution_before_configuration() {
        assert!(Category::CodeExecution < Category::Configuration);
    }

    #[test]
    fn content_sentinel_changes_with_contents() {
        let a = content_sentinel("", "install.sh", b"echo 1");
        let b = content_sentinel("", "install.sh", b"echo 2");
        assert_ne!(a, b);
        assert!(a.starts_with("install.sh-"));
    }
}
