//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use dotkeeper::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, RuleSpec, SymlinkConfig};
pub use crate::core::errors::{DotkError, Result};
pub use crate::core::paths::ResolvedPaths;

// Filesystem abstraction
pub use crate::fs::{EntryKind, FileSystem, MemoryFileSystem, RealFileSystem, WalkEntry};

// Packs and rules
pub use crate::packs::Pack;
pub use crate::rules::{FileInput, Rule, RuleMatch};

// DataStore
pub use crate::datastore::{CommandOutcome, CommandRunner, DataStore, RealCommandRunner};

// Handlers
pub use crate::handlers::{
    Category, ClearConfirmation, Handler, HandlerMetadata, HomebrewHandler, InstallHandler,
    Operation, PackHandlerState, PathHandler, ShellHandler, StatusResult, SymlinkHandler,
};

// Executor
pub use crate::executor::{
    execute, execute_all, execute_clear, status_all, AlwaysConfirm, Confirmer, ExecutionContext,
    ExecutionOptions, HandlerOutcome, OperationOutcome, StatusReport,
};

// Packs
pub use crate::packs::discover as discover_packs;

// Pipeline
pub use crate::pipeline::{adopt, fill, gen_config, init, off, on, status};

// Logging
pub use crate::logger::jsonl::{EventType, JsonlWriter, LogEvent, Severity};
