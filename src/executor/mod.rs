//! Executor (C7): turns operations into `DataStore` calls, grouped and
//! ordered per handler batch, with dry-run simulation and clear
//! confirmation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::errors::{DotkError, Result};
use crate::datastore::{CommandRunner, DataStore};
use crate::fs::FileSystem;
use crate::handlers::{
    ClearConfirmation, Handler, Operation, PackHandlerState, StatusChecker, StatusResult,
};
use crate::rules::RuleMatch;

/// Knobs threaded through a whole `on`/`off` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    pub force_rerun: bool,
    pub allow_overwrite: bool,
}

/// Outcome of a single operation within a batch.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Applied(String),
    Simulated(String),
    Skipped(String),
}

/// Per-handler batch result.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub files: Vec<PathBuf>,
    pub outcomes: Vec<OperationOutcome>,
    pub error: Option<String>,
}

/// pack → handler → outcome, as produced by `execute_all`.
pub type ExecutionContext = BTreeMap<String, BTreeMap<String, HandlerOutcome>>;

/// Approves or denies a clear confirmation request.
pub trait Confirmer {
    fn confirm(&self, message: &str) -> bool;
}

/// Always approves; used by `--force` and non-interactive contexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl Confirmer for AlwaysConfirm {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

fn describe_op(op: &Operation) -> String {
    match op {
        Operation::CreateDataLink { link_relpath, source, .. } => {
            format!("link data/{} -> {}", link_relpath.display(), source.display())
        }
        Operation::CreateUserLink { target, link_relpath, .. } => {
            format!("link {} -> data/{}", target.display(), link_relpath.display())
        }
        Operation::RunCommand { command, sentinel, .. } => {
            format!("run `{command}` (sentinel {sentinel})")
        }
        Operation::CheckSentinel { sentinel, .. } => format!("check sentinel {sentinel}"),
    }
}

/// Run a single handler's operations. Validation is just "well-formed batch"
/// here since handlers already validate at `to_operations` time; dry-run
/// never touches the filesystem. On the first real error the partial
/// results and the error are both returned to the caller.
pub fn execute(
    ops: &[Operation],
    datastore: &DataStore<'_>,
    cwd: &Path,
    options: ExecutionOptions,
    runner: &dyn CommandRunner,
) -> (Vec<OperationOutcome>, Option<DotkError>) {
    let mut outcomes = Vec::with_capacity(ops.len());

    if options.dry_run {
        for op in ops {
            outcomes.push(OperationOutcome::Simulated(describe_op(op)));
        }
        return (outcomes, None);
    }

    for op in ops {
        let result = match op {
            Operation::CreateDataLink {
                pack,
                handler,
                link_relpath,
                source,
            } => datastore
                .create_data_link(pack, handler, link_relpath, source)
                .map(|_| ()),
            Operation::CreateUserLink {
                pack,
                handler,
                link_relpath,
                target,
                allow_overwrite,
            } => datastore.create_user_link(
                pack,
                handler,
                link_relpath,
                target,
                *allow_overwrite || options.allow_overwrite,
            ),
            Operation::RunCommand {
                pack,
                handler,
                command,
                sentinel,
            } => datastore
                .run_and_record(pack, handler, command, sentinel, cwd, options.force_rerun, runner)
                .map(|_| ()),
            Operation::CheckSentinel { pack, handler, sentinel } => {
                let _ = datastore.has_sentinel(pack, handler, sentinel);
                Ok(())
            }
        };

        match result {
            Ok(()) => outcomes.push(OperationOutcome::Applied(describe_op(op))),
            Err(err) => return (outcomes, Some(err)),
        }
    }

    (outcomes, None)
}

/// Group matches by handler, order CodeExecution handlers (alphabetically)
/// before Configuration handlers (alphabetically), run each through
/// `execute`, and aggregate the results per pack.
pub fn execute_all(
    matches: &[RuleMatch],
    handlers: &BTreeMap<String, Box<dyn Handler>>,
    fsys: &dyn FileSystem,
    datastore: &DataStore<'_>,
    cwd: &Path,
    options: ExecutionOptions,
    runner: &dyn CommandRunner,
) -> ExecutionContext {
    let mut by_handler: BTreeMap<String, Vec<&RuleMatch>> = BTreeMap::new();
    for m in matches {
        by_handler.entry(m.handler.clone()).or_default().push(m);
    }

    let mut ordered: Vec<&String> = by_handler.keys().collect();
    ordered.sort_by_key(|name| {
        let category = handlers.get(*name).map(|h| h.category());
        (category, (*name).clone())
    });

    let mut ctx: ExecutionContext = ExecutionContext::new();

    for handler_name in ordered {
        let Some(handler) = handlers.get(handler_name) else {
            continue;
        };
        let group = &by_handler[handler_name];
        let mut by_pack: BTreeMap<String, Vec<crate::rules::FileInput>> = BTreeMap::new();
        for m in group.iter() {
            by_pack.entry(m.pack.clone()).or_default().push(m.to_file_input());
        }

        for (pack, files) in by_pack {
            let entry = ctx.entry(pack.clone()).or_default();
            let outcome = entry.entry(handler_name.clone()).or_default();
            outcome.files = files.iter().map(|f| f.relative_path.clone()).collect();

            match handler.to_operations(fsys, &files) {
                Ok(ops) => {
                    let (outcomes, error) = execute(&ops, datastore, cwd, options, runner);
                    outcome.outcomes = outcomes;
                    outcome.error = error.map(|e| e.to_string());
                }
                Err(err) => {
                    outcome.error = Some(err.to_string());
                }
            }
        }
    }

    ctx
}

/// Result of a `checkStatus` pass over a pack's matches.
pub type StatusReport = BTreeMap<String, BTreeMap<PathBuf, StatusResult>>;

/// `status`: run `checkStatus` for every match, grouped by pack then path.
pub fn status_all(
    matches: &[RuleMatch],
    handlers: &BTreeMap<String, Box<dyn Handler>>,
    datastore: &DataStore<'_>,
    fsys: &dyn FileSystem,
) -> StatusReport {
    let checker = StatusChecker { datastore, fsys };
    let mut report = StatusReport::new();
    for m in matches {
        let Some(handler) = handlers.get(&m.handler) else {
            continue;
        };
        let file = m.to_file_input();
        let result = handler.check_status(&file, &checker);
        report
            .entry(m.pack.clone())
            .or_default()
            .insert(m.relative_path.clone(), result);
    }
    report
}

/// `off`: ask for confirmation if the handler requires it, then remove the
/// pack/handler's state. Returns a human-readable description of what
/// happened (or would happen, under dry-run).
pub fn execute_clear(
    handler: &dyn Handler,
    ctx: &PackHandlerState,
    datastore: &DataStore<'_>,
    confirmer: &dyn Confirmer,
    dry_run: bool,
) -> Result<String> {
    if let Some(ClearConfirmation { message }) = handler.clear_confirmation(ctx) {
        if !confirmer.confirm(&message) {
            return Err(DotkError::UserCancelled { details: message });
        }
    }

    let item = format!("{}/{}", ctx.pack, ctx.handler);
    let description = handler.format_cleared_item(&item, dry_run);

    if !dry_run {
        datastore.remove_state(&ctx.pack, &ctx.handler)?;
    }

    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::command::tests::ScriptedCommandRunner;
    use crate::datastore::CommandOutcome;
    use crate::fs::MemoryFileSystem;
    use crate::handlers::{HomebrewHandler, InstallHandler, PathHandler, ShellHandler, SymlinkHandler};
    use crate::rules::RuleMatch;

    fn handler_registry() -> BTreeMap<String, Box<dyn Handler>> {
        let mut map: BTreeMap<String, Box<dyn Handler>> = BTreeMap::new();
        map.insert(
            "symlink".to_string(),
            Box::new(SymlinkHandler::new(vec![], vec![], PathBuf::from("/home/user"), PathBuf::from("/home/user/.config"))),
        );
        map.insert("shell".to_string(), Box::new(ShellHandler));
        map.insert("path".to_string(), Box::new(PathHandler));
        map.insert("install".to_string(), Box::new(InstallHandler));
        map.insert("homebrew".to_string(), Box::new(HomebrewHandler));
        map
    }

    fn rule_match(pack: &str, relpath: &str, handler: &str) -> RuleMatch {
        RuleMatch {
            pack: pack.to_string(),
            relative_path: PathBuf::from(relpath),
            absolute_path: PathBuf::from(format!("/src/{pack}/{relpath}")),
            handler: handler.to_string(),
            options: std::collections::BTreeMap::new(),
            priority: 0,
        }
    }

    #[test]
    fn dry_run_never_touches_the_filesystem() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/vim/.vimrc", "set nu");
        let datastore = DataStore::new(&fsys, PathBuf::from("/data"));
        let runner = ScriptedCommandRunner::new(vec![]);
        let matches = vec![rule_match("vim", ".vimrc", "symlink")];
        let options = ExecutionOptions {
            dry_run: true,
            ..Default::default()
        };
        let ctx = execute_all(&matches, &handler_registry(), &fsys, &datastore, Path::new("/src"), options, &runner);
        let outcome = &ctx["vim"]["symlink"];
        assert!(outcome.error.is_none());
        assert!(matches!(outcome.outcomes[0], OperationOutcome::Simulated(_)));
        assert!(!datastore.has_data_link("vim", "symlink", Path::new(".vimrc")));
    }

    #[test]
    fn execute_all_applies_symlink_operations() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/vim/.vimrc", "set nu");
        let datastore = DataStore::new(&fsys, PathBuf::from("/data"));
        let runner = ScriptedCommandRunner::new(vec![]);
        let matches = vec![rule_match("vim", ".vimrc", "symlink")];
        let ctx = execute_all(
            &matches,
            &handler_registry(),
            &fsys,
            &datastore,
            Path::new("/src"),
            ExecutionOptions::default(),
            &runner,
        );
        assert!(ctx["vim"]["symlink"].error.is_none());
        assert!(datastore.has_data_link("vim", "symlink", Path::new(".vimrc")));
    }

    #[test]
    fn code_execution_handlers_run_before_configuration_handlers() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/vim/.vimrc", "set nu");
        fsys.seed_file("/src/vim/install.sh", "echo hi");
        let datastore = DataStore::new(&fsys, PathBuf::from("/data"));
        let runner = ScriptedCommandRunner::new(vec![Ok(CommandOutcome {
            status: Some(0),
            stdout: vec![],
            stderr: vec![],
        })]);
        let matches = vec![
            rule_match("vim", ".vimrc", "symlink"),
            rule_match("vim", "install.sh", "install"),
        ];
        let ctx = execute_all(
            &matches,
            &handler_registry(),
            &fsys,
            &datastore,
            Path::new("/src"),
            ExecutionOptions::default(),
            &runner,
        );
        assert!(ctx["vim"]["install"].error.is_none());
        assert!(ctx["vim"]["symlink"].error.is_none());
    }

    #[test]
    fn execute_clear_requires_confirmation_for_homebrew() {
        struct DenyConfirmer;
        impl Confirmer for DenyConfirmer {
            fn confirm(&self, _message: &str) -> bool {
                false
            }
        }
        let fsys = MemoryFileSystem::new();
        let datastore = DataStore::new(&fsys, PathBuf::from("/data"));
        let handler = HomebrewHandler;
        let ctx = PackHandlerState {
            pack: "tools".to_string(),
            handler: "homebrew".to_string(),
        };
        let result = execute_clear(&handler, &ctx, &datastore, &DenyConfirmer, false);
        assert!(matches!(result, Err(DotkError::UserCancelled { .. })));
    }

    #[test]
    fn execute_clear_removes_state_on_approval() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/tools/Brewfile", "brew 'jq'");
        let datastore = DataStore::new(&fsys, PathBuf::from("/data"));
        datastore
            .create_data_link("tools", "homebrew", Path::new("Brewfile"), Path::new("/src/tools/Brewfile"))
            .unwrap();
        let handler = HomebrewHandler;
        let ctx = PackHandlerState {
            pack: "tools".to_string(),
            handler: "homebrew".to_string(),
        };
        execute_clear(&handler, &ctx, &datastore, &AlwaysConfirm, false).unwrap();
        assert!(!datastore.has_data_link("tools", "homebrew", Path::new("Brewfile")));
    }

    #[test]
    fn status_all_reports_pending_before_deployment() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/vim/.vimrc", "set nu");
        let datastore = DataStore::new(&fsys, PathBuf::from("/data"));
        let matches = vec![rule_match("vim", ".vimrc", "symlink")];
        let report = status_all(&matches, &handler_registry(), &datastore, &fsys);
        assert!(matches!(report["vim"][Path::new(".vimrc")], StatusResult::Pending(_)));
    }
}
