//! Pipeline compositions (C8): the eight user-facing commands, each a
//! straight-line call through discovery, rule-matching, and the executor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::config::Config;
use crate::core::errors::{DotkError, Result};
use crate::core::paths::ResolvedPaths;
use crate::datastore::{CommandRunner, DataStore};
use crate::executor::{self, Confirmer, ExecutionContext, ExecutionOptions, StatusReport};
use crate::fs::FileSystem;
use crate::handlers::{self, Handler, PackHandlerState};
use crate::packs::{self, Pack};
use crate::rules::{self, RuleMatch};

fn root_config(fsys: &dyn FileSystem, paths: &ResolvedPaths) -> Result<Option<Config>> {
    Config::load_optional(fsys, &paths.root_config_path())
}

fn rules_for_pack(root: Option<&Config>, pack: &Pack) -> Vec<rules::Rule> {
    rules::merge_rules(pack.config.as_ref(), root)
}

fn build_registry(root: Option<&Config>) -> Result<BTreeMap<String, Box<dyn Handler>>> {
    let force_home = root.map_or_else(Config::default_force_home, |c| {
        if c.symlink.force_home.is_empty() {
            Config::default_force_home()
        } else {
            c.symlink.force_home.clone()
        }
    });
    let protected_paths = root.map_or_else(Config::default_protected_paths, |c| {
        if c.symlink.protected_paths.is_empty() {
            Config::default_protected_paths()
        } else {
            c.symlink.protected_paths.clone()
        }
    });
    handlers::registry(force_home, protected_paths)
}

fn matches_for_packs(fsys: &dyn FileSystem, root: Option<&Config>, packs: &[Pack]) -> Result<Vec<RuleMatch>> {
    let mut all = Vec::new();
    for pack in packs {
        let rules = rules_for_pack(root, pack);
        let matched = rules::match_pack(fsys, pack, &rules).map_err(|source| DotkError::io(&pack.path, source))?;
        all.extend(matched);
    }
    Ok(all)
}

/// `on`: discover, rule-match, and run every matched file through the
/// executor. `configuration_only` corresponds to `--no-provision`.
pub fn on(
    fsys: &dyn FileSystem,
    paths: &ResolvedPaths,
    pack_names: &[String],
    configuration_only: bool,
    options: ExecutionOptions,
    runner: &dyn CommandRunner,
) -> Result<ExecutionContext> {
    let root = root_config(fsys, paths)?;
    let discovered = packs::discover(fsys, &paths.source_root, pack_names)?;
    let mut matches = matches_for_packs(fsys, root.as_ref(), &discovered)?;
    let registry = build_registry(root.as_ref())?;

    if configuration_only {
        matches.retain(|m| {
            registry
                .get(&m.handler)
                .is_some_and(|h| h.category() == handlers::Category::Configuration)
        });
    }

    let datastore = DataStore::new(fsys, paths.data_dir.clone());
    let ctx = executor::execute_all(&matches, &registry, fsys, &datastore, &paths.source_root, options, runner);

    if !options.dry_run {
        ensure_shell_init(fsys, paths)?;
    }

    Ok(ctx)
}

/// `off`: clear every handler each selected pack has recorded state for.
/// Never touches source files. When the homebrew handler is present and
/// `<APP>_HOMEBREW_UNINSTALL` is set, also runs `brew bundle cleanup`
/// against the pack's Brewfile before dropping its recorded sentinels.
pub fn off(
    fsys: &dyn FileSystem,
    paths: &ResolvedPaths,
    pack_names: &[String],
    dry_run: bool,
    confirmer: &dyn Confirmer,
    runner: &dyn CommandRunner,
) -> Result<BTreeMap<String, Vec<String>>> {
    let root = root_config(fsys, paths)?;
    let discovered = packs::discover(fsys, &paths.source_root, pack_names)?;
    let registry = build_registry(root.as_ref())?;
    let datastore = DataStore::new(fsys, paths.data_dir.clone());

    let mut report: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pack in &discovered {
        let mut cleared = Vec::new();
        for handler_name in datastore.list_pack_handlers(&pack.name) {
            let Some(handler) = registry.get(&handler_name) else {
                continue;
            };
            let ctx = PackHandlerState {
                pack: pack.name.clone(),
                handler: handler_name.clone(),
            };
            if handler_name == "homebrew" && !dry_run && handlers::homebrew::uninstall_requested() {
                uninstall_homebrew_pack(fsys, &pack.path, runner)?;
            }
            let description = executor::execute_clear(handler.as_ref(), &ctx, &datastore, confirmer, dry_run)?;
            cleared.push(description);
        }
        report.insert(pack.name.clone(), cleared);
    }
    Ok(report)
}

fn uninstall_homebrew_pack(fsys: &dyn FileSystem, pack_path: &Path, runner: &dyn CommandRunner) -> Result<()> {
    let brewfile = pack_path.join("Brewfile");
    if !fsys.exists(&brewfile) {
        return Ok(());
    }
    let command = format!("brew bundle cleanup --force --file='{}'", brewfile.display());
    let outcome = runner
        .run(&command, pack_path)
        .map_err(|err| DotkError::io(pack_path, err))?;
    if outcome.status != Some(0) {
        return Err(DotkError::CommandFailed {
            command,
            status: outcome.status,
        });
    }
    Ok(())
}

/// `status`: rule-match and report each file's handler status.
pub fn status(fsys: &dyn FileSystem, paths: &ResolvedPaths, pack_names: &[String]) -> Result<StatusReport> {
    let root = root_config(fsys, paths)?;
    let discovered = packs::discover(fsys, &paths.source_root, pack_names)?;
    let matches = matches_for_packs(fsys, root.as_ref(), &discovered)?;
    let registry = build_registry(root.as_ref())?;
    let datastore = DataStore::new(fsys, paths.data_dir.clone());
    Ok(executor::status_all(&matches, &registry, &datastore, fsys))
}

fn template_files(registry: &BTreeMap<String, Box<dyn Handler>>) -> Vec<(&'static str, &'static str)> {
    let mut templates: Vec<(&'static str, &'static str)> = registry
        .values()
        .filter_map(|handler| handler.metadata().template)
        .collect();
    templates.sort_by_key(|(name, _)| *name);
    templates
}

/// `init`: create a new pack directory with one template per handler that
/// declares one. Existing files are left untouched.
pub fn init(fsys: &dyn FileSystem, paths: &ResolvedPaths, pack_name: &str) -> Result<Vec<PathBuf>> {
    let root = root_config(fsys, paths)?;
    let registry = build_registry(root.as_ref())?;
    let pack_dir = paths.source_root.join(pack_name);
    fsys.mkdir_all(&pack_dir, 0o755).map_err(|err| DotkError::io(&pack_dir, err))?;

    let mut written = Vec::new();
    for (name, contents) in template_files(&registry) {
        let target = pack_dir.join(name);
        if fsys.exists(&target) {
            continue;
        }
        if let Some(parent) = target.parent() {
            fsys.mkdir_all(parent, 0o755).map_err(|err| DotkError::io(parent, err))?;
        }
        fsys.write_file(&target, contents.as_bytes(), 0o644)
            .map_err(|err| DotkError::io(&target, err))?;
        written.push(target);
    }
    Ok(written)
}

/// `fill`: add template files only for handlers with zero matching files in
/// this pack, using the pack's fully merged rule set.
pub fn fill(fsys: &dyn FileSystem, paths: &ResolvedPaths, pack_name: &str) -> Result<Vec<PathBuf>> {
    let root = root_config(fsys, paths)?;
    let discovered = packs::discover(fsys, &paths.source_root, &[pack_name.to_string()])?;
    let pack = discovered
        .into_iter()
        .next()
        .ok_or_else(|| DotkError::PackNotFound {
            requested: vec![pack_name.to_string()],
            available: vec![],
        })?;
    let registry = build_registry(root.as_ref())?;
    let rules = rules_for_pack(root.as_ref(), &pack);
    let matches = rules::match_pack(fsys, &pack, &rules).map_err(|source| DotkError::io(&pack.path, source))?;

    let handlers_with_files: std::collections::HashSet<String> =
        matches.iter().map(|m| m.handler.clone()).collect();

    let mut written = Vec::new();
    for (name, contents) in registry
        .iter()
        .filter(|(handler_name, _)| !handlers_with_files.contains(*handler_name))
        .filter_map(|(_, handler)| handler.metadata().template)
    {
        let target = pack.path.join(name);
        if fsys.exists(&target) {
            continue;
        }
        if let Some(parent) = target.parent() {
            fsys.mkdir_all(parent, 0o755).map_err(|err| DotkError::io(parent, err))?;
        }
        fsys.write_file(&target, contents.as_bytes(), 0o644)
            .map_err(|err| DotkError::io(&target, err))?;
        written.push(target);
    }
    Ok(written)
}

/// `add-ignore`: drop the ignore marker into a pack directory so discovery
/// skips it entirely. Creates the pack directory if it doesn't exist yet;
/// leaves an existing marker untouched.
pub fn add_ignore(fsys: &dyn FileSystem, paths: &ResolvedPaths, pack_name: &str) -> Result<PathBuf> {
    let pack_dir = paths.source_root.join(pack_name);
    fsys.mkdir_all(&pack_dir, 0o755).map_err(|err| DotkError::io(&pack_dir, err))?;
    let marker = pack_dir.join(packs::IGNORE_MARKER);
    if !fsys.exists(&marker) {
        fsys.write_file(&marker, b"", 0o644).map_err(|err| DotkError::io(&marker, err))?;
    }
    Ok(marker)
}

/// `adopt`: move existing files into a pack, then re-run the symlink
/// handler so the original locations become links back into the pack.
pub fn adopt(
    fsys: &dyn FileSystem,
    paths: &ResolvedPaths,
    pack_name: &str,
    source_paths: &[PathBuf],
    runner: &dyn CommandRunner,
) -> Result<ExecutionContext> {
    let pack_dir = paths.source_root.join(pack_name);
    fsys.mkdir_all(&pack_dir, 0o755).map_err(|err| DotkError::io(&pack_dir, err))?;

    let mut adopted = Vec::new();
    for source in source_paths {
        let basename = source.file_name().ok_or_else(|| DotkError::InvalidInput {
            details: format!("{} has no file name component", source.display()),
        })?;
        let dest = pack_dir.join(basename);
        if fsys.exists(&dest) {
            return Err(DotkError::InvalidInput {
                details: format!("{} already exists in pack '{pack_name}'", dest.display()),
            });
        }
        let contents = fsys.read_file(source).map_err(|err| DotkError::io(source, err))?;
        fsys.write_file(&dest, &contents, 0o644).map_err(|err| DotkError::io(&dest, err))?;
        fsys.remove(source).map_err(|err| DotkError::io(source, err))?;
        adopted.push(RuleMatch {
            pack: pack_name.to_string(),
            relative_path: PathBuf::from(basename),
            absolute_path: dest,
            handler: "symlink".to_string(),
            options: BTreeMap::new(),
            priority: 0,
        });
    }

    let root = root_config(fsys, paths)?;
    let registry = build_registry(root.as_ref())?;
    let datastore = DataStore::new(fsys, paths.data_dir.clone());
    let options = ExecutionOptions {
        dry_run: false,
        force_rerun: false,
        allow_overwrite: true,
    };
    Ok(executor::execute_all(&adopted, &registry, fsys, &datastore, &paths.source_root, options, runner))
}

/// `gen-config`: serialize the built-in defaults, either returning the text
/// (for stdout) or writing it to `destination`.
pub fn gen_config(fsys: &dyn FileSystem, destination: Option<&Path>, force: bool) -> Result<String> {
    let text = Config::with_builtin_defaults().to_toml_string()?;
    if let Some(path) = destination {
        if fsys.exists(path) && !force {
            return Err(DotkError::FilesystemConflict {
                path: path.to_path_buf(),
                details: "refusing to overwrite an existing config file without --force".to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            fsys.mkdir_all(parent, 0o755).map_err(|err| DotkError::io(parent, err))?;
        }
        fsys.write_file(path, text.as_bytes(), 0o644).map_err(|err| DotkError::io(path, err))?;
    }
    Ok(text)
}

fn ensure_shell_init(fsys: &dyn FileSystem, paths: &ResolvedPaths) -> Result<()> {
    let init_path = paths.shell_init_path();
    if let Some(parent) = init_path.parent() {
        fsys.mkdir_all(parent, 0o755).map_err(|err| DotkError::io(parent, err))?;
    }
    let contents = render_shell_init(fsys, &paths.packs_dir());
    fsys.write_file(&init_path, contents.as_bytes(), 0o644)
        .map_err(|err| DotkError::io(&init_path, err))
}

fn render_shell_init(fsys: &dyn FileSystem, packs_dir: &Path) -> String {
    let mut lines = vec!["# generated by dotkeeper; do not edit by hand".to_string()];
    if let Ok(entries) = fsys.walk(packs_dir) {
        for entry in entries {
            if entry.kind != crate::fs::EntryKind::Symlink {
                continue;
            }
            let components: Vec<_> = entry.relative.components().collect();
            if components.len() < 3 {
                continue;
            }
            let handler = components[1].as_os_str().to_string_lossy();
            match handler.as_ref() {
                "shell" => lines.push(format!(
                    "[ -f '{path}' ] && . '{path}'",
                    path = entry.absolute.display()
                )),
                "path" => lines.push(format!("export PATH=\"{}:$PATH\"", entry.absolute.display())),
                _ => {}
            }
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    #![allow(unsafe_code)]

    use super::*;
    use crate::datastore::command::tests::ScriptedCommandRunner;
    use crate::fs::MemoryFileSystem;

    fn resolved(fsys: &MemoryFileSystem) -> ResolvedPaths {
        fsys.seed_dir("/src");
        fsys.seed_dir("/data");
        ResolvedPaths {
            source_root: PathBuf::from("/src"),
            source_root_is_fallback: false,
            data_dir: PathBuf::from("/data"),
        }
    }

    #[test]
    fn on_deploys_symlink_pack_and_writes_shell_init() {
        let fsys = MemoryFileSystem::new();
        let paths = resolved(&fsys);
        fsys.seed_file("/src/vim/.vimrc", "set nu");
        let runner = ScriptedCommandRunner::new(vec![]);
        unsafe {
            std::env::set_var("HOME", "/home/user");
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        let ctx = on(&fsys, &paths, &[], false, ExecutionOptions::default(), &runner).unwrap();
        assert!(ctx["vim"]["symlink"].error.is_none());
        assert!(fsys.exists(Path::new("/data/shell/init.sh")));
    }

    #[test]
    fn fill_respects_pack_rule_overrides() {
        let fsys = MemoryFileSystem::new();
        let paths = resolved(&fsys);
        fsys.seed_file(
            "/src/tools/dotkeeper.toml",
            "[[rules]]\npattern = \"setup.sh\"\nhandler = \"install\"\n",
        );
        fsys.seed_file("/src/tools/setup.sh", "echo hi");
        unsafe {
            std::env::set_var("HOME", "/home/user");
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        let written = fill(&fsys, &paths, "tools").unwrap();
        assert!(!written.iter().any(|p| p.ends_with("install.sh")));
        assert!(written.iter().any(|p| p.ends_with("Brewfile")));
    }

    #[test]
    fn gen_config_refuses_overwrite_without_force() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/dotkeeper.toml", "existing = true\n");
        let result = gen_config(&fsys, Some(Path::new("/src/dotkeeper.toml")), false);
        assert!(result.is_err());
    }

    #[test]
    fn gen_config_writes_with_force() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/src/dotkeeper.toml", "existing = true\n");
        gen_config(&fsys, Some(Path::new("/src/dotkeeper.toml")), true).unwrap();
        let text = String::from_utf8(fsys.read_file(Path::new("/src/dotkeeper.toml")).unwrap()).unwrap();
        assert!(text.contains("install.sh"));
    }

    #[test]
    fn add_ignore_creates_the_marker_and_excludes_the_pack() {
        let fsys = MemoryFileSystem::new();
        let paths = resolved(&fsys);
        fsys.seed_file("/src/scratch/notes.txt", "wip");
        let marker = add_ignore(&fsys, &paths, "scratch").unwrap();
        assert!(fsys.exists(&marker));
        let discovered = packs::discover(&fsys, &paths.source_root, &[]).unwrap();
        assert!(!discovered.iter().any(|p| p.name == "scratch"));
    }

    #[test]
    fn add_ignore_is_idempotent() {
        let fsys = MemoryFileSystem::new();
        let paths = resolved(&fsys);
        add_ignore(&fsys, &paths, "scratch").unwrap();
        add_ignore(&fsys, &paths, "scratch").unwrap();
        assert!(fsys.exists(&paths.source_root.join("scratch").join(packs::IGNORE_MARKER)));
    }

    #[test]
    fn off_runs_brew_bundle_cleanup_when_uninstall_is_requested() {
        let fsys = MemoryFileSystem::new();
        let paths = resolved(&fsys);
        fsys.seed_file("/src/tools/Brewfile", "brew 'jq'");
        unsafe {
            std::env::set_var("HOME", "/home/user");
            std::env::remove_var("XDG_CONFIG_HOME");
            std::env::set_var("DOTKEEPER_HOMEBREW_UNINSTALL", "1");
        }
        let runner = ScriptedCommandRunner::new(vec![
            Ok(crate::datastore::CommandOutcome { status: Some(0), stdout: vec![], stderr: vec![] }),
            Ok(crate::datastore::CommandOutcome { status: Some(0), stdout: vec![], stderr: vec![] }),
        ]);
        on(&fsys, &paths, &[], false, ExecutionOptions::default(), &runner).unwrap();

        let confirmer = crate::executor::AlwaysConfirm;
        let result = off(&fsys, &paths, &[], false, &confirmer, &runner);
        unsafe {
            std::env::remove_var("DOTKEEPER_HOMEBREW_UNINSTALL");
        }
        result.unwrap();
        assert_eq!(runner.calls()[0], "brew bundle --file='/src/tools/Brewfile'");
        assert_eq!(runner.calls()[1], "brew bundle cleanup --force --file='/src/tools/Brewfile'");
    }

    #[test]
    fn adopt_moves_file_into_pack_and_links_it_back() {
        let fsys = MemoryFileSystem::new();
        let paths = resolved(&fsys);
        fsys.seed_file("/home/user/.vimrc", "set nu");
        unsafe {
            std::env::set_var("HOME", "/home/user");
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        let runner = ScriptedCommandRunner::new(vec![]);
        let ctx = adopt(&fsys, &paths, "vim", &[PathBuf::from("/home/user/.vimrc")], &runner).unwrap();
        assert!(ctx["vim"]["symlink"].error.is_none());
        assert!(fsys.exists(Path::new("/src/vim/.vimrc")));
        assert!(fsys.lstat(Path::new("/home/user/.vimrc")).unwrap().is_symlink());
    }
}
