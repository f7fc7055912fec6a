//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::{control, Colorize};
use thiserror::Error;

use dotkeeper::core::paths::ResolvedPaths;
use dotkeeper::datastore::RealCommandRunner;
use dotkeeper::executor::{Confirmer, ExecutionContext, ExecutionOptions, OperationOutcome};
use dotkeeper::fs::RealFileSystem;
use dotkeeper::logger::jsonl::{EventType, JsonlWriter, LogEvent, Severity};
use dotkeeper::pipeline;

/// dotkeeper — a stateless dotfiles manager.
#[derive(Debug, Parser)]
#[command(
    name = "dotk",
    author,
    version,
    about = "dotkeeper - stateless dotfiles manager",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Show what would happen without touching the filesystem.
    #[arg(long, global = true)]
    dry_run: bool,
    /// Allow overwriting existing files/re-running recorded commands.
    #[arg(long, global = true)]
    force: bool,
    /// Increase verbosity (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Deploy packs: link dotfiles, install PATH entries, run provisioning scripts.
    On(PackSelectionArgs),
    /// Clear recorded state for packs. Never touches source files.
    Off(OffArgs),
    /// Report the deployment status of every matched file.
    Status(PackSelectionArgs),
    /// Create a new empty pack with one template file per handler.
    Init(PackNameArgs),
    /// Add template files for handlers the pack has no files for yet.
    Fill(PackNameArgs),
    /// Move existing files into a pack and link them back into place.
    Adopt(AdoptArgs),
    /// Mark a pack as ignored so discovery skips it entirely.
    AddIgnore(PackNameArgs),
    /// Print (or write) the built-in default configuration as TOML.
    GenConfig(GenConfigArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct PackSelectionArgs {
    /// Packs to operate on (defaults to every pack under the source root).
    #[arg(value_name = "PACK")]
    packs: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct OffArgs {
    #[arg(value_name = "PACK")]
    packs: Vec<String>,
    /// Skip the confirmation prompt for handlers that require one.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Clone, Args)]
struct PackNameArgs {
    #[arg(value_name = "PACK")]
    pack: String,
}

#[derive(Debug, Clone, Args)]
struct AdoptArgs {
    #[arg(value_name = "PACK")]
    pack: String,
    /// Existing files/directories to move into the pack.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct GenConfigArgs {
    /// Write the pack-local config file for PACK instead of printing to stdout.
    #[arg(long, value_name = "PACK", conflicts_with = "root")]
    pack: Option<String>,
    /// Write the root-level config file instead of printing to stdout.
    #[arg(long, conflicts_with = "pack")]
    root: bool,
}

/// CLI error type with an explicit exit-code contract.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    User(String),
    #[error("{0}")]
    Runtime(String),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
        }
    }
}

impl From<dotkeeper::core::errors::DotkError> for CliError {
    fn from(value: dotkeeper::core::errors::DotkError) -> Self {
        Self::Runtime(value.to_string())
    }
}

/// Prompts on stdin unless `--yes` was given, in which case every
/// confirmation is accepted without asking.
struct StdinConfirmer {
    assume_yes: bool,
}

impl Confirmer for StdinConfirmer {
    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !io::stdin().is_terminal() {
            return false;
        }
        print!("{message} [y/N] ");
        let _ = io::stdout().flush();
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }
    let fsys = RealFileSystem;
    let paths = ResolvedPaths::resolve()?;
    if paths.source_root_is_fallback && cli.verbose > 0 {
        eprintln!(
            "{}",
            format!(
                "warning: no DOTFILES_ROOT or git ancestor found; using {} as the source root",
                paths.source_root.display()
            )
            .yellow()
        );
    }

    match &cli.command {
        Command::On(args) => run_on(cli, &fsys, &paths, args),
        Command::Off(args) => run_off(cli, &fsys, &paths, args),
        Command::Status(args) => run_status(&fsys, &paths, args),
        Command::Init(args) => run_init(&fsys, &paths, args),
        Command::Fill(args) => run_fill(&fsys, &paths, args),
        Command::Adopt(args) => run_adopt(cli, &fsys, &paths, args),
        Command::AddIgnore(args) => run_add_ignore(&fsys, &paths, args),
        Command::GenConfig(args) => run_gen_config(cli, &fsys, &paths, args),
    }
}

fn execution_options(cli: &Cli) -> ExecutionOptions {
    ExecutionOptions {
        dry_run: cli.dry_run,
        force_rerun: cli.force,
        allow_overwrite: cli.force,
    }
}

fn run_on(
    cli: &Cli,
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &PackSelectionArgs,
) -> Result<(), CliError> {
    let runner = RealCommandRunner;
    let ctx = pipeline::on(
        fsys,
        paths,
        &args.packs,
        false,
        execution_options(cli),
        &runner,
    )?;
    log_execution_context(paths, cli.verbose, "on", &ctx);
    print_execution_context(&ctx);
    Ok(())
}

fn run_off(
    cli: &Cli,
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &OffArgs,
) -> Result<(), CliError> {
    let confirmer = StdinConfirmer {
        assume_yes: args.yes,
    };
    let runner = RealCommandRunner;
    let report = pipeline::off(fsys, paths, &args.packs, cli.dry_run, &confirmer, &runner)?;
    if cli.verbose >= 2 {
        let mut writer = JsonlWriter::open(paths.data_dir.join("events.jsonl"));
        writer.write_event(&LogEvent::new(EventType::PipelineStart, Severity::Info).message("off"));
        for (pack, cleared) in &report {
            for line in cleared {
                writer.write_event(
                    &LogEvent::new(EventType::StateCleared, Severity::Info)
                        .pack(pack)
                        .message(line.clone()),
                );
            }
        }
        writer
            .write_event(&LogEvent::new(EventType::PipelineComplete, Severity::Info).message("off"));
    }
    for (pack, cleared) in &report {
        if cleared.is_empty() {
            continue;
        }
        println!("{}", pack.bold());
        for line in cleared {
            println!("  {line}");
        }
    }
    Ok(())
}

fn run_status(
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &PackSelectionArgs,
) -> Result<(), CliError> {
    let report = pipeline::status(fsys, paths, &args.packs)?;
    for (pack, files) in &report {
        println!("{}", pack.bold());
        for (path, status) in files {
            let (marker, text) = match status {
                dotkeeper::handlers::StatusResult::Ready(msg) => ("✓".green(), msg),
                dotkeeper::handlers::StatusResult::Pending(msg) => ("○".yellow(), msg),
                dotkeeper::handlers::StatusResult::Error(msg) => ("✗".red(), msg),
            };
            println!("  {marker} {} — {text}", path.display());
        }
    }
    Ok(())
}

fn run_init(
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &PackNameArgs,
) -> Result<(), CliError> {
    let written = pipeline::init(fsys, paths, &args.pack)?;
    print_written(&written);
    Ok(())
}

fn run_fill(
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &PackNameArgs,
) -> Result<(), CliError> {
    let written = pipeline::fill(fsys, paths, &args.pack)?;
    print_written(&written);
    Ok(())
}

fn run_adopt(
    cli: &Cli,
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &AdoptArgs,
) -> Result<(), CliError> {
    let runner = RealCommandRunner;
    let ctx = pipeline::adopt(fsys, paths, &args.pack, &args.paths, &runner)?;
    log_execution_context(paths, cli.verbose, "adopt", &ctx);
    print_execution_context(&ctx);
    Ok(())
}

fn run_add_ignore(fsys: &RealFileSystem, paths: &ResolvedPaths, args: &PackNameArgs) -> Result<(), CliError> {
    let marker = pipeline::add_ignore(fsys, paths, &args.pack)?;
    println!("{} {}", "created".green(), marker.display());
    Ok(())
}

fn run_gen_config(
    cli: &Cli,
    fsys: &RealFileSystem,
    paths: &ResolvedPaths,
    args: &GenConfigArgs,
) -> Result<(), CliError> {
    let destination = if args.root {
        Some(paths.root_config_path())
    } else {
        args.pack
            .as_ref()
            .map(|pack| paths.source_root.join(pack).join(dotkeeper::packs::PACK_CONFIG_CANDIDATES[0]))
    };
    let text = pipeline::gen_config(fsys, destination.as_deref(), cli.force)?;
    match &destination {
        None => print!("{text}"),
        Some(path) => println!("wrote {}", path.display()),
    }
    Ok(())
}

fn print_written(paths: &[PathBuf]) {
    if paths.is_empty() {
        println!("nothing to do");
        return;
    }
    for path in paths {
        println!("{} {}", "created".green(), path.display());
    }
}

/// Replays an already-computed `ExecutionContext` onto the event log. Only
/// active at `-vv` and above; a CLI run that never asked for tracing never
/// touches `events.jsonl`.
fn log_execution_context(paths: &ResolvedPaths, verbose: u8, command: &str, ctx: &ExecutionContext) {
    if verbose < 2 {
        return;
    }
    let mut writer = JsonlWriter::open(paths.data_dir.join("events.jsonl"));
    writer.write_event(&LogEvent::new(EventType::PipelineStart, Severity::Info).message(command));
    for (pack, handlers) in ctx {
        for (handler, outcome) in handlers {
            if let Some(error) = &outcome.error {
                writer.write_event(
                    &LogEvent::new(EventType::HandlerError, Severity::Error)
                        .pack(pack)
                        .handler(handler)
                        .message(error),
                );
                continue;
            }
            for item in &outcome.outcomes {
                let (event_type, message) = match item {
                    OperationOutcome::Applied(msg) => (EventType::OperationApplied, msg),
                    OperationOutcome::Simulated(msg) => (EventType::OperationSimulated, msg),
                    OperationOutcome::Skipped(msg) => (EventType::OperationSkipped, msg),
                };
                writer.write_event(
                    &LogEvent::new(event_type, Severity::Info)
                        .pack(pack)
                        .handler(handler)
                        .message(message.clone()),
                );
            }
        }
    }
    writer.write_event(&LogEvent::new(EventType::PipelineComplete, Severity::Info).message(command));
}

fn print_execution_context(ctx: &ExecutionContext) {
    for (pack, handlers) in ctx {
        println!("{}", pack.bold());
        for (handler, outcome) in handlers {
            if let Some(error) = &outcome.error {
                println!("  {} {handler}: {error}", "✗".red());
                continue;
            }
            for item in &outcome.outcomes {
                let (marker, text) = match item {
                    OperationOutcome::Applied(msg) => ("+".green(), msg),
                    OperationOutcome::Simulated(msg) => ("~".yellow(), msg),
                    OperationOutcome::Skipped(msg) => ("=".dimmed(), msg),
                };
                println!("  {marker} {handler}: {text}");
            }
        }
    }
}
