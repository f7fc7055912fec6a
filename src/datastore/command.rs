//! Subprocess execution for `RunCommand` operations, behind a trait so
//! install/homebrew provisioning can be exercised in tests without
//! actually invoking `sh`.

use std::path::Path;
use std::process::Command;

/// Result of running a single command line.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Executes a shell command line in a working directory.
pub trait CommandRunner {
    fn run(&self, command: &str, cwd: &Path) -> std::io::Result<CommandOutcome>;
}

/// Runs `sh -c <command>` inheriting the process environment, as specified
/// for `RunCommand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCommandRunner;

impl CommandRunner for RealCommandRunner {
    fn run(&self, command: &str, cwd: &Path) -> std::io::Result<CommandOutcome> {
        let output = Command::new("sh").arg("-c").arg(command).current_dir(cwd).output()?;
        Ok(CommandOutcome {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
