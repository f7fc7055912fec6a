//! Shared test infrastructure: a `dotk` binary runner for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_dotk") {
        let p = PathBuf::from(path);
        if p.exists() {
            return p;
        }
    }

    let exe_name = if cfg!(windows) { "dotk.exe" } else { "dotk" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!(
            "unable to resolve dotk binary path for integration test (checked CARGO_BIN_EXE_dotk and debug sibling path)"
        ),
    }
}

/// A fake home/source-root/data-dir triple for one test case.
pub struct TestEnvironment {
    pub root: tempfile::TempDir,
    pub source_root: PathBuf,
    pub data_dir: PathBuf,
    pub home: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp test root");
        let source_root = root.path().join("dotfiles");
        let data_dir = root.path().join("data");
        let home = root.path().join("home");
        fs::create_dir_all(&source_root).expect("create source root");
        fs::create_dir_all(&data_dir).expect("create data dir");
        fs::create_dir_all(&home).expect("create home dir");
        Self {
            root,
            source_root,
            data_dir,
            home,
        }
    }

    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(resolve_bin_path());
        cmd.args(args)
            .env("DOTFILES_ROOT", &self.source_root)
            .env("DOTKEEPER_DATA_DIR", &self.data_dir)
            .env("HOME", &self.home)
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("XDG_DATA_HOME");
        cmd
    }

    pub fn run(&self, case_name: &str, args: &[&str]) -> CmdResult {
        let log_root = std::env::temp_dir().join("dotk-test-logs");
        fs::create_dir_all(&log_root).expect("create temp test log dir");
        let log_path = log_root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));

        let output = self.command(args).output().expect("execute dotk command");
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let mut log_content = format!("case={case_name}\nargs={args:?}\nstatus={}\n", output.status);
        log_content.push_str("----- stdout -----\n");
        log_content.push_str(&stdout);
        log_content.push_str("\n----- stderr -----\n");
        log_content.push_str(&stderr);
        fs::write(&log_path, log_content).expect("write test log");

        CmdResult {
            status: output.status,
            stdout,
            stderr,
            log_path,
        }
    }
}
