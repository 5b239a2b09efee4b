//! Common test utilities for quick integration tests
//!
//! Every invocation gets its own empty config directory so a user's
//! `config.toml` can't leak into the assertions.

#![allow(dead_code)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Exit status codes matching the binary
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;

/// Options that turn benchmark mode on for a short run
pub const BENCH_ARGS: &[&str] = &["--bm-duration", "300ms", "--bm-conn", "1", "--bm-req-per-conn", "1"];

/// Benchmark arguments followed by `extra`
pub fn bench_args<'a>(extra: &[&'a str]) -> Vec<&'a str> {
    let mut args: Vec<&str> = BENCH_ARGS.to_vec();
    args.extend_from_slice(extra);
    args
}

/// Isolated environment for running the binary
pub struct TestEnv {
    config_home: TempDir,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            config_home: TempDir::new().expect("Failed to create temp config dir"),
        }
    }

    /// Write `<config home>/quick/config.toml`
    pub fn write_config(&self, content: &str) -> PathBuf {
        let dir = self.config_home.path().join("quick");
        std::fs::create_dir_all(&dir).expect("Failed to create config dir");
        let path = dir.join("config.toml");
        std::fs::write(&path, content).expect("Failed to write config");
        path
    }

    pub fn config_home(&self) -> &Path {
        self.config_home.path()
    }

    /// A `quick` command with the given arguments
    pub fn quick<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::cargo_bin("quick").expect("binary not built");
        cmd.env("XDG_CONFIG_HOME", self.config_home.path())
            .env("HOME", self.config_home.path())
            .env_remove("RUST_LOG")
            .args(args)
            .timeout(std::time::Duration::from_secs(20));
        cmd
    }
}
