#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Output, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use tempfile::TempDir;

use fsaudit::broker::LogCallback;
use fsaudit::config::BrokerConfig;
use fsaudit::producer::{ProducerSettings, RetryPolicy};

/// Isolated working directory for running the binary.
///
/// The process runs inside the temp dir with its config home redirected, so
/// configuration discovery only sees files the test wrote.
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` as a config file and return its path
    pub fn write_config(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a fake `/proc/<pid>/cmdline` below this environment
    pub fn write_cmdline(&self, pid: u32, cmdline: &[u8]) -> anyhow::Result<PathBuf> {
        let root = self.path().join("proc");
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("cmdline"), cmdline)?;
        Ok(root)
    }

    pub fn command(&self) -> Command {
        let mut cmd = assert_cmd::cargo_bin_cmd!("fsaudit");
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env_remove("RUST_LOG");
        cmd
    }

    /// Start the relay with piped stdio; the caller controls when stdin closes
    pub fn spawn(&self, args: &[&str]) -> anyhow::Result<Child> {
        let child = std::process::Command::new(env!("CARGO_BIN_EXE_fsaudit"))
            .args(args)
            .current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }
}

/// Send SIGINT (same as CTRL-C) to `pid`
#[cfg(unix)]
pub fn send_sigint(pid: u32) -> anyhow::Result<()> {
    let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
    if result != 0 {
        return Err(anyhow::anyhow!("Failed to send SIGINT to PID {}", pid));
    }
    Ok(())
}

/// Poll `child` until it exits or `timeout` passes; a child still running
/// at the deadline is killed and `None` is returned.
pub fn wait_with_timeout(mut child: Child, timeout: Duration) -> anyhow::Result<Option<Output>> {
    let start = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(Some(child.wait_with_output()?));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// One notification line as written by the interception layer
pub fn notification(pid: u32, operation: &str, path: &str, flags: &[&str]) -> String {
    serde_json::json!({
        "pid": pid,
        "operation": operation,
        "path": path,
        "flags": flags,
    })
    .to_string()
}

/// Pid that cannot belong to a live process
pub const MISSING_PID: u32 = u32::MAX;

pub fn settings(entries: &[(&str, &str)], max_attempts: u32) -> ProducerSettings {
    let mut config = BrokerConfig::default();
    for (key, value) in entries {
        config.insert(*key, *value);
    }
    ProducerSettings {
        brokers: "broker-1:9092,broker-2:9092".to_string(),
        topic: "logs".to_string(),
        config,
        log_level: log::LevelFilter::Debug,
        retry: RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO),
    }
}

pub fn silent_logger() -> LogCallback {
    Arc::new(|_level: log::Level, _facility: &str, _message: &str| {})
}
