//! Stamps the reported version into the binary.
//!
//! `FSAUDIT_VERSION` is the release version (`VERSION` wins over the crate
//! version so packaging can pin it). `FSAUDIT_LONG_VERSION` adds the commit.

use std::env;
use std::process::Command;

fn commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

fn main() {
    let version = env::var("VERSION")
        .or_else(|_| env::var("CARGO_PKG_VERSION"))
        .unwrap_or_default();
    let commit = commit().unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=FSAUDIT_VERSION={}", version);
    println!("cargo:rustc-env=FSAUDIT_LONG_VERSION={} (commit {})", version, commit);

    println!("cargo:rerun-if-env-changed=VERSION");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
