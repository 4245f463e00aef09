#![cfg(unix)]

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

fn cmdbridge(root: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("cmdbridge")?;
    cmd.env_remove("CMDBRIDGE_ROOT")
        .env_remove("CMDBRIDGE_FORCE_QUOTE")
        .env_remove("CMDBRIDGE_TIMEOUT")
        .env_remove("RUST_LOG")
        .arg("--root")
        .arg(root);
    Ok(cmd)
}

#[test]
fn prints_stdout_of_successful_target() -> Result<()> {
    let root = TempDir::new()?;
    write_script(root.path(), "echo.exe", "printf '%s|' \"$@\"; echo")?;

    cmdbridge(root.path())?
        .args(["-b", r#"["hello world"]"#, "-q", "-mode=fast"])
        .arg("echo.exe")
        .arg("a\"b")
        .assert()
        .success()
        .stdout("hello world|a\"b|-mode|fast|\n");

    Ok(())
}

#[test]
fn dry_run_prints_the_command_line() -> Result<()> {
    let root = TempDir::new()?;

    cmdbridge(root.path())?
        .args(["--dry-run", "--force-quote", "run.bat", "plain", "1 & 2"])
        .assert()
        .success()
        .stdout("\"plain\" \"1 & 2\"\n");

    Ok(())
}

#[test]
fn query_values_are_percent_decoded() -> Result<()> {
    let root = TempDir::new()?;

    cmdbridge(root.path())?
        .args(["-n", "-q", "-title=two%20words&-tag=a+b", "-q", "tail", "run.exe"])
        .assert()
        .success()
        .stdout("-title \"two words\" -tag \"a b\" tail\n");

    Ok(())
}

#[test]
fn failing_target_reports_stderr_and_exit_code() -> Result<()> {
    let root = TempDir::new()?;
    write_script(root.path(), "fail.exe", "echo visible; echo broken >&2; exit 4")?;

    cmdbridge(root.path())?
        .arg("fail.exe")
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("broken"));

    Ok(())
}

#[test]
fn stderr_output_fails_even_with_zero_exit() -> Result<()> {
    let root = TempDir::new()?;
    write_script(root.path(), "warn.exe", "echo careful >&2")?;

    cmdbridge(root.path())?
        .args(["--async", "warn.exe"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("careful"));

    Ok(())
}

#[test]
fn timeout_exits_with_124() -> Result<()> {
    let root = TempDir::new()?;
    write_script(root.path(), "slow.exe", "exec sleep 10")?;

    cmdbridge(root.path())?
        .args(["--timeout", "1", "slow.exe"])
        .assert()
        .code(124)
        .stderr(predicate::str::contains("\"slow.exe\" timed out in 1 seconds"));

    Ok(())
}

#[test]
fn scripts_outside_the_root_are_rejected() -> Result<()> {
    let root = TempDir::new()?;

    cmdbridge(root.path())?
        .arg("../escape.exe")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("escapes the script root"));

    Ok(())
}

#[test]
fn missing_target_exits_with_127() -> Result<()> {
    let root = TempDir::new()?;

    cmdbridge(root.path())?
        .arg("absent.exe")
        .assert()
        .code(127)
        .stderr(predicate::str::contains("Failed to start"));

    Ok(())
}

#[test]
fn malformed_body_is_an_argument_error() -> Result<()> {
    let root = TempDir::new()?;

    cmdbridge(root.path())?
        .args(["--body", "{not json", "run.exe"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid request body"));

    Ok(())
}

#[test]
fn missing_root_is_reported() -> Result<()> {
    let root = TempDir::new()?;
    let missing = root.path().join("nowhere");

    cmdbridge(&missing)?
        .arg("run.exe")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Script root directory not found"));

    Ok(())
}
