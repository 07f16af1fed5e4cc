use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use tempfile::tempdir;

fn get_binary_path() -> String {
    "./target/debug/dividend-ledger".to_string()
}

fn write_journal(dir: &Path, name: &str, content: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

#[test]
fn test_print_help() -> Result<()> {
    let output = Command::new(get_binary_path()).args(["print", "--help"]).output()?;

    assert!(output.status.success(), "print help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--condensed"));
    assert!(stdout.contains("--descending"));
    assert!(stdout.contains("--json"));

    Ok(())
}

#[test]
fn test_print_round_trips_a_journal() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(
        dir.path(),
        "ledger.journal",
        "2019/02/14 AAPL (100)  $ 73  @ $ 0.73\n\
         2019/05/16 AAPL  $ 77  @ $ 0.77\n",
    )?;

    let output = Command::new(get_binary_path())
        .arg("print")
        .arg(&journal)
        .output()?;

    assert!(
        output.status.success(),
        "print failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2019/02/14 AAPL (100)"));
    assert!(stdout.contains("$ 73 @ $ 0.73"));
    assert!(stdout.contains("2019/05/16 AAPL (100)"));

    Ok(())
}

#[test]
fn test_print_condensed() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(
        dir.path(),
        "ledger.journal",
        "2019/02/14 AAPL (100)  $ 73  @ $ 0.73\n",
    )?;

    let output = Command::new(get_binary_path())
        .args(["print", "--condensed"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2019/02/14 AAPL (100) $ 73 @ $ 0.73"));

    Ok(())
}

#[test]
fn test_print_json() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(
        dir.path(),
        "ledger.journal",
        "2019/02/14 AAPL (100)  $ 73  @ $ 0.73\n",
    )?;

    let output = Command::new(get_binary_path())
        .args(["print", "--json"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"ticker\": \"AAPL\""));
    assert!(stdout.contains("\"position\": 100.0"));

    Ok(())
}

#[test]
fn test_parse_error_exits_nonzero_with_location() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(
        dir.path(),
        "broken.journal",
        "2019/02/14 AAPL (100)  73\n",
    )?;

    let output = Command::new(get_binary_path())
        .arg("print")
        .arg(&journal)
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.journal:1"));
    assert!(stderr.contains("missing symbol definition"));

    Ok(())
}

#[test]
fn test_missing_journal_exits_nonzero() -> Result<()> {
    let output = Command::new(get_binary_path())
        .args(["print", "/nonexistent/ledger.journal"])
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("journal not found"));

    Ok(())
}

#[test]
fn test_include_directive_merges_journals() -> Result<()> {
    let dir = tempdir()?;
    write_journal(dir.path(), "other.journal", "2019/01/01 DEF (5)  $ 5\n")?;
    let journal = write_journal(
        dir.path(),
        "ledger.journal",
        "include other.journal\n2019/02/14 AAPL (100)  $ 73\n",
    )?;

    let output = Command::new(get_binary_path())
        .arg("print")
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DEF"));
    assert!(stdout.contains("AAPL"));

    Ok(())
}
