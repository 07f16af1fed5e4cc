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

const QUARTERLY: &str = "2023/03/01 ABC (1)  $ 100\n\
                         2023/06/01 ABC  $ 100\n\
                         2023/09/01 ABC  $ 100\n\
                         2023/12/01 ABC  $ 100\n";

#[test]
fn test_report_help() -> Result<()> {
    let output = Command::new(get_binary_path()).args(["report", "--help"]).output()?;

    assert!(output.status.success(), "report help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--period"));
    assert!(stdout.contains("--annual"));
    assert!(stdout.contains("--without-forecast"));
    assert!(stdout.contains("--as-currency"));

    Ok(())
}

#[test]
fn test_report_lists_transactions() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(dir.path(), "ledger.journal", QUARTERLY)?;

    let output = Command::new(get_binary_path())
        .args(["report", "--without-forecast"])
        .arg(&journal)
        .output()?;

    assert!(
        output.status.success(),
        "report failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2023/03/01"));
    assert!(stdout.contains("2023/12/01"));
    assert!(stdout.contains("$ 100"));
    assert!(stdout.contains("ABC"));

    Ok(())
}

#[test]
fn test_report_annual_totals() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(dir.path(), "ledger.journal", QUARTERLY)?;

    let output = Command::new(get_binary_path())
        .args(["report", "--annual", "--without-forecast"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2023"));
    assert!(stdout.contains("$ 400.00"));

    Ok(())
}

#[test]
fn test_report_sum() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(dir.path(), "ledger.journal", QUARTERLY)?;

    let output = Command::new(get_binary_path())
        .args(["report", "--sum", "--without-forecast"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("$ 400.00"));

    Ok(())
}

#[test]
fn test_report_by_ticker_filters() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(
        dir.path(),
        "ledger.journal",
        "2023/03/01 ABC (1)  $ 100\n\
         2023/03/02 DEF (1)  $ 50\n",
    )?;

    let output = Command::new(get_binary_path())
        .args(["report", "--without-forecast", "--by-ticker", "DEF"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DEF"));
    assert!(!stdout.contains("ABC"));

    Ok(())
}

#[test]
fn test_report_period_filters() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(dir.path(), "ledger.journal", QUARTERLY)?;

    let output = Command::new(get_binary_path())
        .args(["report", "--without-forecast", "--period", "2023-06"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2023/06/01"));
    assert!(!stdout.contains("2023/03/01"));
    assert!(!stdout.contains("2023/09/01"));

    Ok(())
}

#[test]
fn test_report_weight() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(
        dir.path(),
        "ledger.journal",
        "2023/03/01 ABC (1)  $ 75\n\
         2023/03/02 DEF (1)  $ 25\n",
    )?;

    let output = Command::new(get_binary_path())
        .args(["report", "--weight", "--without-forecast"])
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("75.00%"));
    assert!(stdout.contains("25.00%"));

    Ok(())
}

#[test]
fn test_stats_shows_overview() -> Result<()> {
    let dir = tempdir()?;
    let journal = write_journal(dir.path(), "ledger.journal", QUARTERLY)?;

    let output = Command::new(get_binary_path())
        .arg("stats")
        .arg(&journal)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ABC"));
    assert!(stdout.contains("2023/03/01 - 2023/12/01"));

    Ok(())
}

#[test]
fn test_convert_broker_export_to_journal() -> Result<()> {
    let dir = tempdir()?;
    let export = dir.path().join("transactions.csv");
    fs::write(
        &export,
        "Id\tDate\tTrade date\tValue date\tType\tTicker\tKind\tISIN\tCount\tRate\tInterest\tFees\tAmount\tCurrency\tValue\tResult\tTotal\tBalance\tExchange\tText\n\
         1\t2023-03-19\t2023-03-19\t2023-03-19\tUDB.\tTEL\t\t\t100\t0,77\t\t\t77,00\tDKK\t\t\t\t\t\tUDBYTTE TEL 0.77 DKK/SH\n",
    )?;
    let output_path = dir.path().join("ledger.journal");

    let output = Command::new(get_binary_path())
        .args(["convert", "--type", "nordnet"])
        .arg(&export)
        .arg("--output")
        .arg(&output_path)
        .output()?;

    assert!(
        output.status.success(),
        "convert failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let journal = fs::read_to_string(&output_path)?;
    assert!(journal.contains("2023/03/19 TEL (100)"));
    assert!(journal.contains("77.00 DKK"));
    assert!(journal.contains("@ 0.77 DKK"));

    Ok(())
}
