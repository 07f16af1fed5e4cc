use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;

use crate::encoding;
use crate::errors::{LedgerError, Result};
use crate::format::{decimal_places_str, parse_number, DecimalSeparator};
use crate::models::{is_close, Amount, Origin, Transaction};

// Importer for the tab-separated broker export format. Rows describe paid
// out dividends with entry/ex/payout dates, position, per-share dividend and
// a settled total amount; the free-text description carries the dividend's
// own currency and per-share rate.

// column layout of the broker export
const COLUMN_ENTRY_DATE: usize = 1;
const COLUMN_EX_DATE: usize = 2;
const COLUMN_PAYOUT_DATE: usize = 3;
const COLUMN_TYPE: usize = 4;
const COLUMN_TICKER: usize = 5;
const COLUMN_POSITION: usize = 8;
const COLUMN_DIVIDEND: usize = 9;
const COLUMN_AMOUNT: usize = 12;
const COLUMN_AMOUNT_SYMBOL: usize = 13;
const COLUMN_TEXT: usize = 19;

// row type marking a dividend payout
const DIVIDEND_TYPE: &str = "UDB.";

/// Read dividend transactions from a tab-separated broker export.
pub fn read_broker_transactions(path: &Path, today: NaiveDate) -> Result<Vec<Transaction>> {
    let text = encoding::read_to_string(path)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records: Vec<Transaction> = Vec::new();

    for (index, row) in reader.records().enumerate() {
        let line = index + 2; // header occupies the first line
        let row = row.map_err(|e| LedgerError::parse(path, line, format!("invalid row: {e}")))?;

        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        if row.get(COLUMN_TYPE).map(str::trim) != Some(DIVIDEND_TYPE) {
            continue;
        }

        let record = read_broker_transaction(path, line, &row, today)?;

        // two rows identical but for the amount's sign describe a payout and
        // its reversal; both are dropped from any sane journal
        let reverted = records.iter().any(|previous| {
            previous.entry_date == record.entry_date
                && previous.ticker == record.ticker
                && is_close(
                    previous.amount.as_ref().map_or(0.0, |a| a.value),
                    -record.amount.as_ref().map_or(0.0, |a| a.value),
                    1e-6,
                )
        });
        if reverted {
            return Err(LedgerError::parse(path, line, "reverted transaction pair"));
        }

        records.push(record);
    }

    Ok(records)
}

fn field<'a>(
    path: &Path,
    line: usize,
    row: &'a csv::StringRecord,
    column: usize,
) -> Result<&'a str> {
    row.get(column)
        .map(str::trim)
        .ok_or_else(|| LedgerError::parse(path, line, format!("missing column {column}")))
}

fn read_broker_transaction(
    path: &Path,
    line: usize,
    row: &csv::StringRecord,
    today: NaiveDate,
) -> Result<Transaction> {
    let parse_date = |value: &str, name: &str| -> Result<NaiveDate> {
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| LedgerError::parse(path, line, format!("invalid {name} ('{value}')")))?;
        if date > today {
            return Err(LedgerError::parse(
                path,
                line,
                format!("{name} set in future ({value})"),
            ));
        }
        Ok(date)
    };

    let entry_date = parse_date(field(path, line, row, COLUMN_ENTRY_DATE)?, "entry date")?;
    let ex_date = parse_date(field(path, line, row, COLUMN_EX_DATE)?, "ex-dividend date")?;
    let payout_date = parse_date(field(path, line, row, COLUMN_PAYOUT_DATE)?, "payout date")?;

    let ticker = field(path, line, row, COLUMN_TICKER)?.to_string();

    // numbers use comma-decimal notation; dot thousand-separators are
    // stripped outright so '1.500' reads as 1500
    let position_str = field(path, line, row, COLUMN_POSITION)?.replace('.', "");
    let amount_str = field(path, line, row, COLUMN_AMOUNT)?.replace('.', "");
    let dividend_str = field(path, line, row, COLUMN_DIVIDEND)?.replace('.', "");

    let position = parse_number(&position_str, DecimalSeparator::Comma).ok_or_else(|| {
        LedgerError::parse(path, line, format!("invalid position ('{position_str}')"))
    })?;
    let amount = parse_number(&amount_str, DecimalSeparator::Comma).ok_or_else(|| {
        LedgerError::parse(path, line, format!("invalid amount ('{amount_str}')"))
    })?;
    let dividend = parse_number(&dividend_str, DecimalSeparator::Comma).ok_or_else(|| {
        LedgerError::parse(path, line, format!("invalid dividend ('{dividend_str}')"))
    })?;

    let amount_symbol = field(path, line, row, COLUMN_AMOUNT_SYMBOL)?.to_string();
    let text = field(path, line, row, COLUMN_TEXT)?;

    // the description trails off with the per-share rate and its currency,
    // e.g. "... DIVIDEND 0.77 USD/SH"; occasionally split as "USD /SH"
    let components: Vec<&str> = text.split_whitespace().collect();
    let nth_last = |n: usize| -> Option<&str> {
        components.len().checked_sub(n).map(|i| components[i])
    };
    let (dividend_symbol, dividend_rate_str) =
        if components.last().map_or(false, |last| last.starts_with('/')) {
            (nth_last(2), nth_last(3))
        } else {
            (
                components.last().and_then(|last| last.split('/').next()),
                nth_last(2),
            )
        };

    let (Some(dividend_symbol), Some(dividend_rate_str)) = (dividend_symbol, dividend_rate_str)
    else {
        return Err(LedgerError::parse(path, line, "unexpected transaction text"));
    };

    // the rate is period-decimal; a stray comma is assumed an error
    let dividend_rate_str = dividend_rate_str.replace(',', ".");
    let dividend_rate = parse_number(&dividend_rate_str, DecimalSeparator::Period)
        .ok_or_else(|| LedgerError::parse(path, line, "unexpected transaction text"))?;

    if dividend != dividend_rate {
        return Err(LedgerError::parse(
            path,
            line,
            format!("ambiguous dividend ({dividend} or {dividend_rate}?)"),
        ));
    }

    Ok(Transaction {
        entry_date,
        ticker,
        position,
        amount: Some(Amount::literal(
            amount,
            Some(decimal_places_str(&amount_str, DecimalSeparator::Comma)),
            Some(amount_symbol.clone()),
            Some(format!("%s {amount_symbol}")),
        )),
        dividend: Some(Amount::literal(
            dividend,
            Some(decimal_places_str(&dividend_str, DecimalSeparator::Comma)),
            Some(dividend_symbol.to_string()),
            Some(format!("%s {dividend_symbol}")),
        )),
        kind: Default::default(),
        payout_date: Some(payout_date),
        ex_date: Some(ex_date),
        tags: Vec::new(),
        entry_attr: None,
        origin: Origin::Literal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    const HEADER: &str = "Id\tBogføringsdag\tHandelsdag\tValørdag\tTransaktionstype\tVærdipapirer\tVærdipapirtype\tISIN\tAntal\tKurs\tRente\tSamlede afgifter\tBeløb\tValuta\tIndkøbsværdi\tResultat\tTotalt antal\tSaldo\tVekslingskurs\tTransaktionstekst\n";

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn export(rows: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("transactions.csv");
        let mut content = HEADER.to_string();
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(&path, content).expect("write export");
        (dir, path)
    }

    fn row(
        entry: &str,
        ticker: &str,
        position: &str,
        dividend: &str,
        amount: &str,
        text: &str,
    ) -> String {
        format!(
            "1\t{entry}\t{entry}\t{entry}\tUDB.\t{ticker}\t\t\t{position}\t{dividend}\t\t\t{amount}\tDKK\t\t\t\t\t\t{text}"
        )
    }

    #[test]
    fn test_read_broker_transaction() {
        let (_dir, path) = export(&[&row(
            "2019-03-19",
            "TEL",
            "100",
            "0,77",
            "77,00",
            "UDBYTTE TEL 0.77 DKK/SH",
        )]);
        let records = read_broker_transactions(&path, ymd(2019, 12, 31)).expect("import");

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.entry_date, ymd(2019, 3, 19));
        assert_eq!(record.ticker, "TEL");
        assert_eq!(record.position, 100.0);
        assert_eq!(record.amount.as_ref().unwrap().value, 77.0);
        assert_eq!(record.amount.as_ref().unwrap().symbol.as_deref(), Some("DKK"));
        assert_eq!(record.dividend.as_ref().unwrap().value, 0.77);
        assert_eq!(record.payout_date, Some(ymd(2019, 3, 19)));
        assert_eq!(record.ex_date, Some(ymd(2019, 3, 19)));
    }

    #[test]
    fn test_thousands_separators_are_stripped() {
        let (_dir, path) = export(&[&row(
            "2019-03-19",
            "TEL",
            "1.500",
            "1,00",
            "1.500,00",
            "UDBYTTE TEL 1.00 DKK/SH",
        )]);
        let records = read_broker_transactions(&path, ymd(2019, 12, 31)).expect("import");
        assert_eq!(records[0].position, 1500.0);
        assert_eq!(records[0].amount.as_ref().unwrap().value, 1500.0);
    }

    #[test]
    fn test_split_currency_suffix() {
        let (_dir, path) = export(&[&row(
            "2019-03-19",
            "TEL",
            "100",
            "0,77",
            "77,00",
            "UDBYTTE TEL 0.77 DKK /SH",
        )]);
        let records = read_broker_transactions(&path, ymd(2019, 12, 31)).expect("import");
        assert_eq!(
            records[0].dividend.as_ref().unwrap().symbol.as_deref(),
            Some("DKK")
        );
    }

    #[test]
    fn test_non_dividend_rows_are_skipped() {
        let (_dir, path) = export(&[
            "2\t2019-03-01\t2019-03-01\t2019-03-01\tKØBT\tTEL\t\t\t100\t\t\t\t-5000,00\tDKK\t\t\t\t\t\t",
            &row(
                "2019-03-19",
                "TEL",
                "100",
                "0,77",
                "77,00",
                "UDBYTTE TEL 0.77 DKK/SH",
            ),
        ]);
        let records = read_broker_transactions(&path, ymd(2019, 12, 31)).expect("import");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_future_dated_entry_is_an_error() {
        let (_dir, path) = export(&[&row(
            "2019-03-19",
            "TEL",
            "100",
            "0,77",
            "77,00",
            "UDBYTTE TEL 0.77 DKK/SH",
        )]);
        let err = read_broker_transactions(&path, ymd(2019, 3, 18)).unwrap_err();
        assert!(err.to_string().contains("set in future"));
    }

    #[test]
    fn test_ambiguous_dividend_is_an_error() {
        let (_dir, path) = export(&[&row(
            "2019-03-19",
            "TEL",
            "100",
            "0,77",
            "77,00",
            "UDBYTTE TEL 0.88 DKK/SH",
        )]);
        let err = read_broker_transactions(&path, ymd(2019, 12, 31)).unwrap_err();
        assert!(err.to_string().contains("ambiguous dividend"));
    }

    #[test]
    fn test_reverted_pair_is_an_error() {
        let (_dir, path) = export(&[
            &row(
                "2019-03-19",
                "TEL",
                "100",
                "0,77",
                "77,00",
                "UDBYTTE TEL 0.77 DKK/SH",
            ),
            &row(
                "2019-03-19",
                "TEL",
                "100",
                "0,77",
                "-77,00",
                "UDBYTTE TEL 0.77 DKK/SH",
            ),
        ]);
        let err = read_broker_transactions(&path, ymd(2019, 12, 31)).unwrap_err();
        assert!(err.to_string().contains("reverted transaction pair"));
    }
}
