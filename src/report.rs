use std::io::{self, Write};
use std::path::Path;

use chrono::Datelike;
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::format::{format_amount, DecimalSeparator};
use crate::models::{Amount, Transaction};
use crate::rates::ExchangeRates;
use crate::records::{by_ticker, earliest, income, latest, monthly, tickers, yearly};

// Report rendering. Reports consume the final, canonically ordered sequence
// of realized transactions; forecasted rows and estimated amounts are marked
// with a tilde. Sums are kept per currency; amounts in different symbols are
// never added together.

/// Render an amount using its stored format template.
pub fn display_amount(amount: &Amount, separator: DecimalSeparator) -> String {
    let value = format_amount(amount.value, amount.places, true, separator);
    match &amount.fmt {
        Some(fmt) => fmt.replace("%s", &value),
        None => match &amount.symbol {
            Some(symbol) => format!("{value} {symbol}"),
            None => value,
        },
    }
}

fn income_by_symbol(records: &[Transaction]) -> Vec<(Option<String>, f64, Option<String>)> {
    let mut totals: Vec<(Option<String>, f64, Option<String>)> = Vec::new();
    for record in records {
        let Some(amount) = &record.amount else {
            continue;
        };
        match totals.iter_mut().find(|(symbol, _, _)| *symbol == amount.symbol) {
            Some((_, total, _)) => *total += amount.value,
            None => totals.push((amount.symbol.clone(), amount.value, amount.fmt.clone())),
        }
    }
    totals
}

fn display_total(
    symbol: &Option<String>,
    total: f64,
    fmt: &Option<String>,
    separator: DecimalSeparator,
) -> String {
    let amount = Amount {
        value: total,
        places: Some(2),
        symbol: symbol.clone(),
        fmt: fmt.clone(),
        origin: Default::default(),
    };
    display_amount(&amount, separator)
}

/// Print transactions chronologically, one row per payout.
pub fn print_chronological(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    let width = records
        .iter()
        .filter_map(|r| r.amount.as_ref())
        .map(|a| display_amount(a, separator).len())
        .max()
        .unwrap_or(0);

    for record in records {
        let Some(amount) = &record.amount else {
            continue;
        };
        let marker = if record.is_generated() || amount.is_generated() {
            "~"
        } else {
            " "
        };
        let datestamp = record.entry_date.format("%Y/%m/%d").to_string();
        let display = format!("{:>width$}", display_amount(amount, separator));
        let line = format!("{marker} {datestamp}  {display}  {}", record.ticker);
        if record.is_generated() {
            writeln!(file, "{}", line.dimmed())?;
        } else {
            writeln!(file, "{line}")?;
        }
    }

    Ok(())
}

fn print_period_totals(
    label: &str,
    records: &[Transaction],
    previous: Option<&[Transaction]>,
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    for (symbol, total, fmt) in income_by_symbol(records) {
        let display = display_total(&symbol, total, &fmt, separator);
        let mut line = format!("{label}  {display:>16}");

        if let Some(previous) = previous {
            let previous_total = income(
                &previous
                    .iter()
                    .filter(|r| {
                        r.amount.as_ref().map(|a| a.symbol.clone()) == Some(symbol.clone())
                    })
                    .cloned()
                    .collect::<Vec<_>>(),
            );
            if previous_total > 0.0 {
                let change = (total - previous_total) / previous_total * 100.0;
                let display = format!("{change:+.1}%");
                let colored = if change < 0.0 {
                    display.red()
                } else {
                    display.green()
                };
                line.push_str(&format!("  {colored}"));
            }
        }

        writeln!(file, "{line}")?;
    }
    Ok(())
}

fn years_covered(records: &[Transaction]) -> Vec<i32> {
    let Some(first) = earliest(records) else {
        return Vec::new();
    };
    let Some(last) = latest(records) else {
        return Vec::new();
    };
    (first.entry_date.year()..=last.entry_date.year()).collect()
}

/// Print income summed per year, with year-over-year change.
pub fn print_annual_report(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    for year in years_covered(records) {
        let transactions = yearly(records, year, 12);
        if income(&transactions) == 0.0 {
            continue;
        }
        let previous = yearly(records, year - 1, 12);
        print_period_totals(
            &year.to_string().bright_white().to_string(),
            &transactions,
            Some(&previous),
            file,
            separator,
        )?;
    }
    Ok(())
}

/// Print income summed per calendar month.
pub fn print_monthly_report(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    for year in years_covered(records) {
        for month in 1..=12 {
            let transactions = monthly(records, year, month);
            if income(&transactions) == 0.0 {
                continue;
            }
            let label = format!("{year}/{month:02}");
            print_period_totals(&label, &transactions, None, file, separator)?;
        }
    }
    Ok(())
}

/// Print income summed per quarter.
pub fn print_quarterly_report(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    for year in years_covered(records) {
        for quarter in 1..=4 {
            let months = [(quarter - 1) * 3 + 1, (quarter - 1) * 3 + 2, quarter * 3];
            let transactions: Vec<Transaction> = records
                .iter()
                .filter(|r| {
                    r.entry_date.year() == year && months.contains(&r.entry_date.month())
                })
                .cloned()
                .collect();
            if income(&transactions) == 0.0 {
                continue;
            }
            let label = format!("{year}/Q{quarter}");
            print_period_totals(&label, &transactions, None, file, separator)?;
        }
    }
    Ok(())
}

/// Print rolling 12-month income, ending at each recorded month.
pub fn print_trailing_report(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    let Some(first) = earliest(records) else {
        return Ok(());
    };
    let Some(last) = latest(records) else {
        return Ok(());
    };

    let mut current = crate::dates::first_of_month(first.entry_date);
    let end = crate::dates::next_month(last.entry_date);

    while current < end {
        let window_end = crate::dates::next_month(current);
        let window_start = crate::dates::in_months(window_end, -12);
        let transactions: Vec<Transaction> = records
            .iter()
            .filter(|r| r.entry_date >= window_start && r.entry_date < window_end)
            .cloned()
            .collect();
        if income(&transactions) != 0.0 {
            let label = format!("{}/{:02}", current.year(), current.month());
            print_period_totals(&label, &transactions, None, file, separator)?;
        }
        current = window_end;
    }

    Ok(())
}

#[derive(Tabled)]
struct WeightRow {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Income")]
    income: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Transactions")]
    transactions: usize,
}

/// Print each ticker's share of total income. Weights are computed per
/// currency, heaviest first.
pub fn print_weight_report(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    for (symbol, total, fmt) in income_by_symbol(records) {
        let in_symbol: Vec<Transaction> = records
            .iter()
            .filter(|r| r.amount.as_ref().map(|a| a.symbol.clone()) == Some(symbol.clone()))
            .cloned()
            .collect();

        let mut weights: Vec<(String, f64, usize)> = tickers(&in_symbol)
            .into_iter()
            .map(|ticker| {
                let transactions = by_ticker(&in_symbol, &ticker);
                (ticker, income(&transactions), transactions.len())
            })
            .collect();
        weights.sort_by(|a, b| b.1.total_cmp(&a.1));

        let rows: Vec<WeightRow> = weights
            .into_iter()
            .map(|(ticker, ticker_income, count)| WeightRow {
                ticker,
                income: display_total(&symbol, ticker_income, &fmt, separator),
                weight: format!("{:.2}%", ticker_income / total * 100.0),
                transactions: count,
            })
            .collect();

        let mut table = Table::new(rows);
        table.with(Style::sharp());
        writeln!(file, "{table}")?;
    }
    Ok(())
}

/// Print total income per currency.
pub fn print_sum_report(
    records: &[Transaction],
    file: &mut dyn Write,
    separator: DecimalSeparator,
) -> io::Result<()> {
    for (symbol, total, fmt) in income_by_symbol(records) {
        writeln!(file, "{:>16}", display_total(&symbol, total, &fmt, separator))?;
    }
    Ok(())
}

#[derive(Tabled)]
struct RateRow {
    #[tabled(rename = "Pair")]
    pair: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Alternatives")]
    alternatives: String,
}

/// Print statistics over the journal: paths, counts, tickers, currencies,
/// covered period and observed exchange rates.
pub fn print_stats(
    records: &[Transaction],
    journal_paths: &[&Path],
    rates: &ExchangeRates,
    file: &mut dyn Write,
) -> io::Result<()> {
    for path in journal_paths {
        writeln!(file, "{:>10}  {}", "journal".bright_white(), path.display())?;
    }

    let transactions: Vec<Transaction> = records
        .iter()
        .filter(|r| r.amount.is_some())
        .cloned()
        .collect();
    writeln!(file, "{:>10}  {}", "records".bright_white(), records.len())?;
    writeln!(
        file,
        "{:>10}  {}",
        "payouts".bright_white(),
        transactions.len()
    )?;

    if let (Some(first), Some(last)) = (earliest(records), latest(records)) {
        writeln!(
            file,
            "{:>10}  {} - {}",
            "period".bright_white(),
            first.entry_date.format("%Y/%m/%d"),
            last.entry_date.format("%Y/%m/%d")
        )?;
    }

    let tickers = tickers(records);
    writeln!(
        file,
        "{:>10}  {}",
        "tickers".bright_white(),
        tickers.join(", ")
    )?;

    let currencies = crate::records::symbols(records, false);
    if !currencies.is_empty() {
        writeln!(
            file,
            "{:>10}  {}",
            "currencies".bright_white(),
            currencies.join(", ")
        )?;
    }

    if !rates.is_empty() {
        let mut rows: Vec<RateRow> = Vec::new();
        for ((from, to), observed) in rates.pairs() {
            let applied = observed.last().copied().unwrap_or_default();
            let alternatives: Vec<String> = observed[..observed.len() - 1]
                .iter()
                .map(|rate| format!("{rate}"))
                .collect();
            rows.push(RateRow {
                pair: format!("{from}/{to}"),
                rate: format!("{applied}"),
                alternatives: alternatives.join(", "),
            });
        }
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        writeln!(file, "{table}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Origin;
    use chrono::NaiveDate;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn paid(date: NaiveDate, ticker: &str, value: f64, symbol: &str) -> Transaction {
        Transaction {
            entry_date: date,
            ticker: ticker.to_string(),
            position: 1.0,
            amount: Some(Amount::literal(
                value,
                Some(2),
                Some(symbol.to_string()),
                Some(format!("{symbol} %s")),
            )),
            dividend: None,
            kind: Default::default(),
            payout_date: None,
            ex_date: None,
            tags: Vec::new(),
            entry_attr: None,
            origin: Origin::Literal,
        }
    }

    fn render(
        print: impl Fn(&[Transaction], &mut dyn Write, DecimalSeparator) -> io::Result<()>,
        records: &[Transaction],
    ) -> String {
        let mut buffer = Vec::new();
        print(records, &mut buffer, DecimalSeparator::Period).expect("render");
        String::from_utf8(buffer).expect("utf-8")
    }

    #[test]
    fn test_display_amount_formats() {
        let amount = Amount::literal(73.0, Some(2), Some("$".to_string()), Some("$ %s".to_string()));
        assert_eq!(display_amount(&amount, DecimalSeparator::Period), "$ 73.00");

        let amount = Amount::literal(
            1000.5,
            Some(2),
            Some("kr".to_string()),
            Some("%s kr".to_string()),
        );
        assert_eq!(
            display_amount(&amount, DecimalSeparator::Comma),
            "1.000,50 kr"
        );
    }

    #[test]
    fn test_chronological_marks_forecasts() {
        let mut forecast = paid(ymd(2020, 3, 13), "ABC", 100.0, "$");
        forecast.origin = Origin::Generated;
        forecast.amount.as_mut().unwrap().origin = Origin::Generated;
        let records = vec![paid(ymd(2019, 3, 1), "ABC", 100.0, "$"), forecast];

        let output = render(print_chronological, &records);
        assert!(output.contains("  2019/03/01"));
        assert!(output.contains("~ 2020/03/13"));
    }

    #[test]
    fn test_annual_report_sums_per_currency() {
        let records = vec![
            paid(ymd(2019, 3, 1), "ABC", 100.0, "$"),
            paid(ymd(2019, 6, 1), "ABC", 100.0, "$"),
            paid(ymd(2019, 6, 2), "TEL", 500.0, "kr"),
        ];
        let output = render(print_annual_report, &records);
        assert!(output.contains("$ 200.00"));
        assert!(output.contains("500.00 kr"));
    }

    #[test]
    fn test_sum_report() {
        let records = vec![
            paid(ymd(2019, 3, 1), "ABC", 100.0, "$"),
            paid(ymd(2020, 3, 1), "ABC", 110.0, "$"),
        ];
        let output = render(print_sum_report, &records);
        assert!(output.contains("$ 210.00"));
    }

    #[test]
    fn test_weight_report() {
        let records = vec![
            paid(ymd(2019, 3, 1), "ABC", 75.0, "$"),
            paid(ymd(2019, 3, 2), "DEF", 25.0, "$"),
        ];
        let output = render(print_weight_report, &records);
        assert!(output.contains("75.00%"));
        assert!(output.contains("25.00%"));
    }
}
