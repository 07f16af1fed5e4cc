use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};

use dividend_ledger::config::Config;
use dividend_ledger::dates::parse_period;
use dividend_ledger::diagnostics;
use dividend_ledger::format::DecimalSeparator;
use dividend_ledger::models::{sort_canonically, Transaction};
use dividend_ledger::projection::scheduled_transactions;
use dividend_ledger::rates::ExchangeRates;
use dividend_ledger::records::{in_period, tickers};
use dividend_ledger::transform::{
    adjusting_for_splits, in_currency, in_dividend_currency, removing_redundancies, with_estimates,
};
use dividend_ledger::{import, journal, report};

#[derive(Parser)]
#[command(name = "dividend-ledger")]
#[command(about = "Track dividend income from a plain-text journal and forecast the next twelve months of payouts")]
#[command(version)]
struct Cli {
    /// Show diagnostic messages
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show dividend income chronologically, including forecasts
    Report {
        /// Journal files to read
        journals: Vec<PathBuf>,
        /// Only include transactions within a date interval
        #[arg(long)]
        period: Option<String>,
        /// Show income by month
        #[arg(long, conflicts_with_all = ["quarterly", "annual", "trailing", "weight", "sum"])]
        monthly: bool,
        /// Show income by quarter
        #[arg(long, conflicts_with_all = ["annual", "trailing", "weight", "sum"])]
        quarterly: bool,
        /// Show income by year
        #[arg(long, conflicts_with_all = ["trailing", "weight", "sum"])]
        annual: bool,
        /// Show income by trailing 12 months
        #[arg(long, conflicts_with_all = ["weight", "sum"])]
        trailing: bool,
        /// Show income by weight per ticker
        #[arg(long, conflicts_with = "sum")]
        weight: bool,
        /// Show income totals
        #[arg(long)]
        sum: bool,
        /// Don't include forecasted transactions
        #[arg(long)]
        without_forecast: bool,
        /// Don't adjust past transactions for splits
        #[arg(long)]
        without_adjustment: bool,
        /// Show income for a single ticker
        #[arg(long)]
        by_ticker: Option<String>,
        /// List chronologically by payout date
        #[arg(long, conflicts_with = "by_ex_date")]
        by_payout_date: bool,
        /// List chronologically by ex-dividend date
        #[arg(long)]
        by_ex_date: bool,
        /// Only include income originating from a dividend currency
        #[arg(long)]
        in_currency: Option<String>,
        /// Show income as if exchanged to a currency
        #[arg(long, conflicts_with = "as_native_currency")]
        as_currency: Option<String>,
        /// Show income prior to any exchange
        #[arg(long)]
        as_native_currency: bool,
    },
    /// Print the journal back out in canonical form
    Print {
        /// Journal files to read
        journals: Vec<PathBuf>,
        /// Print each entry on a single line
        #[arg(long)]
        condensed: bool,
        /// Print latest entries first
        #[arg(long)]
        descending: bool,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert transaction data into a journal file
    Convert {
        /// Input files
        files: Vec<PathBuf>,
        /// Type of transaction data
        #[arg(long = "type", value_enum, default_value = "journal")]
        input_type: InputType,
        /// Journal filename to write
        #[arg(long, default_value = "ledger.journal")]
        output: PathBuf,
        /// Write each entry on a single line
        #[arg(long)]
        condensed: bool,
    },
    /// Show statistics over the journal
    Stats {
        /// Journal files to read
        journals: Vec<PathBuf>,
        /// Only include transactions within a date interval
        #[arg(long)]
        period: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum InputType {
    #[default]
    Journal,
    Nordnet,
}

fn read_journals(paths: &[PathBuf], separator: DecimalSeparator) -> Result<Vec<Transaction>> {
    let mut records = Vec::new();
    for path in paths {
        if !path.is_file() {
            bail!("{}: journal not found", path.display());
        }
        records.extend(journal::read(path, separator)?);
    }
    Ok(records)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    easy_logging::init(module_path!().split("::").next().unwrap_or("dividend_ledger"), log_level)
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    let config = Config::load().context("failed to load configuration")?;
    let separator = config.decimal_separator();
    let today = Local::now().date_naive();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Print {
            journals,
            condensed,
            descending,
            json,
        } => {
            let journals = config.resolve_journals(&journals);
            let mut records = removing_redundancies(read_journals(&journals, separator)?);
            sort_canonically(&mut records);
            if descending {
                records.reverse();
            }
            if json {
                serde_json::to_writer_pretty(&mut out, &records)?;
                writeln!(out)?;
            } else {
                journal::write(&records, &mut out, condensed, separator)?;
            }
        }

        Commands::Convert {
            files,
            input_type,
            output,
            condensed,
        } => {
            let mut records = Vec::new();
            for path in &files {
                if !path.is_file() {
                    bail!("{}: file not found", path.display());
                }
                match input_type {
                    InputType::Journal => records.extend(journal::read(path, separator)?),
                    InputType::Nordnet => {
                        records.extend(import::read_broker_transactions(path, today)?)
                    }
                }
            }
            let mut records = removing_redundancies(adjusting_for_splits(records));
            sort_canonically(&mut records);

            // write atomically; a failed write must not clobber the output
            let directory = output.parent().filter(|p| !p.as_os_str().is_empty());
            let mut file = match directory {
                Some(directory) => tempfile::NamedTempFile::new_in(directory)?,
                None => tempfile::NamedTempFile::new_in(".")?,
            };
            journal::write(&records, &mut file, condensed, separator)?;
            file.persist(&output)
                .with_context(|| format!("could not write {}", output.display()))?;
        }

        Commands::Stats { journals, period } => {
            let journals = config.resolve_journals(&journals);
            let mut records =
                removing_redundancies(adjusting_for_splits(read_journals(&journals, separator)?));
            sort_canonically(&mut records);
            if records.is_empty() {
                return Ok(());
            }
            let rates = ExchangeRates::from_records(&records);
            if let Some(period) = period {
                let period = parse_period(&period, today).map_err(|reason| anyhow!(reason))?;
                records = in_period(&records, &period);
            }
            let paths: Vec<&std::path::Path> = journals.iter().map(PathBuf::as_path).collect();
            report::print_stats(&records, &paths, &rates, &mut out)?;
        }

        Commands::Report {
            journals,
            period,
            monthly,
            quarterly,
            annual,
            trailing,
            weight,
            sum,
            without_forecast,
            without_adjustment,
            by_ticker,
            by_payout_date,
            by_ex_date,
            in_currency: in_currency_symbol,
            as_currency,
            as_native_currency,
        } => {
            let journals = config.resolve_journals(&journals);
            let mut records = read_journals(&journals, separator)?;
            if !without_adjustment {
                records = adjusting_for_splits(records);
            }
            let mut records = removing_redundancies(records);
            sort_canonically(&mut records);
            if records.is_empty() {
                return Ok(());
            }

            // rates are derived before any filtering; the latest observed
            // rate applies no matter the period or ticker
            let rates = ExchangeRates::from_records(&records);

            if let Some(ticker) = by_ticker {
                let ticker = resolve_ticker(&records, &ticker);
                records.retain(|r| r.ticker == ticker);
            }

            // transactions as journaled, for diagnostics only
            let journaled: Vec<Transaction> = records
                .iter()
                .filter(|r| r.entry_attr.is_some() && r.amount.is_some())
                .cloned()
                .collect();

            let mut records = with_estimates(records, &rates)?;

            if by_payout_date {
                records = swap_payout_dates(records);
            } else if by_ex_date {
                records = swap_ex_dates(records);
            }

            if as_native_currency {
                records = in_dividend_currency(records);
            }

            if !without_forecast {
                let mut scheduled = scheduled_transactions(&records, today, &rates)?;
                records.append(&mut scheduled);
            }

            let mut transactions: Vec<Transaction> =
                records.into_iter().filter(|r| r.amount.is_some()).collect();

            let interval = match period {
                Some(period) => Some(parse_period(&period, today).map_err(|reason| anyhow!(reason))?),
                None => None,
            };
            if let Some(interval) = &interval {
                transactions = in_period(&transactions, interval);
            }

            if let Some(symbol) = &in_currency_symbol {
                transactions.retain(|t| {
                    t.dividend.as_ref().and_then(|d| d.symbol.as_deref()) == Some(symbol.as_str())
                });
            }

            sort_canonically(&mut transactions);

            if let Some(symbol) = &as_currency {
                transactions = in_currency(transactions, symbol, &rates)?;
            }

            if weight {
                report::print_weight_report(&transactions, &mut out, separator)?;
            } else if sum {
                report::print_sum_report(&transactions, &mut out, separator)?;
            } else if trailing {
                report::print_trailing_report(&transactions, &mut out, separator)?;
            } else if annual {
                report::print_annual_report(&transactions, &mut out, separator)?;
            } else if monthly {
                report::print_monthly_report(&transactions, &mut out, separator)?;
            } else if quarterly {
                report::print_quarterly_report(&transactions, &mut out, separator)?;
            } else {
                report::print_chronological(&transactions, &mut out, separator)?;
            }

            if cli.verbose > 0 {
                let mut journaled = journaled;
                if let Some(interval) = &interval {
                    journaled = in_period(&journaled, interval);
                }
                sort_canonically(&mut journaled);

                diagnostics::report_non_weekday_dates(&journaled);
                if by_payout_date {
                    diagnostics::report_missing_payout_dates(&journaled);
                } else if by_ex_date {
                    diagnostics::report_missing_ex_dates(&journaled);
                }
                diagnostics::report_duplicate_tags(&journaled);

                // recompute over journaled records only, so estimates do not
                // contribute observations
                let literal: Vec<Transaction> = journaled
                    .iter()
                    .filter(|r| r.amount.as_ref().map_or(false, |a| !a.is_generated()))
                    .cloned()
                    .collect();
                diagnostics::report_ambiguous_rates(&ExchangeRates::from_records(&literal));
            }
        }
    }

    Ok(())
}

/// Match a ticker exactly, or by unique prefix.
fn resolve_ticker(records: &[Transaction], ticker: &str) -> String {
    let unique = tickers(records);
    if unique.iter().any(|t| t == ticker) {
        return ticker.to_string();
    }
    let matching: Vec<&String> = unique.iter().filter(|t| t.starts_with(ticker)).collect();
    if matching.len() == 1 {
        return matching[0].clone();
    }
    ticker.to_string()
}

/// Track records by their payout date, where able.
fn swap_payout_dates(records: Vec<Transaction>) -> Vec<Transaction> {
    records
        .into_iter()
        .map(|mut record| {
            if let Some(payout_date) = record.payout_date.take() {
                record.entry_date = payout_date;
            }
            record
        })
        .collect()
}

/// Track records by their ex-dividend date, where able.
fn swap_ex_dates(records: Vec<Transaction>) -> Vec<Transaction> {
    records
        .into_iter()
        .map(|mut record| {
            if let Some(ex_date) = record.ex_date.take() {
                record.entry_date = ex_date;
            }
            record
        })
        .collect()
}
