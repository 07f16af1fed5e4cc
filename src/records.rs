use chrono::{Datelike, NaiveDate};

use crate::dates::{in_months, months_between, Period};
use crate::models::{sort_canonically, Amount, Transaction};

// Query helpers over sequences of records. Each helper returns a new
// concrete collection; sequences are never lazily chained across pass
// boundaries.

/// Return records with a given ticker.
pub fn by_ticker(records: &[Transaction], ticker: &str) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| r.ticker == ticker)
        .cloned()
        .collect()
}

/// Return the unique tickers in a set of records, in order of first appearance.
pub fn tickers(records: &[Transaction]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for record in records {
        if !seen.contains(&record.ticker) {
            seen.push(record.ticker.clone());
        }
    }
    seen
}

/// Return the unique currency symbols in a set of records, in order of first
/// appearance, optionally excluding symbols attached only to dividends.
pub fn symbols(records: &[Transaction], excluding_dividends: bool) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for record in records {
        let Some(amount) = &record.amount else {
            continue;
        };
        if let Some(symbol) = &amount.symbol {
            if !seen.contains(symbol) {
                seen.push(symbol.clone());
            }
        }
        if !excluding_dividends {
            if let Some(symbol) = record.dividend.as_ref().and_then(|d| d.symbol.as_ref()) {
                if !seen.contains(symbol) {
                    seen.push(symbol.clone());
                }
            }
        }
    }
    seen
}

/// Return records dated within a number of months prior to a date; the end
/// of the window is inclusive, the start exclusive.
pub fn trailing(records: &[Transaction], since: NaiveDate, months: u32) -> Vec<Transaction> {
    let begin = in_months(since, -(months as i32));
    records
        .iter()
        .filter(|r| since >= r.entry_date && r.entry_date > begin)
        .cloned()
        .collect()
}

/// Return records dated on a given month and year.
pub fn monthly(records: &[Transaction], year: i32, month: u32) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| r.entry_date.year() == year && r.entry_date.month() == month)
        .cloned()
        .collect()
}

/// Return records dated within a given year, up to and including a month.
pub fn yearly(records: &[Transaction], year: i32, months: u32) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| r.entry_date.year() == year && r.entry_date.month() <= months)
        .cloned()
        .collect()
}

/// Return records dated earlier than a date.
pub fn before(records: &[Transaction], date: NaiveDate) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| r.entry_date < date)
        .cloned()
        .collect()
}

/// Return records dated later than a date.
pub fn after(records: &[Transaction], date: NaiveDate) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| r.entry_date > date)
        .cloned()
        .collect()
}

/// Return records dated within a period.
pub fn in_period(records: &[Transaction], period: &Period) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| period.contains(r.entry_date))
        .cloned()
        .collect()
}

/// Return records whose reference date matches a given date; the reference
/// date is the payout date when requested and present, the entry date
/// otherwise.
pub fn dated(records: &[Transaction], date: NaiveDate, by_payout: bool) -> Vec<Transaction> {
    records
        .iter()
        .filter(|r| reference_date(r, by_payout) == date)
        .cloned()
        .collect()
}

fn reference_date(record: &Transaction, by_payout: bool) -> NaiveDate {
    if by_payout {
        record.payout_date.unwrap_or(record.entry_date)
    } else {
        record.entry_date
    }
}

/// Return the earliest record in canonical order.
pub fn earliest(records: &[Transaction]) -> Option<&Transaction> {
    let mut result: Option<&Transaction> = None;
    for record in records {
        match result {
            Some(best) if record.canonical_cmp(best).is_lt() => result = Some(record),
            None => result = Some(record),
            _ => {}
        }
    }
    result
}

/// Return the latest record in canonical order; ties resolve to the last
/// record in input order.
pub fn latest(records: &[Transaction]) -> Option<&Transaction> {
    let mut result: Option<&Transaction> = None;
    for record in records {
        match result {
            Some(best) if record.canonical_cmp(best).is_lt() => {}
            _ => result = Some(record),
        }
    }
    result
}

/// Return the latest record going by payout date where present, entry date
/// otherwise.
pub fn latest_by_payout(records: &[Transaction]) -> Option<&Transaction> {
    let mut result: Option<&Transaction> = None;
    for record in records {
        match result {
            Some(best) if reference_date(record, true) < reference_date(best, true) => {}
            _ => result = Some(record),
        }
    }
    result
}

/// Return the latest record going by ex-dividend date where present, entry
/// date otherwise.
pub fn latest_by_exdate(records: &[Transaction]) -> Option<&Transaction> {
    fn key(record: &Transaction) -> NaiveDate {
        record.ex_date.unwrap_or(record.entry_date)
    }

    let mut result: Option<&Transaction> = None;
    for record in records {
        match result {
            Some(best) if key(record) < key(best) => {}
            _ => result = Some(record),
        }
    }
    result
}

/// Return records keeping only the first occurrence per entry date.
pub fn pruned(records: &[Transaction]) -> Vec<Transaction> {
    let mut collected: Vec<Transaction> = Vec::new();
    for record in records {
        if !collected.iter().any(|c| c.entry_date == record.entry_date) {
            collected.push(record.clone());
        }
    }
    collected
}

/// Return the amount received per share, or 0 for worthless records.
pub fn amount_per_share(record: &Transaction) -> f64 {
    match &record.amount {
        Some(amount) if amount.value > 0.0 && record.position > 0.0 => {
            amount.value / record.position
        }
        _ => 0.0,
    }
}

/// Return the conversion factor of dividend to amount; 1 if no dividend is
/// attached, or the dividend is in the same symbol as the amount.
pub fn amount_conversion_factor(record: &Transaction) -> f64 {
    let Some(dividend) = &record.dividend else {
        return 1.0;
    };
    let Some(amount) = &record.amount else {
        return 1.0;
    };
    if dividend.symbol == amount.symbol {
        return 1.0;
    }
    amount_per_share(record) / dividend.value
}

/// Return the sum of amount components in a set of records.
pub fn income(records: &[Transaction]) -> f64 {
    records
        .iter()
        .filter_map(|r| r.amount.as_ref())
        .map(|a| a.value)
        .sum()
}

/// Return the sorted unique month components in a set of records.
pub fn monthly_schedule(records: &[Transaction]) -> Vec<u32> {
    let mut months: Vec<u32> = records.iter().map(|r| r.entry_date.month()).collect();
    months.sort_unstable();
    months.dedup();
    months
}

/// Return the month intervals between a set of records, ignoring years and
/// days, closed with the wrap-around interval that completes a full year.
pub fn intervals(records: &[Transaction]) -> Vec<u32> {
    let mut records: Vec<Transaction> = records.to_vec();
    sort_canonically(&mut records);

    if records.is_empty() {
        return Vec::new();
    }

    let mut timespans: Vec<u32> = Vec::new();
    let mut first: Option<NaiveDate> = None;
    let mut previous: Option<NaiveDate> = None;

    for record in &records {
        let d = NaiveDate::from_ymd_opt(record.entry_date.year(), record.entry_date.month(), 1)
            .unwrap_or(record.entry_date);
        match previous {
            None => first = Some(d),
            Some(p) => timespans.push(months_between(d, p, true)),
        }
        previous = Some(d);
    }

    let (first, previous) = (first.unwrap_or_default(), previous.unwrap_or_default());
    let closing = first.with_year(previous.year() + 1).unwrap_or(first);
    timespans.push(months_between(closing, previous, true));

    timespans
}

/// Return the dividend components in a set of records.
pub fn dividends(records: &[Transaction]) -> Vec<Amount> {
    records
        .iter()
        .filter_map(|r| r.dividend.clone())
        .collect()
}

/// Return deltas between adjacent values as directions: -1 down, 0 same, 1 up.
pub fn normalized_deltas(values: &[f64]) -> Vec<i32> {
    if values.len() < 2 {
        return Vec::new();
    }
    values
        .windows(2)
        .map(|pair| {
            if pair[1] - pair[0] < 0.0 {
                -1
            } else if pair[1] == pair[0] {
                0
            } else {
                1
            }
        })
        .collect()
}

/// Return the most common values, in order of first appearance; more than
/// one value when multimodal, empty for empty input.
pub fn multimode<T: PartialEq + Copy>(values: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for &value in values {
        match unique.iter().position(|&u| u == value) {
            Some(index) => counts[index] += 1,
            None => {
                unique.push(value);
                counts.push(1);
            }
        }
    }

    let Some(&max) = counts.iter().max() else {
        return Vec::new();
    };
    unique
        .into_iter()
        .zip(counts)
        .filter(|&(_, count)| count == max)
        .map(|(value, _)| value)
        .collect()
}

/// Return the arithmetic mean of a set of values.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
