use chrono::{Datelike, Weekday};
use log::warn;

use crate::models::Transaction;
use crate::rates::ExchangeRates;

// Non-fatal diagnostics over the final set of transactions. These never
// alter the output of any pass; they point at journal lines worth a second
// look.

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Report records dated on a Saturday or Sunday; payouts settle on weekdays.
pub fn report_non_weekday_dates(records: &[Transaction]) {
    for record in records {
        let Some(location) = record.location() else {
            continue;
        };
        if is_weekend(record.entry_date.weekday()) {
            warn!(
                "{location} transaction is dated on non-weekday ({})",
                record.entry_date.format("%a")
            );
        }
        if let Some(payout_date) = record.payout_date {
            if is_weekend(payout_date.weekday()) {
                warn!(
                    "{location} transaction has payout date on non-weekday ({})",
                    payout_date.format("%a")
                );
            }
        }
        if let Some(ex_date) = record.ex_date {
            if is_weekend(ex_date.weekday()) {
                warn!(
                    "{location} transaction has ex-dividend date on non-weekday ({})",
                    ex_date.format("%a")
                );
            }
        }
    }
}

/// Report records lacking a payout date, when listing by that axis.
pub fn report_missing_payout_dates(records: &[Transaction]) {
    for record in records.iter().filter(|r| r.payout_date.is_none()) {
        if let Some(location) = record.location() {
            warn!("{location} transaction is missing payout date");
        }
    }
}

/// Report records lacking an ex-dividend date, when listing by that axis.
pub fn report_missing_ex_dates(records: &[Transaction]) {
    for record in records.iter().filter(|r| r.ex_date.is_none()) {
        if let Some(location) = record.location() {
            warn!("{location} transaction is missing ex-dividend date");
        }
    }
}

/// Report tags repeated on a single transaction.
pub fn report_duplicate_tags(records: &[Transaction]) {
    for record in records {
        let Some(location) = record.location() else {
            continue;
        };
        let mut seen: Vec<&str> = Vec::new();
        for tag in &record.tags {
            if seen.contains(&tag.as_str()) {
                continue;
            }
            seen.push(tag);
            if record.tags.iter().filter(|t| *t == tag).count() > 1 {
                warn!("{location} transaction has duplicate tag: {tag}");
            }
        }
    }
}

/// Report currency pairs with more than one observed rate on the reference
/// date.
pub fn report_ambiguous_rates(rates: &ExchangeRates) {
    for ((from, to), observed) in rates.pairs() {
        if observed.len() > 1 {
            let applied = observed.last().copied().unwrap_or_default();
            let alternatives: Vec<String> = observed[..observed.len() - 1]
                .iter()
                .map(|rate| format!("{rate}"))
                .collect();
            warn!(
                "ambiguous exchange rate ({from}, {to}) = {applied}:\n or, {}?",
                alternatives.join(", ")
            );
        }
    }
}
