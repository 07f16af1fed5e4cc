use crate::errors::Result;
use crate::format::{decimal_places, truncate_floating_point};
use crate::models::{is_close, Amount, Transaction, POSITION_TOLERANCE};
use crate::rates::ExchangeRates;
use crate::records::{after, by_ticker, latest, tickers};

// Record transformations. Each pass is a pure function from one sequence of
// records to a new one; original entry attributes survive every pass so
// diagnostics can cite the source line.

/// Remove positional entries made obsolete by subsequent realized
/// transactions.
///
/// Position-closing entries, entries carrying a split directive, and
/// positional entries dated on or after the latest realized ex-date are
/// always retained.
pub fn removing_redundancies(records: Vec<Transaction>) -> Vec<Transaction> {
    let mut removed: Vec<usize> = Vec::new();

    for ticker in tickers(&records) {
        let realized: Vec<&Transaction> = records
            .iter()
            .filter(|r| r.ticker == ticker && !r.is_positional())
            .collect();
        let Some(latest_record) = realized.last() else {
            continue;
        };

        for (index, record) in records.iter().enumerate() {
            if record.ticker != ticker || !record.is_positional() {
                continue;
            }
            if record.position == 0.0 {
                // a closer; keep it around in any case
                continue;
            }
            if let Some(attr) = &record.entry_attr {
                if attr.positioning.is_split() {
                    // split directives must be retained for journal integrity
                    continue;
                }
            }
            if let Some(ex_date) = latest_record.ex_date {
                if record.entry_date >= ex_date {
                    continue;
                }
            }
            let is_redundant = record.entry_date < latest_record.entry_date
                || (record.entry_date == latest_record.entry_date
                    && is_close(
                        record.position,
                        latest_record.position,
                        POSITION_TOLERANCE,
                    ));
            if is_redundant {
                removed.push(index);
            }
        }
    }

    records
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !removed.contains(index))
        .map(|(_, record)| record)
        .collect()
}

/// Rewrite pre-split positions and dividends so per-share figures are
/// comparable across splits; post-split records are unchanged.
pub fn adjusting_for_splits(records: Vec<Transaction>) -> Vec<Transaction> {
    let splits: Vec<Transaction> = records
        .iter()
        .filter(|r| {
            r.is_positional()
                && r.entry_attr
                    .as_ref()
                    .map_or(false, |attr| attr.positioning.is_split())
        })
        .cloned()
        .collect();

    let mut adjusted = Vec::with_capacity(records.len());

    for mut record in records {
        let cutoff = record.ex_date.unwrap_or(record.entry_date);
        let later_splits = after(&by_ticker(&splits, &record.ticker), cutoff);

        if !later_splits.is_empty() {
            // a split either cashes out fractional remainders (whole) or
            // keeps them; factors cannot simply be multiplied through, each
            // split applies individually, earliest to latest
            let mut product = 1.0;
            let mut position = record.position;
            for split in &later_splits {
                let Some(attr) = &split.entry_attr else {
                    continue;
                };
                let factor = attr.positioning.value.unwrap_or(1.0);
                product *= factor;
                position *= factor;
                if attr.positioning.directive == crate::models::Directive::SplitWhole {
                    position = position.floor();
                }
            }

            if let Some(dividend) = &mut record.dividend {
                // the user's decimal-place preference is recomputed here;
                // an adjusted value like 0.1925 would otherwise display
                // rounded back to the entered precision
                let value = truncate_floating_point(dividend.value / product, 4);
                dividend.value = value;
                dividend.places = Some(decimal_places(value));
            }
            record.position = position;
        }

        adjusted.push(record);
    }

    adjusted
}

/// Replace missing amounts on preliminary records with generated estimates.
///
/// The estimate is `position × dividend`, exchanged into the entry's
/// explicit preliminary currency if one was written, otherwise the currency
/// of the ticker's latest realized amount, otherwise the dividend's own
/// currency.
pub fn with_estimates(records: Vec<Transaction>, rates: &ExchangeRates) -> Result<Vec<Transaction>> {
    let transactions: Vec<Transaction> = records
        .iter()
        .filter(|r| r.amount.is_some())
        .cloned()
        .collect();

    let mut result = Vec::with_capacity(records.len());

    for mut record in records {
        let estimable = record.amount.is_none() && record.dividend.is_some();
        if !estimable {
            result.push(record);
            continue;
        }
        let Some(dividend) = record.dividend.clone() else {
            result.push(record);
            continue;
        };

        let preliminary = record
            .entry_attr
            .as_ref()
            .and_then(|attr| attr.preliminary_amount.clone());

        let mut factor = 1.0;
        let estimate_symbol;
        let estimate_format;

        if let Some(preliminary) = preliminary {
            estimate_symbol = preliminary.symbol.clone();
            estimate_format = preliminary.fmt.clone();
            if let (Some(from), Some(to)) = (&dividend.symbol, &estimate_symbol) {
                factor = rates.factor(from, to)?;
            }
        } else {
            let matching = by_ticker(&transactions, &record.ticker);
            match latest(&matching).and_then(|t| t.amount.as_ref()) {
                Some(amount) => {
                    estimate_symbol = amount.symbol.clone();
                    estimate_format = amount.fmt.clone();
                    if dividend.symbol != amount.symbol {
                        if let (Some(from), Some(to)) = (&dividend.symbol, &amount.symbol) {
                            factor = rates.factor(from, to)?;
                        }
                    }
                }
                None => {
                    estimate_symbol = dividend.symbol.clone();
                    estimate_format = dividend.fmt.clone();
                }
            }
        }

        record.amount = Some(Amount::generated(
            record.position * dividend.value * factor,
            None,
            estimate_symbol,
            estimate_format,
        ));
        result.push(record);
    }

    Ok(result)
}

/// Restate every amount as `dividend × position` in the dividend's own
/// currency.
pub fn in_dividend_currency(records: Vec<Transaction>) -> Vec<Transaction> {
    records
        .into_iter()
        .map(|mut record| {
            let Some(dividend) = record.dividend.clone() else {
                return record;
            };
            let Some(amount) = &mut record.amount else {
                return record;
            };
            if dividend.symbol == amount.symbol {
                return record;
            }
            amount.value = dividend.value * record.position;
            amount.symbol = dividend.symbol.clone();
            amount.fmt = dividend.fmt.clone();
            amount.places = None;
            record
        })
        .collect()
}

/// Restate every amount into a single currency, using the latest observed
/// exchange rates.
pub fn in_currency(
    records: Vec<Transaction>,
    symbol: &str,
    rates: &ExchangeRates,
) -> Result<Vec<Transaction>> {
    let transactions: Vec<Transaction> = records
        .iter()
        .filter(|r| r.amount.is_some())
        .cloned()
        .collect();

    let mut result = Vec::with_capacity(records.len());

    for mut record in records {
        let Some(amount) = record.amount.clone() else {
            result.push(record);
            continue;
        };
        if amount.symbol.as_deref() == Some(symbol) {
            result.push(record);
            continue;
        }
        let from = amount.symbol.clone().unwrap_or_default();
        let factor = rates.factor(&from, symbol)?;

        // adopt the format of the most recent record that referenced the
        // target currency
        let mut estimate_format: Option<String> = None;
        for transaction in transactions.iter().rev() {
            if let Some(amount) = &transaction.amount {
                if amount.symbol.as_deref() == Some(symbol) {
                    estimate_format = amount.fmt.clone();
                }
            }
            if estimate_format.is_none() {
                if let Some(dividend) = &transaction.dividend {
                    if dividend.symbol.as_deref() == Some(symbol) {
                        estimate_format = dividend.fmt.clone();
                    }
                }
            }
            if estimate_format.is_some() {
                break;
            }
        }

        record.amount = Some(Amount::generated(
            amount.value * factor,
            None,
            Some(symbol.to_string()),
            estimate_format,
        ));
        result.push(record);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Location;
    use crate::models::{Directive, EntryAttributes, Origin, Positioning};
    use chrono::NaiveDate;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn amount(value: f64, symbol: &str) -> Amount {
        Amount::literal(
            value,
            Some(decimal_places(value)),
            Some(symbol.to_string()),
            Some(format!("{symbol} %s")),
        )
    }

    fn positional(date: NaiveDate, ticker: &str, position: f64) -> Transaction {
        Transaction {
            entry_date: date,
            ticker: ticker.to_string(),
            position,
            amount: None,
            dividend: None,
            kind: Default::default(),
            payout_date: None,
            ex_date: None,
            tags: Vec::new(),
            entry_attr: Some(EntryAttributes::new(
                Location::new("ledger.journal", 1),
                Positioning::set(Some(position)),
            )),
            origin: Origin::Literal,
        }
    }

    fn realized(
        date: NaiveDate,
        ticker: &str,
        position: f64,
        value: f64,
        dividend_value: f64,
    ) -> Transaction {
        Transaction {
            amount: Some(amount(value, "$")),
            dividend: Some(amount(dividend_value, "$")),
            ..positional(date, ticker, position)
        }
    }

    fn split(date: NaiveDate, ticker: &str, factor: f64, whole: bool, position: f64) -> Transaction {
        let mut record = positional(date, ticker, position);
        record.entry_attr = Some(EntryAttributes::new(
            Location::new("ledger.journal", 1),
            Positioning {
                value: Some(factor),
                directive: if whole {
                    Directive::SplitWhole
                } else {
                    Directive::Split
                },
            },
        ));
        record
    }

    #[test]
    fn test_split_adjustment() {
        // 2021/01/01 ABC (10) $ 1 @ $ 0.10; 2021/02/10 ABC (x2!); later $ 2 @ $ 0.05
        let records = vec![
            realized(ymd(2021, 1, 1), "ABC", 10.0, 1.0, 0.10),
            split(ymd(2021, 2, 10), "ABC", 2.0, true, 20.0),
            realized(ymd(2021, 4, 1), "ABC", 20.0, 2.0, 0.05),
        ];
        let adjusted = adjusting_for_splits(records);

        assert_eq!(adjusted[0].position, 20.0);
        assert_eq!(adjusted[0].dividend.as_ref().unwrap().value, 0.05);
        assert_eq!(adjusted[0].amount.as_ref().unwrap().value, 1.0);
        // the post-split record is unchanged
        assert_eq!(adjusted[2].position, 20.0);
        assert_eq!(adjusted[2].dividend.as_ref().unwrap().value, 0.05);
    }

    #[test]
    fn test_split_adjustment_recomputes_places() {
        let mut record = realized(ymd(2021, 1, 1), "ABC", 10.0, 2.05, 0.205);
        record.dividend.as_mut().unwrap().places = Some(3);
        let records = vec![record, split(ymd(2021, 2, 10), "ABC", 2.0, false, 20.0)];
        let adjusted = adjusting_for_splits(records);

        let dividend = adjusted[0].dividend.as_ref().unwrap();
        assert_eq!(dividend.value, 0.1025);
        assert_eq!(dividend.places, Some(4));
    }

    #[test]
    fn test_fractional_split_keeps_remainder() {
        let records = vec![
            realized(ymd(2021, 1, 1), "ABC", 5.0, 1.0, 0.2),
            split(ymd(2021, 2, 10), "ABC", 1.5, false, 7.5),
        ];
        let adjusted = adjusting_for_splits(records);
        assert_eq!(adjusted[0].position, 7.5);
    }

    #[test]
    fn test_redundant_positional_entries_are_pruned() {
        let records = vec![
            positional(ymd(2019, 1, 1), "ABC", 10.0),
            realized(ymd(2019, 2, 1), "ABC", 10.0, 1.0, 0.1),
        ];
        let pruned = removing_redundancies(records);
        assert_eq!(pruned.len(), 1);
        assert!(!pruned[0].is_positional());
    }

    #[test]
    fn test_closers_are_retained() {
        let records = vec![
            positional(ymd(2019, 1, 1), "ABC", 0.0),
            realized(ymd(2019, 2, 1), "ABC", 10.0, 1.0, 0.1),
        ];
        let pruned = removing_redundancies(records);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn test_splits_are_retained() {
        let records = vec![
            split(ymd(2019, 1, 1), "ABC", 2.0, false, 20.0),
            realized(ymd(2019, 2, 1), "ABC", 20.0, 1.0, 0.05),
        ];
        let pruned = removing_redundancies(records);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn test_positional_entries_after_ex_date_are_retained() {
        let mut payout = realized(ymd(2019, 8, 17), "ABC", 1.0, 1.0, 1.0);
        payout.ex_date = Some(ymd(2019, 7, 19));
        let records = vec![positional(ymd(2019, 7, 20), "ABC", 2.0), payout];
        let pruned = removing_redundancies(records);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn test_in_dividend_currency() {
        let mut record = realized(ymd(2019, 3, 1), "TEL", 100.0, 675.0, 1.0);
        record.amount.as_mut().unwrap().symbol = Some("kr".to_string());
        record.amount.as_mut().unwrap().fmt = Some("%s kr".to_string());

        let converted = in_dividend_currency(vec![record]);
        let amount = converted[0].amount.as_ref().unwrap();
        assert_eq!(amount.value, 100.0);
        assert_eq!(amount.symbol.as_deref(), Some("$"));
        assert_eq!(amount.places, None);
    }

    #[test]
    fn test_in_currency() {
        let mut cross = realized(ymd(2019, 3, 1), "TEL", 100.0, 675.0, 1.0);
        cross.amount.as_mut().unwrap().symbol = Some("kr".to_string());
        cross.amount.as_mut().unwrap().fmt = Some("%s kr".to_string());
        let domestic = realized(ymd(2019, 3, 2), "ABC", 1.0, 100.0, 100.0);

        let records = vec![cross, domestic];
        let rates = ExchangeRates::from_records(&records);

        let converted = in_currency(records, "kr", &rates).unwrap();
        let amount = converted[1].amount.as_ref().unwrap();
        assert_eq!(amount.value, 675.0);
        assert_eq!(amount.symbol.as_deref(), Some("kr"));
        assert!(amount.is_generated());
        assert_eq!(amount.fmt.as_deref(), Some("%s kr"));
    }

    #[test]
    fn test_in_currency_is_idempotent() {
        let mut cross = realized(ymd(2019, 3, 1), "TEL", 100.0, 675.0, 1.0);
        cross.amount.as_mut().unwrap().symbol = Some("kr".to_string());
        let domestic = realized(ymd(2019, 3, 2), "ABC", 1.0, 100.0, 100.0);

        let records = vec![cross, domestic];
        let rates = ExchangeRates::from_records(&records);

        let once = in_currency(records, "kr", &rates).unwrap();
        let twice = in_currency(once.clone(), "kr", &rates).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_in_currency_unknown_pair_is_an_error() {
        let record = realized(ymd(2019, 3, 1), "ABC", 1.0, 100.0, 100.0);
        let rates = ExchangeRates::from_records(&[record.clone()]);
        assert!(in_currency(vec![record], "kr", &rates).is_err());
    }

    #[test]
    fn test_with_estimates_uses_latest_amount_currency() {
        let mut cross = realized(ymd(2019, 3, 1), "TEL", 100.0, 675.0, 1.0);
        cross.amount.as_mut().unwrap().symbol = Some("kr".to_string());
        cross.amount.as_mut().unwrap().fmt = Some("%s kr".to_string());

        let mut preliminary = realized(ymd(2019, 6, 1), "TEL", 100.0, 0.0, 1.1);
        preliminary.amount = None;
        if let Some(attr) = preliminary.entry_attr.as_mut() {
            attr.is_preliminary = true;
        }

        let records = vec![cross, preliminary];
        let rates = ExchangeRates::from_records(&records);
        let estimated = with_estimates(records, &rates).unwrap();

        let amount = estimated[1].amount.as_ref().unwrap();
        assert!(amount.is_generated());
        assert_eq!(amount.symbol.as_deref(), Some("kr"));
        // 100 shares × 1.1 $ × 6.75 kr/$
        assert!((amount.value - 742.5).abs() < 1e-9);
    }

    #[test]
    fn test_with_estimates_explicit_preliminary_currency() {
        let mut record = realized(ymd(2019, 6, 1), "TEL", 100.0, 0.0, 1.1);
        record.amount = None;
        if let Some(attr) = record.entry_attr.as_mut() {
            attr.is_preliminary = true;
            attr.preliminary_amount = Some(Amount::literal(
                0.0,
                Some(0),
                Some("$".to_string()),
                Some("%s $".to_string()),
            ));
        }

        let rates = ExchangeRates::from_records(&[]);
        let estimated = with_estimates(vec![record], &rates).unwrap();
        let amount = estimated[0].amount.as_ref().unwrap();
        assert_eq!(amount.symbol.as_deref(), Some("$"));
        assert!((amount.value - 110.0).abs() < 1e-9);
    }
}
