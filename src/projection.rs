use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::dates::{in_months, last_of_month, months_between, next_month};
use crate::errors::{LedgerError, Result};
use crate::format::decimal_places;
use crate::models::{
    is_close, sort_canonically, Amount, Distribution, Origin, Transaction, POSITION_TOLERANCE,
};
use crate::rates::ExchangeRates;
use crate::records::{
    amount_per_share, before, by_ticker, dividends, intervals, latest, latest_by_exdate, mean,
    monthly_schedule, multimode, normalized_deltas, pruned, tickers, trailing,
};

// The projection engine. Two strategies are run and merged: every sampled
// transaction is rolled forward to the same month next year (futures), and
// gaps are filled by walking each ticker's estimated payout schedule
// (estimates).

/// A projected day of month at or before this threshold is "early" and lands
/// on the 15th; later days land on the last day of the month.
pub const EARLY_LATE_THRESHOLD: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timeframe {
    Early,
    Late,
}

/// A dividend payout schedule: the interval between payouts (in months) and
/// the months on which payouts land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub frequency: u32,
    pub months: Vec<u32>,
}

/// Normalize an interval into monthly, quarterly, biannual or annual.
pub fn normalize_interval(interval: u32) -> u32 {
    assert!(
        (1..=12).contains(&interval),
        "interval must be within 1-12-month range"
    );
    match interval {
        1 => 1,
        2..=3 => 3,
        4..=6 => 6,
        _ => 12,
    }
}

/// Return the approximated payout frequency (in months) for a set of
/// records; 0 for an empty set.
pub fn frequency(records: &[Transaction]) -> u32 {
    if records.is_empty() {
        return 0;
    }

    let mut timespans = intervals(records);
    timespans.sort_unstable();

    let modes = multimode(&timespans);
    if modes.len() == 1 {
        // unambiguous; a clear pattern of common frequency (take a guess)
        return normalize_interval(modes[0]);
    }

    // ambiguous; no clear pattern, fall back to the payout count in the
    // latest 12-month range (don't guess); more than 12 payouts a year
    // still reads as monthly
    let Some(latest_record) = latest(records) else {
        return 0;
    };
    let sample = trailing(records, last_of_month(latest_record.entry_date), 12);
    let payouts_per_year = sample.len() as u32;
    normalize_interval((12 / payouts_per_year.max(1)).max(1))
}

/// Return an estimated monthly schedule for a set of records.
///
/// Given records dated in months (3, 6) at a 3-month interval, the schedule
/// extends to (3, 6, 9, 12).
pub fn estimated_monthly_schedule(records: &[Transaction], interval: u32) -> Vec<u32> {
    let mut schedule = monthly_schedule(records);
    if interval == 0 || schedule.is_empty() {
        return schedule;
    }

    let payouts_per_year = (12 / interval) as usize;
    let mut month = schedule[schedule.len() - 1];

    while schedule.len() < payouts_per_year {
        month += interval;
        if month > 12 {
            month %= 12;
        }
        if schedule.contains(&month) {
            continue;
        }
        schedule.push(month);
    }

    schedule.sort_unstable();
    schedule.dedup();
    schedule
}

/// Return the next date on a monthly schedule following a given date, always
/// at the first of the month.
fn next_scheduled_date(date: NaiveDate, months: &[u32]) -> Option<NaiveDate> {
    let index = months.iter().position(|&m| m == date.month())?;
    let (year, index) = if index + 1 == months.len() {
        (date.year() + 1, 0)
    } else {
        (date.year(), index + 1)
    };
    NaiveDate::from_ymd_opt(year, months[index], 1)
}

fn projected_timeframe(date: NaiveDate) -> Timeframe {
    if date.day() <= EARLY_LATE_THRESHOLD {
        Timeframe::Early
    } else {
        Timeframe::Late
    }
}

/// Return a projected date in the month of `date`: the 15th for early
/// timeframes, the last day of the month otherwise, snapped backward onto
/// the nearest weekday.
fn projected_date(date: NaiveDate, timeframe: Timeframe) -> NaiveDate {
    let mut projected = match timeframe {
        Timeframe::Early => {
            NaiveDate::from_ymd_opt(date.year(), date.month(), EARLY_LATE_THRESHOLD)
                .unwrap_or(date)
        }
        Timeframe::Late => last_of_month(date),
    };
    while matches!(projected.weekday(), Weekday::Sat | Weekday::Sun) {
        projected -= Duration::days(1);
    }
    projected
}

/// Return a forecasted dividend schedule for a ticker, sampled from the
/// trailing 24 months of a reference record.
pub fn estimated_schedule(records: &[Transaction], record: &Transaction) -> Schedule {
    let matching = by_ticker(records, &record.ticker);
    let sample = trailing(&matching, last_of_month(record.entry_date), 24);

    // closed positions and same-date records would skew the estimate
    let open: Vec<Transaction> = sample.into_iter().filter(|r| r.position > 0.0).collect();
    let unique = pruned(&open);

    let frequency = frequency(&unique);
    if frequency == 0 {
        return Schedule {
            frequency,
            months: Vec::new(),
        };
    }

    Schedule {
        frequency,
        months: estimated_monthly_schedule(&unique, frequency),
    }
}

/// Return the next linearly projected dividend, if the per-share history of
/// matching distributions shows an unambiguous trend.
pub fn next_linear_dividend(records: &[Transaction], kind: Distribution) -> Option<Amount> {
    let transactions: Vec<Transaction> = records
        .iter()
        .filter(|r| r.amount.is_some())
        .cloned()
        .collect();

    let latest_dividend = latest(&transactions)?.dividend.clone()?;

    let mut comparable: Vec<Transaction> = Vec::new();
    for transaction in &transactions {
        if transaction.kind != kind {
            // different kinds of distributions may follow different schedules
            continue;
        }
        match &transaction.dividend {
            Some(dividend) if dividend.symbol == latest_dividend.symbol => {
                comparable.push(transaction.clone());
            }
            _ => break,
        }
    }

    if comparable.is_empty() {
        return None;
    }

    let values: Vec<f64> = dividends(&comparable).iter().map(|d| d.value).collect();
    let mut movements = normalized_deltas(&values);
    for movement in &mut movements {
        // consider 'no change' same as going up
        if *movement == 0 {
            *movement = 1;
        }
    }
    let movements = multimode(&movements);
    // a clear trend, up or down, means the dividend follows a linear pattern
    let has_linear_pattern = multimode(&movements).len() != 2;
    if !has_linear_pattern {
        return None;
    }

    let dividend = latest(&comparable)?.dividend.clone()?;
    Some(Amount::generated(
        dividend.value,
        dividend.places,
        dividend.symbol,
        dividend.fmt,
    ))
}

/// Return the position of a ticker prior to a date, compared against the
/// ex-dividend date where present.
fn next_position(records: &[Transaction], ticker: &str, earlier_than: NaiveDate) -> Option<f64> {
    let matching = by_ticker(records, ticker);
    let prior = before(&matching, earlier_than);
    latest_by_exdate(&prior).map(|r| r.position)
}

fn generated_transaction(
    entry_date: NaiveDate,
    ticker: &str,
    position: f64,
    amount: Amount,
    dividend: Option<Amount>,
    kind: Distribution,
) -> Transaction {
    Transaction {
        entry_date,
        ticker: ticker.to_string(),
        position,
        amount: Some(amount),
        dividend,
        kind,
        payout_date: None,
        ex_date: None,
        tags: Vec::new(),
        entry_attr: None,
        origin: Origin::Generated,
    }
}

/// Project every sampled transaction 12 months into the future, assuming an
/// annual roll of the same month.
pub fn future_transactions(
    records: &[Transaction],
    rates: &ExchangeRates,
) -> Result<Vec<Transaction>> {
    let transactions: Vec<Transaction> = records
        .iter()
        .filter(|r| r.amount.is_some())
        .cloned()
        .collect();

    let mut futures: Vec<Transaction> = Vec::new();

    for transaction in &transactions {
        let ticker = &transaction.ticker;
        let matching = by_ticker(&transactions, ticker);
        let Some(latest_transaction) = latest(&matching) else {
            continue;
        };
        let (Some(amount), Some(latest_amount)) =
            (&transaction.amount, &latest_transaction.amount)
        else {
            continue;
        };
        if amount.symbol != latest_amount.symbol {
            // don't project transactions that do not match the latest
            // recorded currency
            continue;
        }

        let Some(next_date) =
            next_scheduled_date(transaction.entry_date, &[transaction.entry_date.month()])
        else {
            continue;
        };
        let future_date = projected_date(next_date, projected_timeframe(transaction.entry_date));

        let future_position = match transaction.ex_date {
            Some(ex_date) => {
                let Some(next_ex_date) = next_scheduled_date(ex_date, &[ex_date.month()]) else {
                    continue;
                };
                let future_ex_date = projected_date(next_ex_date, projected_timeframe(ex_date));
                next_position(records, ticker, future_ex_date)
            }
            None => next_position(records, ticker, future_date),
        };
        let Some(future_position) = future_position else {
            continue;
        };
        if future_position <= 0.0 {
            // don't project closed positions
            continue;
        }

        let future_dividend =
            next_linear_dividend(&matching, transaction.kind).or_else(|| transaction.dividend.clone());

        let mut future_amount = future_position * amount_per_share(transaction);
        if let Some(dividend) = &future_dividend {
            if dividend.symbol != amount.symbol {
                let from = dividend.symbol.as_deref().unwrap_or_default();
                let to = amount.symbol.as_deref().unwrap_or_default();
                let factor = rates.factor(from, to)?;
                future_amount = (future_position * dividend.value) * factor;
            } else {
                future_amount = future_position * dividend.value;
            }
        }

        futures.push(generated_transaction(
            future_date,
            ticker,
            future_position,
            Amount::generated(
                future_amount,
                amount.places,
                latest_amount.symbol.clone(),
                latest_amount.fmt.clone(),
            ),
            future_dividend,
            transaction.kind,
        ));
    }

    sort_canonically(&mut futures);
    Ok(futures)
}

/// Project forward transactions by walking each ticker's estimated payout
/// schedule until it is filled.
pub fn estimated_transactions(
    records: &[Transaction],
    rates: &ExchangeRates,
) -> Result<Vec<Transaction>> {
    let mut approximate: Vec<Transaction> = Vec::new();

    for ticker in tickers(records) {
        let recs = by_ticker(records, &ticker);
        let Some(latest_record) = latest_by_exdate(&recs) else {
            continue;
        };
        if latest_record.position <= 0.0 {
            // don't project closed positions
            continue;
        }

        let transactions: Vec<Transaction> =
            recs.iter().filter(|r| r.amount.is_some()).cloned().collect();
        let Some(latest_transaction) = latest(&transactions).cloned() else {
            continue;
        };
        let Some(latest_amount) = latest_transaction.amount.clone() else {
            continue;
        };

        let schedule = estimated_schedule(&transactions, &latest_transaction);
        if schedule.frequency == 0 || schedule.months.is_empty() {
            continue;
        }
        let scheduled_months = schedule.months;

        let mut future_date = latest_transaction.entry_date;
        let future_timeframe = projected_timeframe(future_date);

        // when the reference transaction has an ex-date, positions are
        // tracked against a schedule of projected ex-dates instead
        let mut future_ex_date = latest_transaction.ex_date;
        let mut future_ex_timeframe = Timeframe::Early;
        let mut scheduled_months_ex: Vec<u32> = Vec::new();
        if let Some(ex_date) = future_ex_date {
            future_ex_timeframe = projected_timeframe(ex_date);
            let by_exdate: Vec<Transaction> = transactions
                .iter()
                .map(|r| match r.ex_date {
                    Some(ex_date) => {
                        let mut swapped = r.clone();
                        swapped.entry_date = ex_date;
                        swapped.ex_date = None;
                        swapped
                    }
                    None => r.clone(),
                })
                .collect();
            match latest(&by_exdate).cloned() {
                Some(latest_by_ex) => {
                    let schedule_ex = estimated_schedule(&by_exdate, &latest_by_ex);
                    scheduled_months_ex = schedule_ex.months;
                }
                None => {}
            }
            if scheduled_months_ex.is_empty() {
                future_ex_date = None;
            }
        }

        let mut scheduled_records: Vec<Transaction> = Vec::new();
        let mut stalled = 0;

        while scheduled_records.len() < scheduled_months.len() {
            let Some(next_date) = next_scheduled_date(future_date, &scheduled_months) else {
                break;
            };
            future_date = projected_date(next_date, future_timeframe);

            // double-check that the position is not closed in the timeframe
            // leading up to the projected date
            let future_position = match future_ex_date {
                Some(ex_date) => {
                    let Some(next_ex_date) = next_scheduled_date(ex_date, &scheduled_months_ex)
                    else {
                        break;
                    };
                    let projected_ex_date =
                        projected_date(next_ex_date, future_ex_timeframe);
                    future_ex_date = Some(projected_ex_date);
                    next_position(records, &ticker, projected_ex_date)
                }
                None => next_position(records, &ticker, future_date),
            };

            let open_position = future_position.filter(|&position| position > 0.0);
            let Some(future_position) = open_position else {
                // closed for now; keep going until the schedule is filled
                stalled += 1;
                if stalled > 64 {
                    break;
                }
                continue;
            };
            stalled = 0;

            let reference: Vec<Transaction> = trailing(&transactions, future_date, 12)
                .into_iter()
                .filter(|r| {
                    r.amount.as_ref().map(|a| a.symbol.clone())
                        == Some(latest_amount.symbol.clone())
                })
                .collect();

            let mut future_amount = amount_per_share(&latest_transaction) * future_position;
            let future_dividend = next_linear_dividend(&reference, Distribution::Final);
            let mut future_dividend_value: Option<f64> = None;
            let mut future_dividend_places: Option<usize> = None;

            if let Some(dividend) = &future_dividend {
                if dividend.symbol != latest_amount.symbol {
                    let from = dividend.symbol.as_deref().unwrap_or_default();
                    let to = latest_amount.symbol.as_deref().unwrap_or_default();
                    let factor = rates.factor(from, to)?;
                    future_dividend_value = Some(dividend.value);
                    future_amount = (future_position * dividend.value) * factor;
                } else {
                    future_amount = future_position * dividend.value;
                }
            } else {
                let latest_dividend_symbol = latest_transaction
                    .dividend
                    .as_ref()
                    .and_then(|d| d.symbol.clone());
                let cross_dividends: Vec<f64> = reference
                    .iter()
                    .filter_map(|r| {
                        let dividend = r.dividend.as_ref()?;
                        let amount = r.amount.as_ref()?;
                        if dividend.symbol != amount.symbol
                            && latest_transaction.dividend.is_some()
                            && dividend.symbol == latest_dividend_symbol
                        {
                            Some(dividend.value)
                        } else {
                            None
                        }
                    })
                    .collect();
                let per_share: Vec<f64> = reference.iter().map(amount_per_share).collect();

                if !cross_dividends.is_empty() {
                    let from = latest_dividend_symbol.as_deref().unwrap_or_default();
                    let to = latest_amount.symbol.as_deref().unwrap_or_default();
                    let factor = rates.factor(from, to)?;
                    let places = cross_dividends
                        .iter()
                        .map(|&value| decimal_places(value))
                        .max()
                        .unwrap_or(0);
                    // round off to the longest decimal-place count observed
                    // in the real transactions
                    let value = mean(&cross_dividends);
                    let value = format!("{value:.places$}").parse().unwrap_or(value);
                    future_dividend_value = Some(value);
                    future_dividend_places = Some(places);
                    future_amount = value * future_position * factor;
                } else if !per_share.is_empty() {
                    future_amount = mean(&per_share) * future_position;
                }
            }

            let dividend = future_dividend_value.map(|value| {
                Amount::generated(
                    value,
                    future_dividend_places,
                    latest_transaction
                        .dividend
                        .as_ref()
                        .and_then(|d| d.symbol.clone()),
                    latest_transaction
                        .dividend
                        .as_ref()
                        .and_then(|d| d.fmt.clone()),
                )
            });

            scheduled_records.push(generated_transaction(
                future_date,
                &ticker,
                future_position,
                Amount::generated(
                    future_amount,
                    latest_amount.places,
                    latest_amount.symbol.clone(),
                    latest_amount.fmt.clone(),
                ),
                dividend,
                Distribution::Final,
            ));
        }

        approximate.extend(scheduled_records);
    }

    sort_canonically(&mut approximate);
    Ok(approximate)
}

/// Return forecasted transactions for the forward 12 months from `since`.
///
/// A 12-month trailing sample is taken per ticker, futures and schedule
/// estimates are merged, and projections in the past, colliding with
/// realized transactions, or out of cadence are weeded out.
pub fn scheduled_transactions(
    records: &[Transaction],
    since: NaiveDate,
    rates: &ExchangeRates,
) -> Result<Vec<Transaction>> {
    let mut sample_records: Vec<Transaction> = Vec::new();

    for ticker in tickers(records) {
        let recs = by_ticker(records, &ticker);
        let Some(latest_record) = latest(&recs) else {
            continue;
        };
        if latest_record.position <= 0.0 {
            // don't project closed positions
            continue;
        }
        if months_between(latest_record.entry_date, since, false) > 12 {
            // the latest transaction is dated too long ago to be a sound
            // basis for projection
            continue;
        }

        let recs_in_period = trailing(&recs, latest_record.entry_date, 12);

        // identically dated records cannot be projected unambiguously; allow
        // them only when explained by a special distribution with a matching
        // position
        for (i, record) in recs_in_period.iter().enumerate() {
            for (j, other) in recs_in_period.iter().enumerate() {
                if i == j {
                    continue;
                }
                if record.entry_date != other.entry_date {
                    continue;
                }
                if record.is_positional() || other.is_positional() {
                    continue;
                }
                if record.kind == Distribution::Special || other.kind == Distribution::Special {
                    if !is_close(record.position, other.position, POSITION_TOLERANCE) {
                        return Err(LedgerError::integrity(
                            other.location(),
                            format!(
                                "ambiguous position ({} or {}?)",
                                record.position, other.position
                            ),
                        ));
                    }
                } else {
                    return Err(LedgerError::integrity(
                        other.location(),
                        "ambiguous record entry",
                    ));
                }
            }
        }

        // special distributions are excluded from projection entirely
        sample_records.extend(
            recs_in_period
                .into_iter()
                .filter(|r| r.kind != Distribution::Special),
        );
    }

    let futures = future_transactions(&sample_records, rates)?;
    let estimates = estimated_transactions(&sample_records, rates)?;

    // base projections primarily on futures; use estimates to fill out gaps
    // in the schedule
    let mut scheduled = futures;
    for estimate in estimates {
        let occupied = scheduled.iter().any(|r| {
            r.ticker == estimate.ticker
                && r.entry_date.year() == estimate.entry_date.year()
                && r.entry_date.month() == estimate.entry_date.month()
        });
        if !occupied {
            scheduled.push(estimate);
        }
    }

    // weed out projections dated in the past or beyond the forward 12-month
    // range; a grace period keeps recent unrealized projections around
    let cutoff_date = next_month(in_months(since, 12));
    let earliest_date = since - Duration::days(EARLY_LATE_THRESHOLD as i64);
    scheduled.retain(|r| r.entry_date >= earliest_date && r.entry_date < cutoff_date);

    // discard projections too closely dated to a realized transaction, by
    // calendar month or by proximity to the record (or its projected date);
    // this has known false-positives near the leap-year february boundary,
    // preferring fewer projections over too many
    for sample_record in &sample_records {
        if sample_record.amount.is_none() {
            continue;
        }
        let sample_date = sample_record.entry_date;
        let sample_projected =
            projected_date(sample_date, projected_timeframe(sample_date));
        scheduled.retain(|r| {
            if r.ticker != sample_record.ticker {
                return true;
            }
            let same_month = r.entry_date.year() == sample_date.year()
                && r.entry_date.month() == sample_date.month();
            let near_record = (r.entry_date - sample_date).num_days().unsigned_abs()
                <= EARLY_LATE_THRESHOLD as u64;
            let near_projection = (r.entry_date - sample_projected)
                .num_days()
                .unsigned_abs()
                <= EARLY_LATE_THRESHOLD as u64;
            !(same_month || near_record || near_projection)
        });
    }

    // trim outliers; a ticker should not have more projections than its
    // frequency allows, so drop projections that break the cadence
    for ticker in tickers(&scheduled) {
        let recs = by_ticker(&sample_records, &ticker);
        let freq = frequency(&recs);
        if freq == 0 {
            continue;
        }
        loop {
            let projected = by_ticker(&scheduled, &ticker);
            if (projected.len() as f64) <= 12.0 / freq as f64 {
                break;
            }
            let mut chain: Vec<Transaction> = Vec::new();
            if let Some(latest_record) = latest(&recs) {
                chain.push(latest_record.clone());
            }
            chain.extend(projected.iter().cloned());

            let mut removed = false;
            for (n, interval) in intervals(&chain).into_iter().enumerate() {
                if normalize_interval(interval) == freq {
                    continue;
                }
                if n >= projected.len() {
                    break;
                }
                let victim = &projected[n];
                if let Some(index) = scheduled.iter().position(|r| r == victim) {
                    scheduled.remove(index);
                    removed = true;
                }
                break;
            }
            if !removed {
                break;
            }
        }
    }

    sort_canonically(&mut scheduled);
    Ok(scheduled)
}
