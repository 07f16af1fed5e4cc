use std::collections::BTreeMap;

use crate::errors::{LedgerError, Result};
use crate::models::{is_close, Transaction};
use crate::records::{amount_conversion_factor, dated, latest_by_payout, symbols};

// The exchange-rate index. Rates are never fetched; every factor is observed
// from a realized cross-currency transaction, where the implicit rate is
// (amount / position) / dividend.

/// Tolerance used when comparing observed exchange rates.
pub const RATE_TOLERANCE: f64 = 1e-4;

/// The latest observed conversion factor for every ordered currency pair.
///
/// Each pair maps to the factors observed on the reference date (the latest
/// payout date, or entry date when no payout date is set). Factors that
/// disagree with the applied rate beyond tolerance are ambiguous
/// alternatives; the applied rate is always the last in the list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRates {
    factors: BTreeMap<(String, String), Vec<f64>>,
}

impl ExchangeRates {
    /// Build the index from realized cross-currency transactions.
    pub fn from_records(records: &[Transaction]) -> Self {
        let transactions: Vec<Transaction> = records
            .iter()
            .filter(|r| r.amount.is_some())
            .cloned()
            .collect();

        let amount_symbols = symbols(records, true);
        let all_symbols = symbols(records, false);

        let mut factors: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();

        for symbol in &amount_symbols {
            for other_symbol in &all_symbols {
                if symbol == other_symbol {
                    continue;
                }

                let matching: Vec<Transaction> = transactions
                    .iter()
                    .filter(|r| {
                        r.amount.as_ref().and_then(|a| a.symbol.as_deref()) == Some(symbol)
                            && r.dividend.as_ref().and_then(|d| d.symbol.as_deref())
                                == Some(other_symbol)
                    })
                    .cloned()
                    .collect();

                let Some(latest_transaction) = latest_by_payout(&matching) else {
                    continue;
                };
                let reference_date = latest_transaction
                    .payout_date
                    .unwrap_or(latest_transaction.entry_date);

                let applied = amount_conversion_factor(latest_transaction);
                let key = (other_symbol.clone(), symbol.clone());
                let mut observed: Vec<f64> = Vec::new();

                // every observation sharing the reference date is examined;
                // rates disagreeing with the applied one beyond tolerance are
                // kept as deduplicated ambiguous alternatives
                for similar in dated(&matching, reference_date, true) {
                    let factor = amount_conversion_factor(&similar);
                    if is_close(factor, applied, RATE_TOLERANCE) {
                        continue;
                    }
                    let duplicate = observed
                        .iter()
                        .any(|&previous| is_close(previous, factor, RATE_TOLERANCE));
                    if !duplicate {
                        observed.push(factor);
                    }
                }

                // the applied rate goes last, so callers can recover it as
                // the one in use
                observed.push(applied);
                factors.insert(key, observed);
            }
        }

        ExchangeRates { factors }
    }

    /// Return the applied conversion factor from one symbol to another,
    /// falling back to the reciprocal of the reverse pair.
    pub fn factor(&self, from: &str, to: &str) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }
        if let Some(factor) = self.applied(from, to) {
            return Ok(factor);
        }
        if let Some(factor) = self.applied(to, from) {
            return Ok(1.0 / factor);
        }
        Err(LedgerError::conversion(from, to))
    }

    fn applied(&self, from: &str, to: &str) -> Option<f64> {
        self.factors
            .get(&(from.to_string(), to.to_string()))
            .and_then(|observed| observed.last())
            .copied()
    }

    /// Return every observed factor for a pair, ambiguous alternatives first
    /// and the applied rate last.
    pub fn alternatives(&self, from: &str, to: &str) -> Option<&[f64]> {
        self.factors
            .get(&(from.to_string(), to.to_string()))
            .map(|observed| observed.as_slice())
    }

    /// Iterate all known pairs with their observed factors.
    pub fn pairs(&self) -> impl Iterator<Item = (&(String, String), &Vec<f64>)> {
        self.factors.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}
