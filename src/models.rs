use std::cmp::Ordering;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::Location;

// Core data structures for journal records.

/// Tolerance used when comparing positions and inferred amounts.
pub const POSITION_TOLERANCE: f64 = 1e-6;

/// Compare two values for near-equality within an absolute tolerance.
pub fn is_close(a: f64, b: f64, abs_tol: f64) -> bool {
    (a - b).abs() <= f64::max(1e-9 * f64::max(a.abs(), b.abs()), abs_tol)
}

/// Whether a value was literally entered in a journal or produced by
/// inference or forecasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Origin {
    #[default]
    Literal,
    Generated,
}

/// Represents the type of a dividend distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distribution {
    /// Regular distribution
    #[default]
    Final,
    /// Distribution between regulars
    Interim,
    /// Irregular one-off distribution
    Special,
}

/// Represents a cash amount.
///
/// `places` is the user's display precision; `fmt` is a template with a
/// single `%s` placeholder recording which side the symbol was written on
/// (e.g. `"$ %s"` vs `"%s kr"`). An amount with value zero and only a
/// symbol acts as a preliminary placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub value: f64,
    pub places: Option<usize>,
    pub symbol: Option<String>,
    pub fmt: Option<String>,
    pub origin: Origin,
}

impl Amount {
    pub fn literal(
        value: f64,
        places: Option<usize>,
        symbol: Option<String>,
        fmt: Option<String>,
    ) -> Self {
        Amount {
            value,
            places,
            symbol,
            fmt,
            origin: Origin::Literal,
        }
    }

    pub fn generated(
        value: f64,
        places: Option<usize>,
        symbol: Option<String>,
        fmt: Option<String>,
    ) -> Self {
        Amount {
            value,
            places,
            symbol,
            fmt,
            origin: Origin::Generated,
        }
    }

    pub fn is_generated(&self) -> bool {
        self.origin == Origin::Generated
    }
}

/// A position change directive attached to a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Directive {
    /// The value is an absolute position, or inferred from history when absent
    #[default]
    Set,
    /// Add the value to the previous position
    Add,
    /// Subtract the value from the previous position
    Sub,
    /// Multiply the previous position by the value, keeping fractions
    Split,
    /// Multiply the previous position by the value, flooring to whole shares
    SplitWhole,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Positioning {
    pub value: Option<f64>,
    pub directive: Directive,
}

impl Positioning {
    pub fn set(value: Option<f64>) -> Self {
        Positioning {
            value,
            directive: Directive::Set,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self.directive, Directive::Split | Directive::SplitWhole)
    }
}

/// Facts about a journal entry that can only be known at parse-time.
///
/// A record may undergo several processing steps that change its final
/// representation; e.g. whether a record was preliminary cannot be deduced
/// once an estimated amount has been attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryAttributes {
    pub location: Location,
    pub positioning: Positioning,
    pub is_preliminary: bool,
    pub preliminary_amount: Option<Amount>,
}

impl EntryAttributes {
    pub fn new(location: Location, positioning: Positioning) -> Self {
        EntryAttributes {
            location,
            positioning,
            is_preliminary: false,
            preliminary_amount: None,
        }
    }
}

/// Represents a transactional record.
///
/// The entry date is the user's chosen primary date; no assumption is made
/// whether it is the payout date, the ex-dividend date or neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub entry_date: NaiveDate,
    pub ticker: String,
    /// Absolute position; fractional shares are allowed
    pub position: f64,
    pub amount: Option<Amount>,
    pub dividend: Option<Amount>,
    pub kind: Distribution,
    /// Date cash is received; never earlier than the ex-date
    pub payout_date: Option<NaiveDate>,
    /// Date the share must be held by
    pub ex_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub entry_attr: Option<EntryAttributes>,
    pub origin: Origin,
}

impl Transaction {
    /// Return true if the record only declares a position change, as is
    /// typically the case for a buy/sell entry.
    pub fn is_positional(&self) -> bool {
        self.amount.is_none() && self.dividend.is_none()
    }

    pub fn is_generated(&self) -> bool {
        self.origin == Origin::Generated
    }

    pub fn location(&self) -> Option<Location> {
        self.entry_attr.as_ref().map(|attr| attr.location.clone())
    }

    fn literal_location(&self) -> (&Path, usize) {
        match &self.entry_attr {
            Some(attr) => (attr.location.path.as_path(), attr.location.line),
            None => (Path::new(""), 0),
        }
    }

    /// Canonical ordering: by entry date, with realized transactions before
    /// positional ones on the same date, then by literal journal location
    /// (records without one, i.e. projections, sort first), and finally by
    /// ticker for determinism.
    pub fn canonical_cmp(&self, other: &Transaction) -> Ordering {
        (
            self.entry_date,
            self.is_positional(),
            self.literal_location(),
            self.ticker.as_str(),
        )
            .cmp(&(
                other.entry_date,
                other.is_positional(),
                other.literal_location(),
                other.ticker.as_str(),
            ))
    }
}

/// Sort records into canonical order. The sort is stable and idempotent.
pub fn sort_canonically(records: &mut [Transaction]) {
    records.sort_by(Transaction::canonical_cmp);
}
