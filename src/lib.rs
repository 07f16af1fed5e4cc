//! Track realized dividend income from a plain-text journal and forecast
//! the next twelve months of payouts.
//!
//! A journal is a line-oriented text file of dividend transactions:
//!
//! ```text
//! 2019/02/14 AAPL (100)  $ 73  @ $ 0.73
//! 2019/05/16 AAPL        $ 77  @ $ 0.77
//! 2020/02/01 ABC (+50)
//! 2021/02/10 ABC (x2!)          # whole-share split
//! ```
//!
//! The pipeline reads entries ([`journal`]), infers absolute positions and
//! missing components, adjusts history for splits and prunes redundant
//! entries ([`transform`]), derives exchange rates from observed
//! cross-currency payouts ([`rates`]), and projects the forward twelve
//! months of transactions ([`projection`]). Every pass is a pure function
//! from one sequence of records to a new one, kept in canonical order.

pub mod config;
pub mod dates;
pub mod diagnostics;
pub mod encoding;
pub mod errors;
pub mod format;
pub mod import;
pub mod journal;
pub mod models;
pub mod projection;
pub mod rates;
pub mod records;
pub mod report;
pub mod transform;

pub use errors::{LedgerError, Location, Result};
pub use format::DecimalSeparator;
pub use models::{Amount, Distribution, Origin, Transaction};
