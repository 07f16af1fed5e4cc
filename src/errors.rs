use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// A source position within a journal file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Location {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// Errors produced while reading, normalizing, projecting or converting
/// journal records.
///
/// Parse, inference and integrity errors carry the `(path, line)` of the
/// offending entry when it originates from a journal file. Records produced
/// by projection have no source location.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{}{reason}", fmt_location(.location))]
    Parse {
        location: Option<Location>,
        reason: String,
    },
    #[error("{}{reason}", fmt_location(.location))]
    Inference {
        location: Option<Location>,
        reason: String,
    },
    #[error("{}{reason}", fmt_location(.location))]
    Integrity {
        location: Option<Location>,
        reason: String,
    },
    #[error("can't exchange between {from}/{to}")]
    Conversion { from: String, to: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn fmt_location(location: &Option<Location>) -> String {
    match location {
        Some(location) => format!("{} ", location),
        None => String::new(),
    }
}

impl LedgerError {
    pub fn parse(path: &Path, line: usize, reason: impl Into<String>) -> Self {
        LedgerError::Parse {
            location: Some(Location::new(path, line)),
            reason: reason.into(),
        }
    }

    pub fn inference(location: Option<Location>, reason: impl Into<String>) -> Self {
        LedgerError::Inference {
            location,
            reason: reason.into(),
        }
    }

    pub fn integrity(location: Option<Location>, reason: impl Into<String>) -> Self {
        LedgerError::Integrity {
            location,
            reason: reason.into(),
        }
    }

    pub fn conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        LedgerError::Conversion {
            from: from.into(),
            to: to.into(),
        }
    }
}
