use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::format::DecimalSeparator;

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default journal path, used when no journal is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<PathBuf>,
    /// Decimal separator for parsing and formatting numbers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_separator: Option<DecimalSeparator>,
}

/// Environment variable naming the default journal.
pub const JOURNAL_ENV: &str = "DIVIDEND_LEDGER_FILE";

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("dividend-ledger");

        Ok(dir)
    }

    /// Get the configuration file path.
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults when no file exists.
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            let contents = fs::read_to_string(&config_file)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir)?;

        let config_file = Self::config_file()?;
        let contents = toml::to_string_pretty(&self)?;
        fs::write(config_file, contents)?;

        Ok(())
    }

    pub fn decimal_separator(&self) -> DecimalSeparator {
        self.decimal_separator.unwrap_or_default()
    }

    /// Resolve the journals to read: paths given on the command line, else
    /// the environment variable, else the configured journal, else
    /// `~/.dividend-ledger.journal`.
    pub fn resolve_journals(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        if !paths.is_empty() {
            return paths.to_vec();
        }
        if let Ok(path) = env::var(JOURNAL_ENV) {
            return vec![PathBuf::from(path)];
        }
        if let Some(path) = &self.journal {
            return vec![path.clone()];
        }
        let home = dirs::home_dir().unwrap_or_default();
        vec![home.join(".dividend-ledger.journal")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths_win() {
        let config = Config {
            journal: Some(PathBuf::from("/etc/ledger.journal")),
            decimal_separator: None,
        };
        let paths = vec![PathBuf::from("a.journal")];
        assert_eq!(config.resolve_journals(&paths), paths);
    }

    #[test]
    fn test_configured_journal_is_used() {
        let config = Config {
            journal: Some(PathBuf::from("/etc/ledger.journal")),
            decimal_separator: None,
        };
        if env::var(JOURNAL_ENV).is_err() {
            assert_eq!(
                config.resolve_journals(&[]),
                vec![PathBuf::from("/etc/ledger.journal")]
            );
        }
    }

    #[test]
    fn test_separator_round_trips_through_toml() {
        let config = Config {
            journal: None,
            decimal_separator: Some(DecimalSeparator::Comma),
        };
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.decimal_separator, Some(DecimalSeparator::Comma));
    }
}
