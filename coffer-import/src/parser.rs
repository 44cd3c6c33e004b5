use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use coffer_core::{CanonicalTransaction, ParseIssue};

use crate::{bank_csv, trade_csv};

/// Result of parsing one raw export: the canonical transactions plus the
/// rows the parser could not interpret. Parsing never aborts a batch.
#[derive(Clone, Debug, Default)]
pub struct Parsed {
    pub transactions: Vec<CanonicalTransaction>,
    pub issues: Vec<ParseIssue>,
}

/// Closed set of supported provider formats.
///
/// Selection is explicit caller configuration; there is no stringly-typed
/// dispatch on account metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderFormat {
    /// Plain bank statement CSV: one single-leg transaction per row.
    BankCsv,
    /// Brokerage trade CSV: one two-leg trade per fill, fills grouped by
    /// order id.
    TradeCsv,
}

impl ProviderFormat {
    pub fn parse(self, raw: &str) -> Parsed {
        match self {
            ProviderFormat::BankCsv => bank_csv::parse(raw),
            ProviderFormat::TradeCsv => trade_csv::parse(raw),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderFormat::BankCsv => "bank-csv",
            ProviderFormat::TradeCsv => "trade-csv",
        }
    }
}

impl fmt::Display for ProviderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank-csv" => Ok(ProviderFormat::BankCsv),
            "trade-csv" => Ok(ProviderFormat::TradeCsv),
            other => Err(format!("unknown provider format: {other}")),
        }
    }
}
