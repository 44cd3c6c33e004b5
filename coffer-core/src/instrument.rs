use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AccountId, InstrumentId, UserId};

/// A persisted unit of value: fiat currency, security, crypto, or other.
///
/// Codes are unique within their resolution scope, case-insensitively.
/// Once a leg references an instrument it is never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub user_id: UserId,
    /// `None` for user-wide instruments (typically currencies); `Some`
    /// for instruments local to one account (typically broker tickers).
    pub account_id: Option<AccountId>,
    pub code: String,
    pub kind: InstrumentKind,
    /// Decimal places of the smallest unit: 2 for cents, 0 for whole shares.
    pub minor_unit: u32,
    pub name: String,
}

/// Caller authorization to create an instrument on first reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstrumentDraft {
    pub code: String,
    pub kind: InstrumentKind,
    pub minor_unit: u32,
    pub name: String,
}

impl InstrumentDraft {
    pub fn new(
        code: impl Into<String>,
        kind: InstrumentKind,
        minor_unit: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            kind,
            minor_unit,
            name: name.into(),
        }
    }
}

/// Enumerates the supported instrument categories.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Fiat,
    Security,
    Crypto,
    Other,
}

impl InstrumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Fiat => "fiat",
            InstrumentKind::Security => "security",
            InstrumentKind::Crypto => "crypto",
            InstrumentKind::Other => "other",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fiat" => Ok(InstrumentKind::Fiat),
            "security" => Ok(InstrumentKind::Security),
            "crypto" => Ok(InstrumentKind::Crypto),
            "other" => Ok(InstrumentKind::Other),
            other => Err(format!("unknown instrument kind: {other}")),
        }
    }
}
