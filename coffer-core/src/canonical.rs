use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CategoryId, LegAmount};

/// Format-independent transaction produced by every provider parser.
///
/// Parsers merge raw rows sharing a `group_key` into one transaction, so a
/// multi-leg event (trade, exchange) arrives here already assembled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub group_key: String,
    pub external_id: Option<String>,
    pub event_type: EventType,
    pub effective_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub description: String,
    pub legs: Vec<CanonicalLeg>,
}

impl CanonicalTransaction {
    /// Convenience constructor for the common single-leg case.
    pub fn single(
        group_key: impl Into<String>,
        event_type: EventType,
        effective_at: DateTime<Utc>,
        description: impl Into<String>,
        leg: CanonicalLeg,
    ) -> Self {
        Self {
            group_key: group_key.into(),
            external_id: None,
            event_type,
            effective_at,
            posted_at: None,
            description: description.into(),
            legs: vec![leg],
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// One signed money movement named by instrument code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalLeg {
    pub instrument_code: String,
    pub amount: LegAmount,
    pub category: Option<CategoryId>,
    pub note: Option<String>,
}

impl CanonicalLeg {
    pub fn new(instrument_code: impl Into<String>, amount: LegAmount) -> Self {
        Self {
            instrument_code: instrument_code.into(),
            amount,
            category: None,
            note: None,
        }
    }
}

/// Enumerates the supported financial occurrence categories.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Purchase,
    Transfer,
    Exchange,
    Trade,
    BillPayment,
    Payout,
    Adjustment,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Purchase => "purchase",
            EventType::Transfer => "transfer",
            EventType::Exchange => "exchange",
            EventType::Trade => "trade",
            EventType::BillPayment => "bill_payment",
            EventType::Payout => "payout",
            EventType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(EventType::Purchase),
            "transfer" => Ok(EventType::Transfer),
            "exchange" => Ok(EventType::Exchange),
            "trade" => Ok(EventType::Trade),
            "bill_payment" => Ok(EventType::BillPayment),
            "payout" => Ok(EventType::Payout),
            "adjustment" => Ok(EventType::Adjustment),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Row-level failure reported by a parser, carried into the batch error
/// list unmodified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParseIssue {
    pub line: u32,
    pub message: String,
}

impl ParseIssue {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_roundtrip() {
        for kind in [
            EventType::Purchase,
            EventType::Transfer,
            EventType::Exchange,
            EventType::Trade,
            EventType::BillPayment,
            EventType::Payout,
            EventType::Adjustment,
        ] {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!("dividendz".parse::<EventType>().is_err());
    }
}
