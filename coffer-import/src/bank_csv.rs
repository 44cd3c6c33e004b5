use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use coffer_core::{CanonicalLeg, CanonicalTransaction, EventType, LegAmount, ParseIssue};

use crate::Parsed;

/// Raw row shape of a plain bank statement export:
/// `date,description,amount,currency[,id]`.
#[derive(Debug, Deserialize)]
struct BankRow {
    date: String,
    description: String,
    amount: Decimal,
    currency: String,
    #[serde(default)]
    id: Option<String>,
}

/// Parse a bank statement CSV into single-leg canonical transactions.
///
/// Rows the reader cannot interpret become issues; good rows are kept.
pub(crate) fn parse(raw: &str) -> Parsed {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let mut parsed = Parsed::default();
    for (idx, result) in reader.deserialize::<BankRow>().enumerate() {
        // Header occupies line 1.
        let line = idx as u32 + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                parsed.issues.push(ParseIssue::new(line, err.to_string()));
                continue;
            }
        };
        match row_to_transaction(row, line) {
            Ok(transaction) => parsed.transactions.push(transaction),
            Err(message) => parsed.issues.push(ParseIssue::new(line, message)),
        }
    }
    parsed
}

fn row_to_transaction(row: BankRow, line: u32) -> Result<CanonicalTransaction, String> {
    let effective_at = parse_date(&row.date)?;
    if row.description.is_empty() {
        return Err("empty description".to_string());
    }
    if row.currency.is_empty() {
        return Err("empty currency code".to_string());
    }
    let event_type = if row.amount.is_sign_negative() {
        EventType::Purchase
    } else {
        EventType::Payout
    };
    let mut transaction = CanonicalTransaction::single(
        format!("L{line}"),
        event_type,
        effective_at,
        row.description,
        CanonicalLeg::new(row.currency, LegAmount::Decimal(row.amount)),
    );
    if let Some(id) = row.id.filter(|id| !id.is_empty()) {
        transaction = transaction.with_external_id(id);
    }
    Ok(transaction)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("invalid date {raw}: {err}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date {raw}"))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}
