use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use coffer_core::{CanonicalLeg, CanonicalTransaction, EventType, LegAmount, ParseIssue};

use crate::Parsed;

/// Raw row shape of a brokerage trade export:
/// `order_id,date,side,symbol,units,total,currency`.
#[derive(Debug, Deserialize)]
struct TradeRow {
    order_id: String,
    date: String,
    side: String,
    symbol: String,
    units: Decimal,
    total: Decimal,
    currency: String,
}

/// Parse a trade CSV. Each fill yields a security leg and an opposite-sign
/// cash leg; fills sharing an order id merge into one multi-leg event, so
/// partially-filled orders land as a single transaction.
pub(crate) fn parse(raw: &str) -> Parsed {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let mut parsed = Parsed::default();
    let mut by_order: HashMap<String, usize> = HashMap::new();
    for (idx, result) in reader.deserialize::<TradeRow>().enumerate() {
        let line = idx as u32 + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                parsed.issues.push(ParseIssue::new(line, err.to_string()));
                continue;
            }
        };
        match row_to_legs(&row) {
            Ok((effective_at, legs)) => {
                if let Some(&slot) = by_order.get(&row.order_id) {
                    parsed.transactions[slot].legs.extend(legs);
                } else {
                    let description = format!(
                        "{} {} {}",
                        row.side.to_uppercase(),
                        row.units,
                        row.symbol
                    );
                    let transaction = CanonicalTransaction {
                        group_key: row.order_id.clone(),
                        external_id: Some(row.order_id.clone()),
                        event_type: EventType::Trade,
                        effective_at,
                        posted_at: None,
                        description,
                        legs,
                    };
                    by_order.insert(row.order_id, parsed.transactions.len());
                    parsed.transactions.push(transaction);
                }
            }
            Err(message) => parsed.issues.push(ParseIssue::new(line, message)),
        }
    }
    parsed
}

fn row_to_legs(row: &TradeRow) -> Result<(DateTime<Utc>, Vec<CanonicalLeg>), String> {
    let effective_at = parse_date(&row.date)?;
    if row.units.is_sign_negative() || row.units.is_zero() {
        return Err(format!("units must be positive, got {}", row.units));
    }
    if row.total.is_sign_negative() || row.total.is_zero() {
        return Err(format!("total must be positive, got {}", row.total));
    }
    let (unit_sign, cash_sign) = match row.side.to_lowercase().as_str() {
        "buy" => (Decimal::ONE, -Decimal::ONE),
        "sell" => (-Decimal::ONE, Decimal::ONE),
        other => return Err(format!("unknown trade side: {other}")),
    };
    let legs = vec![
        CanonicalLeg::new(row.symbol.clone(), LegAmount::Decimal(row.units * unit_sign)),
        CanonicalLeg::new(row.currency.clone(), LegAmount::Decimal(row.total * cash_sign)),
    ];
    Ok((effective_at, legs))
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("invalid date {raw}: {err}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date {raw}"))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}
