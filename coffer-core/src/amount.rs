use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when a parsed amount cannot be expressed in minor units.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount {amount} has a fractional remainder at {minor_unit} decimal places")]
    FractionalMinorUnit { amount: Decimal, minor_unit: u32 },
    #[error("amount {amount} overflows the minor-unit range")]
    Overflow { amount: Decimal },
}

/// Signed amount as reported by a provider parser.
///
/// Providers that export integer cents produce `Minor` directly; providers
/// that export decimal strings produce `Decimal`, scaled to minor units
/// only once the instrument's exponent is known.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegAmount {
    Minor(i64),
    Decimal(Decimal),
}

impl LegAmount {
    /// Scale to integer minor units using the instrument's exponent.
    ///
    /// Fails rather than rounds: an export claiming three decimal places
    /// for a two-decimal currency is a data problem, not a rounding choice.
    pub fn to_minor(self, minor_unit: u32) -> Result<i64, AmountError> {
        match self {
            LegAmount::Minor(value) => Ok(value),
            LegAmount::Decimal(value) => {
                if minor_unit > 18 {
                    return Err(AmountError::Overflow { amount: value });
                }
                let scale = Decimal::from(10i64.pow(minor_unit));
                let scaled = value
                    .checked_mul(scale)
                    .ok_or(AmountError::Overflow { amount: value })?;
                if !scaled.fract().is_zero() {
                    return Err(AmountError::FractionalMinorUnit {
                        amount: value,
                        minor_unit,
                    });
                }
                scaled
                    .to_i64()
                    .ok_or(AmountError::Overflow { amount: value })
            }
        }
    }
}

/// Render a minor-unit amount as a decimal string for display.
///
/// Aggregation stays in integers end to end; division by `10^minor_unit`
/// happens only here, at presentation time.
pub fn format_minor(amount_minor: i64, minor_unit: u32) -> String {
    if minor_unit == 0 {
        return amount_minor.to_string();
    }
    let divisor = 10i128.pow(minor_unit);
    let value = amount_minor as i128;
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    let whole = magnitude / divisor as u128;
    let frac = magnitude % divisor as u128;
    format!("{sign}{whole}.{frac:0width$}", width = minor_unit as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_scales_to_minor_units() {
        assert_eq!(LegAmount::Decimal(dec!(-55.20)).to_minor(2), Ok(-5520));
        assert_eq!(LegAmount::Decimal(dec!(19)).to_minor(0), Ok(19));
        assert_eq!(LegAmount::Minor(-855_00).to_minor(2), Ok(-85500));
    }

    #[test]
    fn fractional_remainder_is_rejected() {
        let err = LegAmount::Decimal(dec!(1.005)).to_minor(2).unwrap_err();
        assert!(matches!(err, AmountError::FractionalMinorUnit { .. }));
    }

    #[test]
    fn formats_with_padding_and_sign() {
        assert_eq!(format_minor(-5520, 2), "-55.20");
        assert_eq!(format_minor(5, 2), "0.05");
        assert_eq!(format_minor(19, 0), "19");
        assert_eq!(format_minor(-855_00, 2), "-855.00");
    }
}
