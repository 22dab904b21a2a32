//! Conversions between decimal amount strings and integer smallest units.
//!
//! Everything here works on digit strings and `u128`; binary floating point
//! never touches an amount on its way to a transaction.

use rust_decimal::Decimal;

use crate::error::AmountError;

/// Largest precision whose scale factor still fits in a `u128`
pub const MAX_DECIMALS: u8 = 38;

/// Parse a decimal string into smallest units at the given precision.
///
/// Fractional digits beyond `decimals` are truncated, never rounded.
pub fn parse_units(text: &str, decimals: u8) -> Result<u128, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedPrecision(decimals));
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());

    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountError::Invalid(text.to_string()));
    }

    let scale = 10u128.pow(decimals as u32);

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| AmountError::Overflow)?
    };
    let whole_units = whole_units.checked_mul(scale).ok_or(AmountError::Overflow)?;

    let kept = &fraction[..fraction.len().min(decimals as usize)];
    let fraction_units = if kept.is_empty() {
        0
    } else {
        let padding = 10u128.pow((decimals as usize - kept.len()) as u32);
        kept.parse::<u128>().map_err(|_| AmountError::Overflow)? * padding
    };

    whole_units
        .checked_add(fraction_units)
        .ok_or(AmountError::Overflow)
}

/// Render smallest units as a decimal string.
///
/// Trailing fractional zeros are trimmed but one fractional digit is always
/// kept, so `98_000_000` at 6 decimals renders as `"98.0"`.
pub fn format_units(units: u128, decimals: u8) -> String {
    let digits = units.to_string();
    let decimals = decimals as usize;

    let (whole, fraction) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Decimal view of an amount, for display arithmetic only.
///
/// Returns `None` when the value does not fit `Decimal`'s 96-bit mantissa or
/// the precision exceeds its maximum scale.
pub fn to_decimal(units: u128, decimals: u8) -> Option<Decimal> {
    let value = i128::try_from(units).ok()?;
    Decimal::try_from_i128_with_scale(value, decimals as u32).ok()
}
