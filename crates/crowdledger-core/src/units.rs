//! Currency amounts.
//!
//! Amounts are carried as integer base units. One display unit equals
//! [`UNIT_SCALE`] base units, mirroring the 18-decimal convention wallets
//! expect.

use crate::error::CoreError;

pub type Amount = u128;

pub const DECIMALS: u32 = 18;
pub const UNIT_SCALE: Amount = 1_000_000_000_000_000_000;

/// Parse a human decimal such as `"1.5"` into base units.
pub fn parse_units(input: &str) -> Result<Amount, CoreError> {
    let s = input.trim();
    let invalid = |reason| CoreError::InvalidAmount {
        input: input.to_string(),
        reason,
    };
    if s.is_empty() {
        return Err(invalid("empty"));
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }
    if frac.len() > DECIMALS as usize {
        return Err(invalid("more than 18 fractional digits"));
    }

    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("overflow"))?
    };
    let mut frac_units: Amount = 0;
    if !frac.is_empty() {
        let padded = format!("{frac:0<width$}", width = DECIMALS as usize);
        frac_units = padded.parse().map_err(|_| invalid("overflow"))?;
    }
    whole
        .checked_mul(UNIT_SCALE)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| invalid("overflow"))
}

/// Render base units as a decimal with trailing zeros trimmed.
pub fn format_units(amount: Amount) -> String {
    let whole = amount / UNIT_SCALE;
    let frac = amount % UNIT_SCALE;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0>width$}", width = DECIMALS as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Serde adapter that carries an [`Amount`] as a decimal string, so values
/// above `u64::MAX` survive JSON intermediaries.
pub mod serde_amount {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse::<Amount>().map_err(D::Error::custom)
    }
}
