//! Integer money helpers. Every amount is kobo (1/100 NGN) held in an `i64`.

use crate::error::{MarketError, MarketResult};

pub type Kobo = i64;

pub const KOBO_PER_NAIRA: Kobo = 100;

pub const BPS_SCALE: u32 = 10_000;

/// Whole naira to kobo.
pub const fn naira(amount: i64) -> Kobo {
    amount * KOBO_PER_NAIRA
}

/// Share of `amount` at `bps` basis points, truncated toward zero.
///
/// The amount is split into quotient and remainder over the scale first so the
/// intermediate product stays within `i64` for any valid amount.
pub fn bps_share(amount: Kobo, bps: u32) -> MarketResult<Kobo> {
    if amount < 0 {
        return Err(MarketError::InvalidAmount(format!(
            "negative amount {amount}"
        )));
    }
    if bps > BPS_SCALE {
        return Err(MarketError::Validation(format!(
            "basis points {bps} exceed {BPS_SCALE}"
        )));
    }
    let bps = i64::from(bps);
    let scale = i64::from(BPS_SCALE);
    let quotient = amount / scale;
    let remainder = amount % scale;
    Ok(quotient * bps + (remainder * bps) / scale)
}

/// Render kobo as `₦1,234.56`.
pub fn format_naira(amount: Kobo) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let whole = (abs / KOBO_PER_NAIRA as u64).to_string();
    let minor = abs % KOBO_PER_NAIRA as u64;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}₦{grouped}.{minor:02}")
}
