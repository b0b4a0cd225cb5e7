//! Fee schedules for withdrawals and escrow funding.

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::money::{bps_share, naira, Kobo, BPS_SCALE};

/// Withdrawal fee: percentage plus flat, clamped to `[min_fee, max_fee]`.
///
/// Amounts at or below `flat_fee_threshold` pay only the flat fee (still
/// clamped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFeeSchedule {
    pub percentage_bps: u32,
    pub flat_fee: Kobo,
    pub min_fee: Kobo,
    pub max_fee: Kobo,
    #[serde(default)]
    pub flat_fee_threshold: Kobo,
}

impl Default for WithdrawalFeeSchedule {
    fn default() -> Self {
        Self {
            percentage_bps: 150,
            flat_fee: naira(100),
            min_fee: naira(50),
            max_fee: naira(2_000),
            flat_fee_threshold: 0,
        }
    }
}

/// Outcome of pricing a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub amount: Kobo,
    pub fee: Kobo,
    pub net_amount: Kobo,
}

impl WithdrawalFeeSchedule {
    pub fn validate(&self) -> MarketResult<()> {
        if self.percentage_bps > BPS_SCALE {
            return Err(MarketError::Validation(format!(
                "withdrawal fee percentage_bps {} exceeds {}",
                self.percentage_bps, BPS_SCALE
            )));
        }
        if self.flat_fee < 0 || self.min_fee < 0 || self.flat_fee_threshold < 0 {
            return Err(MarketError::Validation(
                "withdrawal fee amounts must not be negative".to_string(),
            ));
        }
        if self.min_fee > self.max_fee {
            return Err(MarketError::Validation(format!(
                "withdrawal min_fee {} is above max_fee {}",
                self.min_fee, self.max_fee
            )));
        }
        Ok(())
    }

    /// Fee for `amount`. Rejects non-positive amounts.
    pub fn fee(&self, amount: Kobo) -> MarketResult<Kobo> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(format!(
                "withdrawal amount must be positive, got {amount}"
            )));
        }
        let raw = if amount <= self.flat_fee_threshold {
            self.flat_fee
        } else {
            bps_share(amount, self.percentage_bps)?
                .checked_add(self.flat_fee)
                .ok_or_else(|| MarketError::InvalidAmount("fee overflow".to_string()))?
        };
        Ok(raw.clamp(self.min_fee, self.max_fee))
    }

    /// Fee and net amount for `amount`. Rejects amounts the fee would consume.
    pub fn quote(&self, amount: Kobo) -> MarketResult<FeeQuote> {
        let fee = self.fee(amount)?;
        if fee >= amount {
            return Err(MarketError::InvalidAmount(format!(
                "amount {amount} does not cover the {fee} withdrawal fee"
            )));
        }
        Ok(FeeQuote {
            amount,
            fee,
            net_amount: amount - fee,
        })
    }
}

/// Escrow fee charged to the client on top of the escrowed amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowFeeSchedule {
    pub fee_bps: u32,
}

impl Default for EscrowFeeSchedule {
    fn default() -> Self {
        Self { fee_bps: 250 }
    }
}

impl EscrowFeeSchedule {
    pub fn fee(&self, amount: Kobo) -> MarketResult<Kobo> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(format!(
                "escrow amount must be positive, got {amount}"
            )));
        }
        bps_share(amount, self.fee_bps)
    }
}
