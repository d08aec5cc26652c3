//! Wallet balance rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::WalletError;
use crate::domain::shared::AccountId;

/// Funds of one account in one asset. Both columns stay non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Account.
    pub account_id: AccountId,
    /// Asset code, e.g. `USDT`.
    pub asset: String,
    /// Freely usable funds.
    pub available: Decimal,
    /// Funds held for open orders.
    pub reserved: Decimal,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    /// An empty balance row.
    #[must_use]
    pub fn empty(account_id: AccountId, asset: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            asset: asset.into(),
            available: Decimal::ZERO,
            reserved: Decimal::ZERO,
            updated_at: now,
        }
    }

    /// Total funds.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.reserved
    }

    /// Move `amount` from available to reserved.
    ///
    /// # Errors
    ///
    /// `InsufficientBalance` if available does not cover `amount`.
    pub fn reserve(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.available < amount {
            return Err(WalletError::InsufficientBalance {
                account_id: self.account_id.to_string(),
                asset: self.asset.clone(),
                requested: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        self.reserved += amount;
        self.updated_at = now;
        Ok(())
    }

    /// Move `amount` from reserved back to available.
    ///
    /// # Errors
    ///
    /// `ReservedBalanceMismatch` if reserved is below `amount`.
    pub fn release(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.ensure_reserved(amount)?;
        self.reserved -= amount;
        self.available += amount;
        self.updated_at = now;
        Ok(())
    }

    /// Remove `amount` from reserved (spent by a fill).
    ///
    /// # Errors
    ///
    /// `ReservedBalanceMismatch` if reserved is below `amount`.
    pub fn consume_reserved(
        &mut self,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.ensure_reserved(amount)?;
        self.reserved -= amount;
        self.updated_at = now;
        Ok(())
    }

    /// Add `amount` to available.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is not positive.
    pub fn credit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.available += amount;
        self.updated_at = now;
        Ok(())
    }

    /// Remove `amount` from available.
    ///
    /// # Errors
    ///
    /// `SettlementShortfall` if available does not cover `amount`.
    pub fn debit_available(
        &mut self,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.available < amount {
            return Err(WalletError::SettlementShortfall {
                account_id: self.account_id.to_string(),
                asset: self.asset.clone(),
                shortfall: amount - self.available,
            });
        }
        self.available -= amount;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_reserved(&self, amount: Decimal) -> Result<(), WalletError> {
        if self.reserved < amount {
            return Err(WalletError::ReservedBalanceMismatch {
                account_id: self.account_id.to_string(),
                asset: self.asset.clone(),
                required: amount,
            });
        }
        Ok(())
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount {
            amount,
            reason: "must be positive",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded(available: Decimal) -> WalletBalance {
        let mut balance = WalletBalance::empty(AccountId::new("a-1"), "USDT", Utc::now());
        balance.available = available;
        balance
    }

    #[test]
    fn reserve_and_release_round_trip() {
        let mut balance = funded(dec!(5000));
        balance.reserve(dec!(4500), Utc::now()).unwrap();
        assert_eq!(balance.available, dec!(500));
        assert_eq!(balance.reserved, dec!(4500));

        balance.release(dec!(4500), Utc::now()).unwrap();
        assert_eq!(balance.available, dec!(5000));
        assert_eq!(balance.reserved, Decimal::ZERO);
    }

    #[test]
    fn reserve_beyond_available_fails() {
        let mut balance = funded(dec!(100));
        let err = balance.reserve(dec!(100.01), Utc::now()).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(balance.available, dec!(100));
    }

    #[test]
    fn debit_shortfall_reports_missing_amount() {
        let mut balance = funded(dec!(1));
        let err = balance.debit_available(dec!(3), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            WalletError::SettlementShortfall {
                account_id: "a-1".to_string(),
                asset: "USDT".to_string(),
                shortfall: dec!(2),
            }
        );
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let mut balance = funded(dec!(1));
        assert!(balance.credit(Decimal::ZERO, Utc::now()).is_err());
    }
}
