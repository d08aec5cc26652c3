//! Wallet reservations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::WalletError;
use crate::domain::shared::{AccountId, OrderId, ReservationId};

code_enum! {
    /// Reservation lifecycle status.
    pub enum ReservationStatus("reservation_status") {
        /// Holding funds for a live order.
        Active => "ACTIVE",
        /// Remainder returned after cancellation.
        Released => "RELEASED",
        /// Order filled; remainder (if any) returned.
        Consumed => "CONSUMED",
        /// Order refused by the exchange; funds returned.
        Cancelled => "CANCELLED",
    }
}

/// Funds held for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletReservation {
    /// Row identifier.
    pub id: ReservationId,
    /// Account.
    pub account_id: AccountId,
    /// Reserved asset.
    pub asset: String,
    /// Remaining reserved amount.
    pub amount: Decimal,
    /// Order holding the funds.
    pub order_id: OrderId,
    /// Status.
    pub status: ReservationStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl WalletReservation {
    /// Open an active reservation.
    #[must_use]
    pub fn open(
        account_id: AccountId,
        asset: impl Into<String>,
        amount: Decimal,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::generate(),
            account_id,
            asset: asset.into(),
            amount,
            order_id,
            status: ReservationStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Draw down up to `wanted`, returning the amount actually taken.
    ///
    /// # Errors
    ///
    /// `ReservationInactive` unless the reservation is active.
    pub fn consume(&mut self, wanted: Decimal, now: DateTime<Utc>) -> Result<Decimal, WalletError> {
        self.ensure_active()?;
        let taken = wanted.min(self.amount).max(Decimal::ZERO);
        self.amount -= taken;
        self.updated_at = now;
        Ok(taken)
    }

    /// Close the reservation with `status`, returning the remainder to give
    /// back to available.
    ///
    /// # Errors
    ///
    /// `ReservationInactive` unless the reservation is active.
    pub fn close(
        &mut self,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<Decimal, WalletError> {
        self.ensure_active()?;
        let remainder = self.amount;
        self.amount = Decimal::ZERO;
        self.status = status;
        self.updated_at = now;
        Ok(remainder)
    }

    fn ensure_active(&self) -> Result<(), WalletError> {
        if self.status == ReservationStatus::Active {
            Ok(())
        } else {
            Err(WalletError::ReservationInactive {
                reservation_id: self.id.to_string(),
                status: self.status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn reservation(amount: Decimal) -> WalletReservation {
        WalletReservation::open(
            AccountId::new("a-1"),
            "USDT",
            amount,
            OrderId::new("o-1"),
            Utc::now(),
        )
    }

    #[test]
    fn consume_caps_at_remaining() {
        let mut res = reservation(dec!(100));
        assert_eq!(res.consume(dec!(60), Utc::now()).unwrap(), dec!(60));
        assert_eq!(res.consume(dec!(60), Utc::now()).unwrap(), dec!(40));
        assert_eq!(res.amount, Decimal::ZERO);
        assert_eq!(res.status, ReservationStatus::Active);
    }

    #[test]
    fn close_returns_remainder_once() {
        let mut res = reservation(dec!(100));
        assert_eq!(res.close(ReservationStatus::Released, Utc::now()).unwrap(), dec!(100));
        assert!(res.close(ReservationStatus::Released, Utc::now()).is_err());
        assert!(res.consume(dec!(1), Utc::now()).is_err());
    }
}
