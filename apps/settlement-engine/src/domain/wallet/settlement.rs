//! Applying a signed fill delta to a balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::balance::WalletBalance;
use super::errors::WalletError;
use super::reservation::WalletReservation;

/// How a negative delta was covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebitSplit {
    /// Drawn from the order's reservation.
    pub from_reservation: Decimal,
    /// Drawn from available.
    pub from_available: Decimal,
}

/// Apply `delta` to `balance`.
///
/// Positive deltas credit available. Negative deltas draw the matching
/// reservation first and available for the rest. Both `balance` and
/// `reservation` are left untouched on error.
///
/// # Errors
///
/// `SettlementShortfall` when reservation plus available cannot cover a
/// debit.
pub fn apply_delta(
    balance: &mut WalletBalance,
    reservation: Option<&mut WalletReservation>,
    delta: Decimal,
    now: DateTime<Utc>,
) -> Result<DebitSplit, WalletError> {
    if delta > Decimal::ZERO {
        balance.credit(delta, now)?;
        return Ok(DebitSplit::default());
    }
    if delta.is_zero() {
        return Ok(DebitSplit::default());
    }

    let needed = -delta;
    let reservable = reservation
        .as_ref()
        .map_or(Decimal::ZERO, |r| r.amount.min(balance.reserved));
    let from_reservation = needed.min(reservable);
    let from_available = needed - from_reservation;

    if from_available > balance.available {
        return Err(WalletError::SettlementShortfall {
            account_id: balance.account_id.to_string(),
            asset: balance.asset.clone(),
            shortfall: from_available - balance.available,
        });
    }

    if let Some(reservation) = reservation
        && from_reservation > Decimal::ZERO
    {
        reservation.consume(from_reservation, now)?;
        balance.consume_reserved(from_reservation, now)?;
    }
    if from_available > Decimal::ZERO {
        balance.debit_available(from_available, now)?;
    }

    Ok(DebitSplit {
        from_reservation,
        from_available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{AccountId, OrderId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn setup(available: Decimal, reserved: Decimal) -> (WalletBalance, WalletReservation) {
        let now = Utc::now();
        let mut balance = WalletBalance::empty(AccountId::new("a-1"), "USDT", now);
        balance.available = available;
        balance.reserved = reserved;
        let reservation =
            WalletReservation::open(AccountId::new("a-1"), "USDT", reserved, OrderId::new("o-1"), now);
        (balance, reservation)
    }

    #[test]
    fn debit_consumes_reservation_before_available() {
        let (mut balance, mut reservation) = setup(dec!(500), dec!(500));
        let split = apply_delta(&mut balance, Some(&mut reservation), dec!(-501), Utc::now()).unwrap();

        assert_eq!(split.from_reservation, dec!(500));
        assert_eq!(split.from_available, dec!(1));
        assert_eq!(balance.reserved, Decimal::ZERO);
        assert_eq!(balance.available, dec!(499));
        assert_eq!(reservation.amount, Decimal::ZERO);
    }

    #[test]
    fn shortfall_leaves_state_untouched() {
        let (mut balance, mut reservation) = setup(dec!(1), dec!(10));
        let before = (balance.clone(), reservation.clone());
        let err = apply_delta(&mut balance, Some(&mut reservation), dec!(-20), Utc::now()).unwrap_err();

        assert!(matches!(err, WalletError::SettlementShortfall { shortfall, .. } if shortfall == dec!(9)));
        assert_eq!((balance, reservation), before);
    }

    #[test]
    fn credit_goes_to_available() {
        let (mut balance, _) = setup(dec!(0), dec!(0));
        apply_delta(&mut balance, None, dec!(0.01), Utc::now()).unwrap();
        assert_eq!(balance.available, dec!(0.01));
    }

    proptest! {
        #[test]
        fn total_moves_by_exactly_the_delta(
            available in 0u32..10_000,
            reserved in 0u32..10_000,
            delta in -20_000i64..20_000,
        ) {
            let (mut balance, mut reservation) =
                setup(Decimal::from(available), Decimal::from(reserved));
            let before = balance.total();
            let delta = Decimal::from(delta);
            if apply_delta(&mut balance, Some(&mut reservation), delta, Utc::now()).is_ok() {
                prop_assert_eq!(balance.total(), before + delta);
                prop_assert!(balance.available >= Decimal::ZERO);
                prop_assert!(balance.reserved >= Decimal::ZERO);
            }
        }
    }
}
