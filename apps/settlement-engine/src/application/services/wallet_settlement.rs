//! Wallet Settlement Service
//!
//! Reserve, release and settle operations over the wallet tables. Each
//! call runs inside the caller's unit of work and takes the balance row
//! lock for every asset it touches, in asset order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::order_lifecycle::Order;
use crate::domain::shared::{AccountId, AssetPair, OrderId};
use crate::domain::wallet::{
    ReservationStatus, WalletBalance, WalletError, WalletRepository, WalletReservation,
    apply_delta,
};
use crate::error::SettlementResult;

/// Wallet operations used by order creation, cancellation and fills.
pub struct WalletSettlement;

impl WalletSettlement {
    /// Reserve funds for a new order per its reservation requirement.
    ///
    /// Returns the updated balance row, or `None` when the order reserves
    /// nothing.
    pub async fn reserve_for_order<U>(
        tx: &mut U,
        order: &Order,
        pair: &AssetPair,
        now: DateTime<Utc>,
    ) -> SettlementResult<Option<WalletBalance>>
    where
        U: WalletRepository + ?Sized,
    {
        let Some((asset, amount)) = order.reservation_requirement(pair) else {
            return Ok(None);
        };
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount {
                amount,
                reason: "reservation must be positive",
            }
            .into());
        }

        let mut balance = tx.lock_balance(order.account_id(), &asset).await?;
        balance.reserve(amount, now)?;
        tx.save_balance(&balance).await?;

        let reservation = WalletReservation::open(
            order.account_id().clone(),
            asset,
            amount,
            order.id().clone(),
            now,
        );
        tx.insert_reservation(&reservation).await?;

        tracing::debug!(
            order_id = %order.id(),
            asset = %reservation.asset,
            amount = %amount,
            "Funds reserved"
        );
        Ok(Some(balance))
    }

    /// Close the active reservation of an order with `status` and return
    /// its remainder to available.
    ///
    /// Returns the updated balance row, or `None` when the order held no
    /// active reservation.
    pub async fn release_for_order<U>(
        tx: &mut U,
        order_id: &OrderId,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> SettlementResult<Option<WalletBalance>>
    where
        U: WalletRepository + ?Sized,
    {
        let Some(mut reservation) = tx.lock_active_reservation(order_id).await? else {
            return Ok(None);
        };

        let mut balance = tx
            .lock_balance(&reservation.account_id, &reservation.asset)
            .await?;
        let remainder = reservation.close(status, now)?;
        if remainder > Decimal::ZERO {
            balance.release(remainder, now)?;
            tx.save_balance(&balance).await?;
        }
        tx.save_reservation(&reservation).await?;

        tracing::debug!(
            order_id = %order_id,
            asset = %reservation.asset,
            released = %remainder,
            status = %status,
            "Reservation closed"
        );
        Ok(Some(balance))
    }

    /// Apply per-asset fill deltas for `account_id`, drawing the order's
    /// active reservation first for debits in its asset.
    ///
    /// Returns the updated balance rows in asset order.
    pub async fn settle_fill<U>(
        tx: &mut U,
        account_id: &AccountId,
        order_id: &OrderId,
        deltas: &BTreeMap<String, Decimal>,
        now: DateTime<Utc>,
    ) -> SettlementResult<Vec<WalletBalance>>
    where
        U: WalletRepository + ?Sized,
    {
        let mut reservation = tx.lock_active_reservation(order_id).await?;
        let mut reservation_touched = false;
        let mut balances = Vec::with_capacity(deltas.len());

        for (asset, delta) in deltas {
            let mut balance = tx.lock_balance(account_id, asset).await?;
            let matching = reservation.as_mut().filter(|r| &r.asset == asset);
            let split = apply_delta(&mut balance, matching, *delta, now)?;
            reservation_touched |= split.from_reservation > Decimal::ZERO;
            tx.save_balance(&balance).await?;
            balances.push(balance);
        }

        if reservation_touched && let Some(reservation) = &reservation {
            tx.save_reservation(reservation).await?;
        }
        Ok(balances)
    }
}

/// Replace rows in `balances` with `updated` where the asset matches,
/// appending otherwise.
pub fn merge_balance(balances: &mut Vec<WalletBalance>, updated: WalletBalance) {
    match balances.iter_mut().find(|b| b.asset == updated.asset) {
        Some(existing) => *existing = updated,
        None => balances.push(updated),
    }
}
