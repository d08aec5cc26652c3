//! Wallet Repository Trait

use async_trait::async_trait;

use super::balance::WalletBalance;
use super::reservation::WalletReservation;
use crate::domain::shared::{AccountId, OrderId, RepositoryError};

/// Persistence for balances and reservations inside a unit of work.
#[async_trait]
pub trait WalletRepository: Send {
    /// Lock the `(account, asset)` balance row, creating an empty row first
    /// if none exists.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn lock_balance(
        &mut self,
        account_id: &AccountId,
        asset: &str,
    ) -> Result<WalletBalance, RepositoryError>;

    /// Write back a locked balance row.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    async fn save_balance(&mut self, balance: &WalletBalance) -> Result<(), RepositoryError>;

    /// Read a balance without locking.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_balance(
        &mut self,
        account_id: &AccountId,
        asset: &str,
    ) -> Result<Option<WalletBalance>, RepositoryError>;

    /// Insert a new reservation.
    ///
    /// # Errors
    ///
    /// Returns error if the order already has an active reservation.
    async fn insert_reservation(
        &mut self,
        reservation: &WalletReservation,
    ) -> Result<(), RepositoryError>;

    /// Lock the active reservation of an order, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn lock_active_reservation(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<WalletReservation>, RepositoryError>;

    /// Write back a locked reservation.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    async fn save_reservation(
        &mut self,
        reservation: &WalletReservation,
    ) -> Result<(), RepositoryError>;

    /// Every reservation an order ever held, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn list_reservations_for_order(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<WalletReservation>, RepositoryError>;
}
