//! Wallet Bounded Context
//!
//! Per-asset balances split into available and reserved funds, and the
//! per-order reservations that hold them.

mod balance;
mod errors;
mod repository;
mod reservation;
mod settlement;

pub use balance::WalletBalance;
pub use errors::WalletError;
pub use repository::WalletRepository;
pub use reservation::{ReservationStatus, WalletReservation};
pub use settlement::{DebitSplit, apply_delta};
