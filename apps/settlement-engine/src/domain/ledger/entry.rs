//! Ledger transactions and entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::LedgerError;
use crate::domain::execution::{Execution, FillEconomics};
use crate::domain::shared::{AccountId, LedgerEntryId, LedgerTransactionId};

code_enum! {
    /// Side of a ledger entry. A credit increases the account's holding.
    pub enum Direction("ledger_direction") {
        /// Decrease.
        Debit => "DEBIT",
        /// Increase.
        Credit => "CREDIT",
    }
}

code_enum! {
    /// Business event a ledger transaction records.
    pub enum LedgerTransactionType("ledger_transaction_type") {
        /// Settlement of one fill.
        Execution => "EXECUTION",
    }
}

code_enum! {
    /// What an entry refers to.
    pub enum ReferenceType("ledger_reference_type") {
        /// Account-side leg of an execution.
        Execution => "EXECUTION",
        /// Clearing-side mirror of an execution leg.
        ExecutionOffset => "EXECUTION_OFFSET",
    }
}

/// Ledger account that mirrors every fill on `exchange_name`.
#[must_use]
pub fn clearing_account(exchange_name: &str) -> AccountId {
    AccountId::new(format!("clearing:{exchange_name}"))
}

/// One posting line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Row identifier.
    pub id: LedgerEntryId,
    /// Parent transaction.
    pub transaction_id: LedgerTransactionId,
    /// Ledger account (trading account or clearing account).
    pub account_id: AccountId,
    /// Asset.
    pub asset: String,
    /// Debit or credit.
    pub direction: Direction,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Kind of reference.
    pub reference_type: ReferenceType,
    /// Referenced row, the execution id.
    pub reference_id: String,
}

impl LedgerEntry {
    /// Signed amount: credits positive, debits negative.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// A balanced group of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Row identifier.
    pub id: LedgerTransactionId,
    /// Correlation id, the execution id for fills.
    pub correlation_id: String,
    /// Transaction type.
    pub transaction_type: LedgerTransactionType,
    /// Posting time.
    pub created_at: DateTime<Utc>,
    /// Entries.
    pub entries: Vec<LedgerEntry>,
}

impl LedgerTransaction {
    /// Book the legs of `execution`.
    ///
    /// # Errors
    ///
    /// Returns error if the fill produced no legs or the result does not
    /// balance.
    pub fn for_execution(
        execution: &Execution,
        economics: &FillEconomics,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let id = LedgerTransactionId::generate();
        let clearing = clearing_account(&execution.exchange_name);
        let reference_id = execution.id.to_string();

        let mut entries = Vec::with_capacity(economics.legs().len() * 2);
        for leg in economics.legs() {
            let (account_side, clearing_side) = if leg.amount > Decimal::ZERO {
                (Direction::Credit, Direction::Debit)
            } else {
                (Direction::Debit, Direction::Credit)
            };
            let amount = leg.amount.abs();

            entries.push(LedgerEntry {
                id: LedgerEntryId::generate(),
                transaction_id: id.clone(),
                account_id: execution.account_id.clone(),
                asset: leg.asset.clone(),
                direction: account_side,
                amount,
                reference_type: ReferenceType::Execution,
                reference_id: reference_id.clone(),
            });
            entries.push(LedgerEntry {
                id: LedgerEntryId::generate(),
                transaction_id: id.clone(),
                account_id: clearing.clone(),
                asset: leg.asset.clone(),
                direction: clearing_side,
                amount,
                reference_type: ReferenceType::ExecutionOffset,
                reference_id: reference_id.clone(),
            });
        }

        let transaction = Self {
            id,
            correlation_id: reference_id,
            transaction_type: LedgerTransactionType::Execution,
            created_at: now,
            entries,
        };
        transaction.verify_balanced()?;
        Ok(transaction)
    }

    /// Check that every asset nets to zero.
    ///
    /// # Errors
    ///
    /// Returns the first asset found out of balance.
    pub fn verify_balanced(&self) -> Result<(), LedgerError> {
        if self.entries.is_empty() {
            return Err(LedgerError::Empty(self.id.to_string()));
        }
        if let Some(entry) = self.entries.iter().find(|e| e.amount <= Decimal::ZERO) {
            return Err(LedgerError::NonPositiveAmount(entry.amount));
        }

        let mut net: BTreeMap<&str, Decimal> = BTreeMap::new();
        for entry in &self.entries {
            *net.entry(entry.asset.as_str()).or_default() += entry.signed_amount();
        }
        match net.into_iter().find(|(_, amount)| !amount.is_zero()) {
            Some((asset, amount)) => Err(LedgerError::Unbalanced {
                transaction_id: self.id.to_string(),
                asset: asset.to_string(),
                net: amount,
            }),
            None => Ok(()),
        }
    }

    /// Net signed movement per asset for one ledger account.
    #[must_use]
    pub fn net_for_account(&self, account_id: &AccountId) -> BTreeMap<String, Decimal> {
        let mut net = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| &e.account_id == account_id) {
            *net.entry(entry.asset.clone()).or_default() += entry.signed_amount();
        }
        net
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_lifecycle::OrderSide;
    use crate::domain::shared::{AssetPair, ExecutionId, OrderId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn execution(side: OrderSide, qty: Decimal, price: Decimal, fee: Decimal) -> Execution {
        Execution {
            id: ExecutionId::generate(),
            order_id: OrderId::new("o-1"),
            account_id: AccountId::new("a-1"),
            instrument: "BTCUSDT".to_string(),
            trade_id: "t-1".to_string(),
            exchange_name: "binance".to_string(),
            exchange_order_id: Some("1".to_string()),
            side,
            quantity: qty,
            price,
            fee_asset: Some("USDT".to_string()),
            fee_amount: fee,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn buy_posts_mirrored_entries() {
        let exec = execution(OrderSide::Buy, dec!(0.01), dec!(50000), dec!(1));
        let econ = FillEconomics::of(&exec, &AssetPair::new("BTC", "USDT"));
        let tx = LedgerTransaction::for_execution(&exec, &econ, Utc::now()).unwrap();

        assert_eq!(tx.entries.len(), 6);
        assert_eq!(tx.correlation_id, exec.id.to_string());

        let account = tx.net_for_account(&exec.account_id);
        assert_eq!(account["BTC"], dec!(0.01));
        assert_eq!(account["USDT"], dec!(-501));

        let clearing = tx.net_for_account(&clearing_account("binance"));
        assert_eq!(clearing["USDT"], dec!(501));
        assert!(
            tx.entries
                .iter()
                .filter(|e| e.account_id == clearing_account("binance"))
                .all(|e| e.reference_type == ReferenceType::ExecutionOffset)
        );
    }

    #[test]
    fn tampered_transaction_is_unbalanced() {
        let exec = execution(OrderSide::Sell, dec!(1), dec!(10), dec!(0));
        let econ = FillEconomics::of(&exec, &AssetPair::new("BTC", "USDT"));
        let mut tx = LedgerTransaction::for_execution(&exec, &econ, Utc::now()).unwrap();
        tx.entries[0].amount += dec!(1);

        assert!(matches!(tx.verify_balanced(), Err(LedgerError::Unbalanced { .. })));
    }

    proptest! {
        #[test]
        fn every_fill_balances_per_asset(
            buy in any::<bool>(),
            qty in 1u32..1_000_000,
            price in 1u32..1_000_000,
            fee in 0u32..1_000,
        ) {
            let side = if buy { OrderSide::Buy } else { OrderSide::Sell };
            let exec = execution(
                side,
                Decimal::new(i64::from(qty), 4),
                Decimal::new(i64::from(price), 2),
                Decimal::new(i64::from(fee), 2),
            );
            let pair = AssetPair::new("BTC", "USDT");
            let econ = FillEconomics::of(&exec, &pair);
            let tx = LedgerTransaction::for_execution(&exec, &econ, Utc::now()).unwrap();

            prop_assert!(tx.verify_balanced().is_ok());
            let mut actual = tx.net_for_account(&exec.account_id);
            actual.retain(|_, amount| !amount.is_zero());
            prop_assert_eq!(actual, econ.net_deltas());
        }
    }
}
