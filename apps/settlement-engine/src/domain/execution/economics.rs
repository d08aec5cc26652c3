//! Per-fill asset movements.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::entity::Execution;
use crate::domain::order_lifecycle::OrderSide;
use crate::domain::shared::AssetPair;

/// What a leg represents economically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    /// Base asset bought or sold.
    Base,
    /// Quote notional paid or received.
    Quote,
    /// Trading fee.
    Fee,
}

/// One signed asset movement for the account. Positive credits the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLeg {
    /// Leg kind.
    pub kind: LegKind,
    /// Asset moved.
    pub asset: String,
    /// Signed amount, never zero.
    pub amount: Decimal,
}

/// Economic effect of one fill on the owning account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillEconomics {
    legs: Vec<AssetLeg>,
}

impl FillEconomics {
    /// Compute the legs of `execution` over `pair`.
    ///
    /// BUY credits base and debits quote notional, SELL mirrors it, and a
    /// non-zero fee debits the fee asset.
    #[must_use]
    pub fn of(execution: &Execution, pair: &AssetPair) -> Self {
        let notional = execution.notional();
        let (base, quote) = match execution.side {
            OrderSide::Buy => (execution.quantity, -notional),
            OrderSide::Sell => (-execution.quantity, notional),
        };

        let mut legs = Vec::with_capacity(3);
        push_leg(&mut legs, LegKind::Base, &pair.base, base);
        push_leg(&mut legs, LegKind::Quote, &pair.quote, quote);
        if let Some(fee_asset) = &execution.fee_asset {
            push_leg(&mut legs, LegKind::Fee, fee_asset, -execution.fee_amount);
        }

        Self { legs }
    }

    /// Individual legs, in base, quote, fee order.
    #[must_use]
    pub fn legs(&self) -> &[AssetLeg] {
        &self.legs
    }

    /// Net signed movement per asset, zero nets omitted.
    #[must_use]
    pub fn net_deltas(&self) -> BTreeMap<String, Decimal> {
        let mut net: BTreeMap<String, Decimal> = BTreeMap::new();
        for leg in &self.legs {
            *net.entry(leg.asset.clone()).or_default() += leg.amount;
        }
        net.retain(|_, amount| !amount.is_zero());
        net
    }
}

fn push_leg(legs: &mut Vec<AssetLeg>, kind: LegKind, asset: &str, amount: Decimal) {
    if !amount.is_zero() {
        legs.push(AssetLeg {
            kind,
            asset: asset.to_string(),
            amount,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{AccountId, ExecutionId, OrderId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn execution(side: OrderSide, fee_asset: Option<&str>, fee: Decimal) -> Execution {
        Execution {
            id: ExecutionId::generate(),
            order_id: OrderId::new("o-1"),
            account_id: AccountId::new("a-1"),
            instrument: "BTCUSDT".to_string(),
            trade_id: "t-1".to_string(),
            exchange_name: "binance".to_string(),
            exchange_order_id: Some("1".to_string()),
            side,
            quantity: dec!(0.01),
            price: dec!(50000),
            fee_asset: fee_asset.map(str::to_string),
            fee_amount: fee,
            executed_at: Utc::now(),
        }
    }

    fn pair() -> AssetPair {
        AssetPair::new("BTC", "USDT")
    }

    #[test]
    fn buy_with_quote_fee_nets_per_asset() {
        let econ = FillEconomics::of(&execution(OrderSide::Buy, Some("USDT"), dec!(1)), &pair());
        assert_eq!(econ.legs().len(), 3);

        let net = econ.net_deltas();
        assert_eq!(net["BTC"], dec!(0.01));
        assert_eq!(net["USDT"], dec!(-501));
    }

    #[test]
    fn sell_credits_quote() {
        let econ = FillEconomics::of(&execution(OrderSide::Sell, None, dec!(0)), &pair());
        let net = econ.net_deltas();
        assert_eq!(net["BTC"], dec!(-0.01));
        assert_eq!(net["USDT"], dec!(500.00));
    }

    #[test]
    fn fee_in_third_asset_adds_a_delta() {
        let econ = FillEconomics::of(&execution(OrderSide::Buy, Some("BNB"), dec!(0.001)), &pair());
        let net = econ.net_deltas();
        assert_eq!(net.len(), 3);
        assert_eq!(net["BNB"], dec!(-0.001));
    }

    #[test]
    fn zero_fee_produces_no_leg() {
        let econ = FillEconomics::of(&execution(OrderSide::Buy, Some("USDT"), dec!(0)), &pair());
        assert!(econ.legs().iter().all(|leg| leg.kind != LegKind::Fee));
    }
}
