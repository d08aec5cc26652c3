//! Order State Machine Service
//!
//! Decides the next order status from the current status, an optional
//! exchange-reported status and the fill quantities.

use rust_decimal::Decimal;

use crate::domain::order_lifecycle::errors::OrderError;
use crate::domain::order_lifecycle::value_objects::OrderStatus;

/// Order State Machine for validating and resolving transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is legal.
    ///
    /// `NEW -> FILLED` is deliberately absent: a fill may only follow an
    /// exchange acknowledgement.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From New
            (OrderStatus::New, OrderStatus::Acknowledged)
                | (OrderStatus::New, OrderStatus::Canceled)
                | (OrderStatus::New, OrderStatus::Rejected)
                // From Acknowledged
                | (OrderStatus::Acknowledged, OrderStatus::PartiallyFilled)
                | (OrderStatus::Acknowledged, OrderStatus::Filled)
                | (OrderStatus::Acknowledged, OrderStatus::Canceled)
                // From PartiallyFilled
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Canceled)
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the pair is not in the legal table.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                from,
                to: Some(to),
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Get a human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Filled => format!("order is already filled, cannot transition to {to}"),
            OrderStatus::Canceled => format!("order is canceled, cannot transition to {to}"),
            OrderStatus::Rejected => format!("order was rejected, cannot transition to {to}"),
            OrderStatus::New if matches!(to, OrderStatus::Filled | OrderStatus::PartiallyFilled) => {
                format!("order must be acknowledged before it can become {to}")
            }
            _ => format!("invalid transition from {from} to {to}"),
        }
    }

    /// Get all legal next states from a given state.
    #[must_use]
    pub const fn valid_next_states(from: OrderStatus) -> &'static [OrderStatus] {
        match from {
            OrderStatus::New => &[
                OrderStatus::Acknowledged,
                OrderStatus::Canceled,
                OrderStatus::Rejected,
            ],
            OrderStatus::Acknowledged => &[
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Canceled,
            ],
            OrderStatus::PartiallyFilled => &[
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Canceled,
            ],
            // Terminal states
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected => &[],
        }
    }

    /// Status implied by fill quantities alone.
    #[must_use]
    pub fn quantity_signal(new_filled: Decimal, order_qty: Decimal) -> Option<OrderStatus> {
        if new_filled == order_qty {
            Some(OrderStatus::Filled)
        } else if new_filled > Decimal::ZERO {
            Some(OrderStatus::PartiallyFilled)
        } else {
            None
        }
    }

    /// Resolve the next status.
    ///
    /// A quantity-driven `FILLED` wins outright. Otherwise the mapped
    /// exchange status is preferred when its transition is legal and it
    /// agrees with the quantities, falling back to the quantity-driven
    /// candidate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the quantities are inconsistent and
    /// `InvalidStateTransition` if no legal transition exists.
    pub fn next_status(
        current: OrderStatus,
        mapped: Option<OrderStatus>,
        prior_filled: Decimal,
        new_filled: Decimal,
        order_qty: Decimal,
    ) -> Result<OrderStatus, OrderError> {
        if new_filled < prior_filled {
            return Err(OrderError::invalid(
                "filled_quantity",
                format!("filled quantity cannot decrease ({prior_filled} -> {new_filled})"),
            ));
        }
        if new_filled > order_qty || new_filled < Decimal::ZERO {
            return Err(OrderError::invalid(
                "filled_quantity",
                format!("filled quantity {new_filled} outside 0..={order_qty}"),
            ));
        }

        let quantity = Self::quantity_signal(new_filled, order_qty);

        if quantity == Some(OrderStatus::Filled) {
            Self::validate_transition(current, OrderStatus::Filled)?;
            return Ok(OrderStatus::Filled);
        }

        if let Some(mapped) = mapped
            && Self::agrees_with_quantity(mapped, quantity)
            && Self::is_valid_transition(current, mapped)
        {
            return Ok(mapped);
        }

        if let Some(candidate) = quantity
            && Self::is_valid_transition(current, candidate)
        {
            return Ok(candidate);
        }

        let attempted = mapped.or(quantity);
        Err(OrderError::InvalidStateTransition {
            from: current,
            to: attempted,
            reason: attempted.map_or_else(
                || "no status change was requested".to_string(),
                |to| Self::transition_error_reason(current, to),
            ),
        })
    }

    /// A mapped fill status must match what the quantities say.
    fn agrees_with_quantity(mapped: OrderStatus, quantity: Option<OrderStatus>) -> bool {
        match mapped {
            OrderStatus::Filled | OrderStatus::PartiallyFilled => quantity == Some(mapped),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(OrderStatus::New, OrderStatus::Acknowledged, true)]
    #[test_case(OrderStatus::New, OrderStatus::Canceled, true)]
    #[test_case(OrderStatus::New, OrderStatus::Rejected, true)]
    #[test_case(OrderStatus::New, OrderStatus::Filled, false)]
    #[test_case(OrderStatus::New, OrderStatus::PartiallyFilled, false)]
    #[test_case(OrderStatus::Acknowledged, OrderStatus::Filled, true)]
    #[test_case(OrderStatus::Acknowledged, OrderStatus::Rejected, false)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled, true)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Acknowledged, false)]
    #[test_case(OrderStatus::Filled, OrderStatus::Canceled, false)]
    #[test_case(OrderStatus::Canceled, OrderStatus::Acknowledged, false)]
    #[test_case(OrderStatus::Rejected, OrderStatus::New, false)]
    fn transition_table(from: OrderStatus, to: OrderStatus, legal: bool) {
        assert_eq!(OrderStateMachine::is_valid_transition(from, to), legal);
    }

    #[test]
    fn valid_next_states_matches_table() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let listed = OrderStateMachine::valid_next_states(*from).contains(to);
                assert_eq!(listed, OrderStateMachine::is_valid_transition(*from, *to));
            }
        }
    }

    #[test]
    fn new_to_filled_fails_even_with_full_quantity() {
        let err = OrderStateMachine::next_status(
            OrderStatus::New,
            Some(OrderStatus::Filled),
            dec!(0),
            dec!(1),
            dec!(1),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                from: OrderStatus::New,
                to: Some(OrderStatus::Filled),
                ..
            }
        ));
    }

    #[test]
    fn quantity_filled_wins_over_mapped_status() {
        let next = OrderStateMachine::next_status(
            OrderStatus::Acknowledged,
            Some(OrderStatus::PartiallyFilled),
            dec!(0),
            dec!(2),
            dec!(2),
        )
        .unwrap();
        assert_eq!(next, OrderStatus::Filled);
    }

    #[test]
    fn mapped_status_preferred_when_legal() {
        let next = OrderStateMachine::next_status(
            OrderStatus::Acknowledged,
            Some(OrderStatus::Canceled),
            dec!(0),
            dec!(0.5),
            dec!(2),
        )
        .unwrap();
        assert_eq!(next, OrderStatus::Canceled);
    }

    #[test]
    fn falls_back_to_quantity_when_mapped_is_illegal() {
        let next = OrderStateMachine::next_status(
            OrderStatus::Acknowledged,
            Some(OrderStatus::Acknowledged),
            dec!(0),
            dec!(0.5),
            dec!(2),
        )
        .unwrap();
        assert_eq!(next, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn mapped_filled_ignored_when_quantity_disagrees() {
        let next = OrderStateMachine::next_status(
            OrderStatus::Acknowledged,
            Some(OrderStatus::Filled),
            dec!(0),
            dec!(1),
            dec!(2),
        )
        .unwrap();
        assert_eq!(next, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn no_signal_and_no_mapping_is_rejected() {
        let err = OrderStateMachine::next_status(
            OrderStatus::Acknowledged,
            None,
            dec!(0),
            dec!(0),
            dec!(1),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition { to: None, .. }
        ));
    }

    #[test]
    fn decreasing_fill_is_rejected() {
        let err = OrderStateMachine::next_status(
            OrderStatus::PartiallyFilled,
            None,
            dec!(1),
            dec!(0.5),
            dec!(2),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::InvalidParameters { .. }));
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn resolved_status_is_always_a_legal_transition(
            current in any_status(),
            mapped in prop::option::of(any_status()),
            prior in 0u32..100,
            extra in 0u32..100,
            qty in 1u32..200,
        ) {
            let prior = Decimal::from(prior.min(qty));
            let new_filled = (prior + Decimal::from(extra)).min(Decimal::from(qty));
            if let Ok(next) = OrderStateMachine::next_status(
                current, mapped, prior, new_filled, Decimal::from(qty),
            ) {
                prop_assert!(OrderStateMachine::is_valid_transition(current, next));
                if next == OrderStatus::Filled {
                    prop_assert_eq!(new_filled, Decimal::from(qty));
                }
            }
        }
    }
}
