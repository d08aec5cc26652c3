//! Order aggregate.

mod order;

pub use order::{
    AckOutcome, CreateOrderCommand, FillTransition, Order, ReconstitutedOrderParams, Transition,
};
