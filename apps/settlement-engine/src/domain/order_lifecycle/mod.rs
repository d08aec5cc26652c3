//! Order Lifecycle Bounded Context
//!
//! Orders, their legal status transitions and the append-only audit trail.

pub mod aggregate;
pub mod errors;
pub mod events;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{
    AckOutcome, CreateOrderCommand, FillTransition, Order, ReconstitutedOrderParams, Transition,
};
pub use errors::OrderError;
pub use events::{OrderEventRecord, OrderEventType};
pub use repository::OrderRepository;
pub use services::OrderStateMachine;
pub use value_objects::{OrderSide, OrderStatus, OrderType};
