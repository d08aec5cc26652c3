//! Application Use Cases

mod cancel_order;
mod place_order;
mod request_replay;
mod submit_to_exchange;

pub use cancel_order::CancelOrderUseCase;
pub use place_order::PlaceOrderUseCase;
pub use request_replay::RequestReplayUseCase;
pub use submit_to_exchange::{SubmissionOutcome, SubmitToExchangeUseCase};
