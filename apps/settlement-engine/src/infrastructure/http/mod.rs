//! Operations HTTP surface.
//!
//! Connector health and the manual replay trigger, served with axum.

mod controller;
mod request;
mod response;

pub use controller::{AppState, create_router};
pub use request::ReplayRequestBody;
pub use response::{
    ApiError, ConnectorSummary, ErrorBody, HealthResponse, ReplayRequestResponse,
};
