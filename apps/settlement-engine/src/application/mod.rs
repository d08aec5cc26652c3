//! Application Layer
//!
//! Ports to the outside world, the services that coordinate the domain
//! through them, and the use cases exposed to drivers.

pub mod ports;
pub mod services;
pub mod use_cases;
