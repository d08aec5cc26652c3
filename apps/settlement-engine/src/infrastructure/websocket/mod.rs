//! User data stream wire format.
//!
//! Frame types and the codec that turns them into [`StreamEvent`]s.
//!
//! [`StreamEvent`]: crate::application::ports::StreamEvent

mod codec;
mod frames;

pub use codec::ExecutionReportCodec;
pub use frames::{ExecutionReportFrame, UserDataFrame};
