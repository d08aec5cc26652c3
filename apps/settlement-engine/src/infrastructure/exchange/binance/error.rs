//! Binance-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::application::ports::ExchangeError;

/// Too many requests.
const CODE_TOO_MANY_REQUESTS: i64 = -1003;
/// Too many new orders.
const CODE_TOO_MANY_ORDERS: i64 = -1015;
/// Signature for this request is not valid.
const CODE_BAD_SIGNATURE: i64 = -1022;
/// Cancel rejected; carries "Unknown order sent." for missing orders.
const CODE_CANCEL_REJECTED: i64 = -2011;
/// Order does not exist.
const CODE_NO_SUCH_ORDER: i64 = -2013;
/// API-key format invalid.
const CODE_BAD_API_KEY_FORMAT: i64 = -2014;
/// Invalid API-key, IP, or permissions for action.
const CODE_REJECTED_API_KEY: i64 = -2015;

/// Errors from the Binance adapter.
#[derive(Debug, Error, Clone)]
pub enum BinanceError {
    /// API key or secret missing.
    #[error("Binance credentials missing")]
    MissingCredentials,

    /// Request could not be signed.
    #[error("Signing failed: {0}")]
    Signature(String),

    /// Request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network failure or timeout.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body could not be parsed.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// HTTP 429 or 418.
    #[error("Rate limited (HTTP {status}): {message}")]
    RateLimited {
        /// HTTP status.
        status: u16,
        /// `Retry-After` hint.
        retry_after: Option<Duration>,
        /// Error details.
        message: String,
    },

    /// Any other non-success response.
    #[error("API error (HTTP {status}, code {code:?}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Binance error code.
        code: Option<i64>,
        /// Error message.
        message: String,
    },
}

impl From<BinanceError> for ExchangeError {
    fn from(err: BinanceError) -> Self {
        match err {
            BinanceError::MissingCredentials => Self::Authentication {
                message: err.to_string(),
            },
            BinanceError::Signature(message)
            | BinanceError::InvalidUrl(message)
            | BinanceError::Http(message) => Self::Transport { message },
            BinanceError::JsonParse(message) => Self::Decode { message },
            BinanceError::RateLimited {
                retry_after,
                message,
                ..
            } => Self::RateLimited {
                retry_after,
                message,
            },
            BinanceError::Api {
                status,
                code,
                message,
            } => classify_api_error(status, code, message),
        }
    }
}

fn classify_api_error(status: u16, code: Option<i64>, message: String) -> ExchangeError {
    match code {
        Some(CODE_TOO_MANY_REQUESTS | CODE_TOO_MANY_ORDERS) => ExchangeError::RateLimited {
            retry_after: None,
            message,
        },
        Some(CODE_BAD_SIGNATURE | CODE_BAD_API_KEY_FORMAT | CODE_REJECTED_API_KEY) => {
            ExchangeError::Authentication { message }
        }
        Some(CODE_NO_SUCH_ORDER) => ExchangeError::NotFound { message },
        Some(CODE_CANCEL_REJECTED) if message.contains("Unknown order") => {
            ExchangeError::NotFound { message }
        }
        _ if status == 401 => ExchangeError::Authentication { message },
        _ if status == 400 => ExchangeError::Rejected { code, message },
        _ => ExchangeError::Api {
            status,
            code,
            message,
        },
    }
}
