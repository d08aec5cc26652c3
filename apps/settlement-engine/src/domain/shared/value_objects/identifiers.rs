//! Strongly-typed identifiers for settlement entities.
//!
//! Every row the core persists is keyed by one of these. They are plain
//! strings on the wire and in storage.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh identifier (UUID v4).
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(OrderId, "Internal identifier of an order.");
define_id!(AccountId, "Trading account that owns orders and wallets.");
define_id!(OrderEventId, "Identifier of an order audit-trail row.");
define_id!(ExecutionId, "Identifier of an ingested execution (fill).");
define_id!(ReservationId, "Identifier of a wallet reservation.");
define_id!(LedgerTransactionId, "Identifier of a ledger transaction.");
define_id!(LedgerEntryId, "Identifier of a single ledger entry.");
define_id!(OutboxEventId, "Identifier of an outbox row.");
define_id!(ReplayRequestId, "Identifier of a connector replay request.");
