//! HTTP request DTOs.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/connectors/replay`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayRequestBody {
    /// Connector to replay; the default connector when absent.
    #[serde(default)]
    pub connector: Option<String>,
    /// Free-text reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Operator name.
    #[serde(default)]
    pub requested_by: Option<String>,
}
