//! Instrument catalog configuration.

use serde::{Deserialize, Serialize};

use crate::infrastructure::instruments::{InstrumentDefinition, StaticInstrumentCatalog};

/// Instruments configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    /// Configured symbols.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<InstrumentDefinition>,
    /// Quote assets used to split unlisted symbols; built-in list when empty.
    #[serde(default)]
    pub quote_assets: Vec<String>,
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            quote_assets: Vec::new(),
        }
    }
}

impl InstrumentsConfig {
    /// Build the catalog.
    #[must_use]
    pub fn catalog(&self) -> StaticInstrumentCatalog {
        StaticInstrumentCatalog::new(&self.symbols, self.quote_assets.clone())
    }
}

fn default_symbols() -> Vec<InstrumentDefinition> {
    vec![
        InstrumentDefinition::new("BTCUSDT"),
        InstrumentDefinition::new("ETHUSDT"),
    ]
}
