//! Static Instrument Catalog
//!
//! Instruments listed in configuration, resolved without a network call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::application::ports::InstrumentCatalogPort;
use crate::domain::shared::AssetPair;

/// One configured instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Exchange symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Base asset; derived from the symbol when absent.
    #[serde(default)]
    pub base: Option<String>,
    /// Quote asset; derived from the symbol when absent.
    #[serde(default)]
    pub quote: Option<String>,
    /// Whether the poller reconciles this symbol.
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl InstrumentDefinition {
    /// Active instrument whose assets are derived from the symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            base: None,
            quote: None,
            active: true,
        }
    }
}

/// Catalog fixed at startup.
#[derive(Debug, Clone)]
pub struct StaticInstrumentCatalog {
    pairs: BTreeMap<String, AssetPair>,
    active: Vec<String>,
    quote_assets: Vec<String>,
}

impl StaticInstrumentCatalog {
    /// Build from definitions.
    ///
    /// Definitions with neither explicit assets nor a derivable symbol are
    /// skipped with a warning. An empty `quote_assets` falls back to the
    /// built-in list.
    pub fn new(definitions: &[InstrumentDefinition], quote_assets: Vec<String>) -> Self {
        let quote_assets = if quote_assets.is_empty() {
            AssetPair::default_quotes()
        } else {
            quote_assets.into_iter().map(|q| q.to_uppercase()).collect()
        };

        let mut pairs = BTreeMap::new();
        let mut active = Vec::new();
        for definition in definitions {
            let symbol = definition.symbol.trim().to_uppercase();
            let pair = match (&definition.base, &definition.quote) {
                (Some(base), Some(quote)) => Some(AssetPair::new(base, quote)),
                _ => AssetPair::derive(&symbol, &quote_assets),
            };
            let Some(pair) = pair else {
                tracing::warn!(symbol = %symbol, "Instrument assets could not be resolved, skipping");
                continue;
            };
            if definition.active && !active.contains(&symbol) {
                active.push(symbol.clone());
            }
            pairs.insert(symbol, pair);
        }

        Self {
            pairs,
            active,
            quote_assets,
        }
    }

    /// Number of resolved instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl InstrumentCatalogPort for StaticInstrumentCatalog {
    fn resolve(&self, instrument: &str) -> Option<AssetPair> {
        self.pairs.get(&instrument.trim().to_uppercase()).cloned()
    }

    fn active_instruments(&self) -> Vec<String> {
        self.active.clone()
    }

    fn known_quote_assets(&self) -> Vec<String> {
        self.quote_assets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticInstrumentCatalog {
        StaticInstrumentCatalog::new(
            &[
                InstrumentDefinition::new("BTCUSDT"),
                InstrumentDefinition {
                    symbol: "1000SATSUSDT".to_string(),
                    base: Some("1000sats".to_string()),
                    quote: Some("usdt".to_string()),
                    active: false,
                },
                InstrumentDefinition::new("NOQUOTE"),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn resolves_configured_symbols() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.resolve("btcusdt"), Some(AssetPair::new("BTC", "USDT")));
        assert_eq!(
            catalog.resolve("1000SATSUSDT"),
            Some(AssetPair::new("1000SATS", "USDT"))
        );
        assert!(catalog.resolve("NOQUOTE").is_none());
    }

    #[test]
    fn only_active_symbols_are_polled() {
        assert_eq!(catalog().active_instruments(), vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn unknown_symbols_fall_back_to_derivation() {
        let catalog = catalog();
        assert!(catalog.resolve("ETHBTC").is_none());
        assert_eq!(catalog.asset_pair("ETHBTC"), Some(AssetPair::new("ETH", "BTC")));
    }

    #[test]
    fn custom_quote_assets_replace_the_defaults() {
        let catalog = StaticInstrumentCatalog::new(&[], vec!["xyz".to_string()]);
        assert!(catalog.is_empty());
        assert_eq!(catalog.known_quote_assets(), vec!["XYZ".to_string()]);
        assert_eq!(catalog.asset_pair("ABCXYZ"), Some(AssetPair::new("ABC", "XYZ")));
        assert!(catalog.asset_pair("BTCUSDT").is_none());
    }
}
