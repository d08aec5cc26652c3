//! Instrument Catalog Port (Driven Port)

use crate::domain::shared::AssetPair;

/// Read access to configured instruments.
pub trait InstrumentCatalogPort: Send + Sync {
    /// Base/quote pair of a symbol, if configured.
    fn resolve(&self, instrument: &str) -> Option<AssetPair>;

    /// Symbols the poller reconciles every cycle.
    fn active_instruments(&self) -> Vec<String>;

    /// Quote assets tried, longest first, when splitting unknown symbols.
    fn known_quote_assets(&self) -> Vec<String>;

    /// Resolve through the catalog, falling back to symbol splitting.
    fn asset_pair(&self, instrument: &str) -> Option<AssetPair> {
        self.resolve(instrument)
            .or_else(|| AssetPair::derive(instrument, &self.known_quote_assets()))
    }
}
